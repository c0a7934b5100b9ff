use crate::core::params::RunParameters;
use crate::domain::model::{FeedBatch, FundamentalRecord, MarketQuote, RunReport, Stage, Ticker};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Raw record source. Records are read-only inputs to the core.
pub trait FeedSource: Send + Sync {
    fn tickers(&self) -> impl std::future::Future<Output = Result<Vec<Ticker>>> + Send;
    fn fundamentals(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<FundamentalRecord>>> + Send;
    fn quotes(&self) -> impl std::future::Future<Output = Result<Vec<MarketQuote>>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn output_path(&self) -> &str;
    /// Explicit baseline file for recomputation; when absent the latest
    /// stored revision of the snapshot is used.
    fn baseline_path(&self) -> Option<&str>;
    fn stage(&self) -> Result<Stage>;
    fn run_parameters(&self) -> Result<RunParameters>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<FeedBatch>;
    async fn transform(&self, batch: FeedBatch) -> Result<RunReport>;
    async fn load(&self, report: &RunReport) -> Result<String>;
}
