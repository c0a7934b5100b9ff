use crate::core::evaluate::run_full;
use crate::core::params::RunParameters;
use crate::core::recompute::run_recompute;
use crate::core::{ConfigProvider, FeedSource, Pipeline, Storage};
use crate::domain::model::{FeedBatch, RunReport, SnapshotId, Stage, ValuationSnapshot};
use crate::utils::error::{EtlError, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const LATEST_FILE: &str = "latest.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Output files are numbered by run. Row revisions are per ticker and repeat
/// across runs that touch different tickers.
pub fn revision_file(snapshot_id: SnapshotId, run: u32) -> String {
    format!("{}/revision-{:03}.json", snapshot_id, run)
}

pub fn ranking_file(snapshot_id: SnapshotId, run: u32) -> String {
    format!("{}/ranking-{:03}.csv", snapshot_id, run)
}

pub fn failures_file(snapshot_id: SnapshotId, run: u32) -> String {
    format!("{}/failures-{:03}.json", snapshot_id, run)
}

pub fn latest_file(snapshot_id: SnapshotId) -> String {
    format!("{}/{}", snapshot_id, LATEST_FILE)
}

pub fn manifest_file(snapshot_id: SnapshotId) -> String {
    format!("{}/{}", snapshot_id, MANIFEST_FILE)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    pub run: u32,
    pub stage: Stage,
    pub as_of_date: NaiveDate,
    pub rows: usize,
    pub failures: usize,
    pub files: Vec<String>,
}

/// Every run recorded against one snapshot, oldest first. Run numbers are
/// never reused, so no run overwrites another run's files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub runs: Vec<RunEntry>,
}

impl RunManifest {
    pub fn next_run(&self) -> u32 {
        self.runs.iter().map(|r| r.run + 1).max().unwrap_or(0)
    }
}

pub struct SrimPipeline<F: FeedSource, S: Storage, C: ConfigProvider> {
    feed: F,
    storage: S,
    config: C,
    stage: Stage,
    params: RunParameters,
}

impl<F: FeedSource, S: Storage, C: ConfigProvider> SrimPipeline<F, S, C> {
    /// Resolves stage and run parameters once; they stay fixed for the run.
    pub fn new(feed: F, storage: S, config: C) -> Result<Self> {
        let stage = config.stage()?;
        let params = config.run_parameters()?;
        Ok(Self {
            feed,
            storage,
            config,
            stage,
            params,
        })
    }

    pub fn params(&self) -> &RunParameters {
        &self.params
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    async fn read_baseline(&self) -> Result<Vec<ValuationSnapshot>> {
        let data = match self.config.baseline_path() {
            Some(path) => {
                tracing::debug!("Reading baseline from {}", path);
                tokio::fs::read(path).await?
            }
            None => {
                let path = latest_file(self.params.snapshot_id);
                tracing::debug!("Reading baseline from storage: {}", path);
                self.storage.read_file(&path).await?
            }
        };
        Ok(serde_json::from_slice(&data)?)
    }

    /// Decoded JSON file from storage, or the default when it was never written.
    async fn read_or_default<T: DeserializeOwned + Default>(&self, path: &str) -> Result<T> {
        match self.storage.read_file(path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(EtlError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e),
        }
    }

    fn ranking_csv(report: &RunReport) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in &report.ranked {
            writer.serialize(row)?;
        }
        writer.into_inner().map_err(|e| EtlError::ProcessingError {
            message: format!("Failed to flush ranking CSV: {}", e),
        })
    }
}

#[async_trait::async_trait]
impl<F: FeedSource, S: Storage, C: ConfigProvider> Pipeline for SrimPipeline<F, S, C> {
    async fn extract(&self) -> Result<FeedBatch> {
        tracing::debug!(
            "Extracting for snapshot {} as of {} ({})",
            self.params.snapshot_id,
            self.params.as_of_date,
            self.stage
        );

        let tickers = self.feed.tickers().await?;
        let quotes = self.feed.quotes().await?;

        match self.stage {
            Stage::Full => Ok(FeedBatch {
                tickers,
                fundamentals: self.feed.fundamentals().await?,
                quotes,
                baseline: Vec::new(),
            }),
            Stage::Recompute => Ok(FeedBatch {
                tickers,
                fundamentals: Vec::new(),
                quotes,
                baseline: self.read_baseline().await?,
            }),
        }
    }

    async fn transform(&self, batch: FeedBatch) -> Result<RunReport> {
        match self.stage {
            Stage::Full => run_full(&batch, &self.params),
            Stage::Recompute => run_recompute(&batch.baseline, &batch.quotes, &batch.tickers, &self.params),
        }
    }

    async fn load(&self, report: &RunReport) -> Result<String> {
        let sid = report.snapshot_id;
        let mut manifest: RunManifest = self.read_or_default(&manifest_file(sid)).await?;
        let run = manifest.next_run();
        let mut files = Vec::new();

        if report.rows.is_empty() {
            tracing::warn!(
                "Run {:03} of {} produced no rows; keeping previous revisions and latest",
                run,
                sid
            );
        } else {
            let rows_path = revision_file(sid, run);
            tracing::debug!("Writing {} rows to {}", report.rows.len(), rows_path);
            self.storage
                .write_file(&rows_path, &serde_json::to_vec_pretty(&report.rows)?)
                .await?;
            files.push(rows_path);

            let ranking_path = ranking_file(sid, run);
            self.storage
                .write_file(&ranking_path, &Self::ranking_csv(report)?)
                .await?;
            files.push(ranking_path);
        }

        if !report.failures.is_empty() {
            let path = failures_file(sid, run);
            self.storage
                .write_file(&path, &serde_json::to_vec_pretty(&report.failures)?)
                .await?;
            files.push(path);
        }

        if !report.rows.is_empty() {
            // A full build starts a new baseline; a recompute only supersedes
            // the tickers it produced.
            let mut latest: BTreeMap<String, ValuationSnapshot> = BTreeMap::new();
            if report.stage == Stage::Recompute {
                let stored: Vec<ValuationSnapshot> = self.read_or_default(&latest_file(sid)).await?;
                for row in stored {
                    latest.insert(row.ticker_code().to_string(), row);
                }
            }
            for row in &report.rows {
                latest.insert(row.ticker_code().to_string(), row.clone());
            }
            let latest: Vec<ValuationSnapshot> = latest.into_values().collect();
            self.storage
                .write_file(&latest_file(sid), &serde_json::to_vec_pretty(&latest)?)
                .await?;
        }

        let primary = files.first().cloned().unwrap_or_else(|| manifest_file(sid));
        manifest.runs.push(RunEntry {
            run,
            stage: report.stage,
            as_of_date: report.as_of_date,
            rows: report.rows.len(),
            failures: report.failures.len(),
            files,
        });
        self.storage
            .write_file(&manifest_file(sid), &serde_json::to_vec_pretty(&manifest)?)
            .await?;

        Ok(format!("{}/{}", self.config.output_path(), primary))
    }
}
