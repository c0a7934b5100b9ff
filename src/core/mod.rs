pub mod etl;
pub mod evaluate;
pub mod params;
pub mod pipeline;
pub mod quality;
pub mod recompute;
pub mod scoring;
pub mod snapshot;
pub mod valuation;

pub use crate::domain::model::{FeedBatch, RunReport, ValuationSnapshot};
pub use crate::domain::ports::{ConfigProvider, FeedSource, Pipeline, Storage};
pub use crate::utils::error::Result;
