use crate::core::Pipeline;
use crate::domain::model::{Quality, RunReport};
use crate::utils::error::Result;
use std::time::Instant;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
}

#[derive(Debug, Clone)]
pub struct EtlOutcome {
    pub report: RunReport,
    pub output_path: String,
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

impl EtlOutcome {
    /// Run counts followed by the first `limit` ranking lines.
    pub fn summary(&self, limit: usize) -> String {
        let report = &self.report;
        let mut lines = vec![
            format!(
                "Snapshot {} ({}, as of {}, r = {})",
                report.snapshot_id,
                report.stage,
                report.as_of_date,
                report.required_return
            ),
            format!(
                "  OK: {}  WARN: {}  EXCLUDE: {}  failed: {}",
                report.count(Quality::Ok),
                report.count(Quality::Warn),
                report.count(Quality::Exclude),
                report.failures.len()
            ),
        ];

        for row in report.ranked.iter().take(limit) {
            let score = match row.quality {
                Quality::Exclude => "excluded".to_string(),
                _ => cell(row.score),
            };
            lines.push(format!(
                "  {:>4}  {:<8} {:<20} score {:>8}  gap {:>8}%  iv {:>10}  price {:>10}  {}",
                row.rank,
                row.ticker,
                row.name.as_deref().unwrap_or(""),
                score,
                cell(row.gap_pct),
                cell(row.intrinsic_value),
                cell(row.market_price),
                row.reasons
            ));
        }

        for failure in &report.failures {
            lines.push(format!("  failed {}: {}", failure.ticker, failure.code));
        }
        lines.join("\n")
    }
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<EtlOutcome> {
        let started = Instant::now();
        tracing::info!("Starting S-RIM run...");

        // Extract
        tracing::info!("Extracting feeds...");
        let batch = self.pipeline.extract().await?;
        tracing::info!(
            "Extracted {} tickers, {} fundamental records, {} quotes, {} baseline rows",
            batch.tickers.len(),
            batch.fundamentals.len(),
            batch.quotes.len(),
            batch.baseline.len()
        );

        // Transform
        tracing::info!("Valuing and scoring...");
        let report = self.pipeline.transform(batch).await?;
        tracing::info!(
            "Computed {} rows ({} ranked, {} failures)",
            report.rows.len(),
            report.ranked.len(),
            report.failures.len()
        );

        // Load
        tracing::info!("Saving snapshot...");
        let output_path = self.pipeline.load(&report).await?;
        tracing::info!("Output saved to: {} in {:?}", output_path, started.elapsed());

        Ok(EtlOutcome {
            report,
            output_path,
        })
    }
}
