use crate::core::params::{
    ExcludePolicy, PenaltyMode, QualityPolicy, RankOrder, RunParameters, ScoreWeights,
    ValuationParams, DEFAULT_REQUIRED_RETURN,
};
use crate::core::ConfigProvider;
use crate::domain::model::{SnapshotId, Stage};
use crate::config::validate_feeds;
use crate::utils::error::Result;
use crate::utils::validation::{validate_path, Validate};
use chrono::NaiveDate;
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "srim-etl")]
#[command(about = "S-RIM snapshot valuation and scoring")]
pub struct CliConfig {
    #[arg(
        long,
        help = "As-of date (YYYY-MM-DD) for quote selection; defaults to the quarter end, \
                so a recompute needs it for quotes past that date"
    )]
    pub as_of: Option<NaiveDate>,

    #[arg(long, help = "Snapshot id such as 2026Q1; wins over --as-of")]
    pub snapshot_id: Option<SnapshotId>,

    #[arg(long, default_value = "full", help = "full | recompute, or a stage list like 0,1,2,3")]
    pub stages: Stage,

    #[arg(long = "required-return", visible_alias = "r", default_value_t = DEFAULT_REQUIRED_RETURN)]
    pub required_return: f64,

    #[arg(long, default_value_t = 1.0)]
    pub persistence: f64,

    #[arg(long)]
    pub clamp_negative_residual: bool,

    #[arg(long)]
    pub tickers: Option<String>,

    #[arg(long)]
    pub fundamentals: Option<String>,

    #[arg(long)]
    pub quotes: Option<String>,

    #[arg(long, help = "Baseline revision JSON for recompute (default: stored latest)")]
    pub baseline: Option<String>,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, default_value_t = 0.5)]
    pub w_gap: f64,

    #[arg(long, default_value_t = 0.3)]
    pub w_roe: f64,

    #[arg(long, default_value_t = 0.2)]
    pub w_pbr: f64,

    #[arg(long, default_value_t = 0.05)]
    pub warn_penalty: f64,

    #[arg(long, help = "Apply the WARN penalty once instead of per reason")]
    pub single_warn_penalty: bool,

    #[arg(long, help = "Leave excluded rows out of the ranking")]
    pub omit_excluded: bool,

    #[arg(long, default_value_t = -0.10, allow_hyphen_values = true)]
    pub roe_min: f64,

    #[arg(long, default_value_t = 0.50)]
    pub roe_max: f64,

    #[arg(long, default_value_t = 1)]
    pub stale_after: u32,

    #[arg(long, value_delimiter = ',')]
    pub finance_keywords: Vec<String>,

    #[arg(long, default_value = "score")]
    pub rank_order: RankOrder,

    #[arg(long)]
    pub top_n: Option<usize>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}

impl CliConfig {
    pub fn weights(&self) -> ScoreWeights {
        ScoreWeights {
            gap: self.w_gap,
            roe: self.w_roe,
            pbr: self.w_pbr,
            warn_penalty: self.warn_penalty,
            warn_penalty_mode: if self.single_warn_penalty {
                PenaltyMode::Single
            } else {
                PenaltyMode::PerReason
            },
            exclude_policy: if self.omit_excluded {
                ExcludePolicy::Omit
            } else {
                ExcludePolicy::Sentinel
            },
        }
    }
}

impl ConfigProvider for CliConfig {
    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn baseline_path(&self) -> Option<&str> {
        self.baseline.as_deref()
    }

    fn stage(&self) -> Result<Stage> {
        Ok(self.stages)
    }

    fn run_parameters(&self) -> Result<RunParameters> {
        Ok(RunParameters::new(self.snapshot_id, self.as_of)?
            .with_valuation(ValuationParams {
                required_return: self.required_return,
                persistence: self.persistence,
                clamp_negative_residual: self.clamp_negative_residual,
            })
            .with_quality(QualityPolicy {
                roe_min: self.roe_min,
                roe_max: self.roe_max,
                stale_after_periods: self.stale_after,
                finance_keywords: self.finance_keywords.clone(),
            })
            .with_weights(self.weights())
            .with_rank_order(self.rank_order, self.top_n))
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_path("output_path", &self.output_path)?;
        validate_feeds(
            self.stages,
            self.tickers.as_deref(),
            self.fundamentals.as_deref(),
            self.quotes.as_deref(),
            self.baseline.as_deref(),
        )?;
        self.run_parameters()?.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::EtlError;

    fn parse(args: &[&str]) -> CliConfig {
        let mut argv = vec!["srim-etl"];
        argv.extend_from_slice(args);
        CliConfig::parse_from(argv)
    }

    #[test]
    fn test_cli_defaults() {
        let config = parse(&["--as-of", "2026-01-04", "--stages", "3"]);
        assert_eq!(config.stages, Stage::Recompute);

        let params = config.run_parameters().unwrap();
        assert_eq!(params.snapshot_id.to_string(), "2026Q1");
        assert_eq!(params.valuation.required_return, 0.10);
        assert_eq!(params.weights, ScoreWeights::default());
        assert_eq!(params.quality, QualityPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_run_requires_feeds() {
        let config = parse(&["--as-of", "2026-01-04"]);
        assert!(matches!(
            config.validate(),
            Err(EtlError::MissingConfigError { .. })
        ));

        let config = parse(&[
            "--as-of",
            "2026-01-04",
            "--tickers",
            "tickers.csv",
            "--fundamentals",
            "fundamentals.csv",
            "--quotes",
            "quotes.txt",
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_rate_fails_validation() {
        let config = parse(&["--snapshot-id", "2026Q1", "--stages", "recompute", "--r", "0"]);
        assert!(matches!(
            config.validate(),
            Err(EtlError::InvalidParameterError { .. })
        ));
    }

    #[test]
    fn test_weight_flags() {
        let config = parse(&[
            "--snapshot-id",
            "2026Q1",
            "--stages",
            "recompute",
            "--single-warn-penalty",
            "--omit-excluded",
            "--w-pbr",
            "0",
        ]);
        let weights = config.weights();
        assert_eq!(weights.pbr, 0.0);
        assert_eq!(weights.warn_penalty_mode, PenaltyMode::Single);
        assert_eq!(weights.exclude_policy, ExcludePolicy::Omit);
    }
}
