use crate::config::validate_feeds;
use crate::core::params::{
    required_return_for, QualityPolicy, RankOrder, RunParameters, ScoreWeights, ValuationParams,
    DEFAULT_REQUIRED_RETURN,
};
use crate::core::ConfigProvider;
use crate::domain::model::{SnapshotId, Stage};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{validate_path, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub run: RunConfig,
    #[serde(default)]
    pub feeds: FeedsConfig,
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default)]
    pub quality: QualityPolicy,
    pub load: LoadConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    pub snapshot_id: Option<String>,
    /// YYYY-MM-DD
    pub as_of: Option<String>,
    pub stages: Option<String>,
    pub required_return: Option<f64>,
    pub persistence: Option<f64>,
    pub clamp_negative_residual: Option<bool>,
    pub rank_order: Option<String>,
    pub top_n: Option<usize>,
    /// Per-snapshot required return, keyed by snapshot id ("2026Q1").
    pub discount_rates: Option<HashMap<String, f64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedsConfig {
    pub tickers: Option<String>,
    pub fundamentals: Option<String>,
    pub quotes: Option<String>,
    pub baseline: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub json: Option<bool>,
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value. Unset variables are left as-is.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn snapshot_id(&self) -> Result<Option<SnapshotId>> {
        self.run.snapshot_id.as_deref().map(str::parse).transpose()
    }

    pub fn as_of_date(&self) -> Result<Option<chrono::NaiveDate>> {
        self.run
            .as_of
            .as_deref()
            .map(|s| {
                chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| {
                    EtlError::InvalidConfigValueError {
                        field: "run.as_of".to_string(),
                        value: s.to_string(),
                        reason: e.to_string(),
                    }
                })
            })
            .transpose()
    }

    pub fn valuation(&self, snapshot_id: SnapshotId) -> ValuationParams {
        let defaults = ValuationParams::default();
        ValuationParams {
            required_return: required_return_for(
                snapshot_id,
                self.run.required_return.unwrap_or(DEFAULT_REQUIRED_RETURN),
                self.run.discount_rates.as_ref(),
            ),
            persistence: self.run.persistence.unwrap_or(defaults.persistence),
            clamp_negative_residual: self
                .run
                .clamp_negative_residual
                .unwrap_or(defaults.clamp_negative_residual),
        }
    }

    pub fn rank_order(&self) -> Result<RankOrder> {
        match &self.run.rank_order {
            Some(order) => order.parse(),
            None => Ok(RankOrder::default()),
        }
    }

    pub fn json_logs(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.json)
            .unwrap_or(false)
    }

    pub fn verbose(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .map(|level| matches!(level.to_ascii_lowercase().as_str(), "debug" | "trace"))
            .unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn baseline_path(&self) -> Option<&str> {
        self.feeds.baseline.as_deref()
    }

    fn stage(&self) -> Result<Stage> {
        match &self.run.stages {
            Some(stages) => stages.parse(),
            None => Ok(Stage::Full),
        }
    }

    fn run_parameters(&self) -> Result<RunParameters> {
        let params = RunParameters::new(self.snapshot_id()?, self.as_of_date()?)?;
        let valuation = self.valuation(params.snapshot_id);
        Ok(params
            .with_valuation(valuation)
            .with_quality(self.quality.clone())
            .with_weights(self.weights.clone())
            .with_rank_order(self.rank_order()?, self.run.top_n))
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        validate_path("load.output_path", &self.load.output_path)?;
        validate_feeds(
            self.stage()?,
            self.feeds.tickers.as_deref(),
            self.feeds.fundamentals.as_deref(),
            self.feeds.quotes.as_deref(),
            self.feeds.baseline.as_deref(),
        )?;
        if let Some(rates) = &self.run.discount_rates {
            for key in rates.keys() {
                key.parse::<SnapshotId>()?;
            }
        }
        self.run_parameters()?.validate()
    }
}
