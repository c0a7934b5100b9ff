//! Immutable run parameters. One `RunParameters` value is shared read-only by
//! every per-ticker computation of a run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::domain::model::SnapshotId;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_non_negative, validate_positive_number,
    validate_positive_rate, validate_range, Validate,
};

pub const DEFAULT_REQUIRED_RETURN: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationParams {
    /// Required rate of return `r`.
    pub required_return: f64,
    /// Share of residual income assumed to persist, in [0, 1].
    pub persistence: f64,
    /// Floor negative residual income at zero.
    pub clamp_negative_residual: bool,
}

impl Default for ValuationParams {
    fn default() -> Self {
        Self {
            required_return: DEFAULT_REQUIRED_RETURN,
            persistence: 1.0,
            clamp_negative_residual: false,
        }
    }
}

impl Validate for ValuationParams {
    fn validate(&self) -> Result<()> {
        validate_positive_rate("required_return", self.required_return)?;
        validate_range("persistence", self.persistence, 0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityPolicy {
    pub roe_min: f64,
    pub roe_max: f64,
    /// Fundamentals lagging the as-of quarter by more than this are stale.
    pub stale_after_periods: u32,
    /// Sector substrings flagged `FINANCE_OR_HOLDING`. Empty disables the rule.
    pub finance_keywords: Vec<String>,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            roe_min: -0.10,
            roe_max: 0.50,
            stale_after_periods: 1,
            finance_keywords: Vec::new(),
        }
    }
}

impl Validate for QualityPolicy {
    fn validate(&self) -> Result<()> {
        if !self.roe_min.is_finite() || !self.roe_max.is_finite() || self.roe_min >= self.roe_max {
            return Err(EtlError::InvalidParameterError {
                field: "quality.roe_band".to_string(),
                value: format!("[{}, {}]", self.roe_min, self.roe_max),
                reason: "bounds must be finite with min < max".to_string(),
            });
        }
        for keyword in &self.finance_keywords {
            validate_non_empty_string("quality.finance_keywords", keyword)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyMode {
    /// `warn_penalty` once per WARN reason.
    PerReason,
    /// `warn_penalty` once, however many reasons.
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcludePolicy {
    /// Excluded rows get `EXCLUDED_SCORE` and sort after every other row.
    Sentinel,
    /// Excluded rows are left out of the ranking (still reported as rows).
    Omit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub gap: f64,
    pub roe: f64,
    pub pbr: f64,
    pub warn_penalty: f64,
    pub warn_penalty_mode: PenaltyMode,
    pub exclude_policy: ExcludePolicy,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            gap: 0.5,
            roe: 0.3,
            pbr: 0.2,
            warn_penalty: 0.05,
            warn_penalty_mode: PenaltyMode::PerReason,
            exclude_policy: ExcludePolicy::Sentinel,
        }
    }
}

impl Validate for ScoreWeights {
    /// Weights need not sum to 1; that is left to the caller.
    fn validate(&self) -> Result<()> {
        validate_non_negative("weights.gap", self.gap)?;
        validate_non_negative("weights.roe", self.roe)?;
        validate_non_negative("weights.pbr", self.pbr)?;
        validate_non_negative("weights.warn_penalty", self.warn_penalty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankOrder {
    #[default]
    Score,
    GapDesc,
    GapAsc,
    IntrinsicDesc,
    IntrinsicAsc,
}

impl FromStr for RankOrder {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "score" => Ok(RankOrder::Score),
            "gap_desc" => Ok(RankOrder::GapDesc),
            "gap_asc" => Ok(RankOrder::GapAsc),
            "intrinsic_desc" | "srim_desc" => Ok(RankOrder::IntrinsicDesc),
            "intrinsic_asc" | "srim_asc" => Ok(RankOrder::IntrinsicAsc),
            other => Err(EtlError::InvalidConfigValueError {
                field: "rank_order".to_string(),
                value: other.to_string(),
                reason: "expected score, gap_desc, gap_asc, intrinsic_desc or intrinsic_asc"
                    .to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    pub snapshot_id: SnapshotId,
    pub as_of_date: NaiveDate,
    pub valuation: ValuationParams,
    pub quality: QualityPolicy,
    pub weights: ScoreWeights,
    pub rank_order: RankOrder,
    pub top_n: Option<usize>,
}

impl RunParameters {
    /// Resolves the snapshot and as-of date. `snapshot_id` wins when both are
    /// given; a missing as-of date defaults to the last day of the
    /// snapshot's quarter.
    pub fn new(snapshot_id: Option<SnapshotId>, as_of_date: Option<NaiveDate>) -> Result<Self> {
        let (snapshot_id, as_of_date) = match (snapshot_id, as_of_date) {
            (Some(sid), Some(date)) => (sid, date),
            (Some(sid), None) => (sid, sid.period().end_date()),
            (None, Some(date)) => (SnapshotId::for_date(date), date),
            (None, None) => {
                return Err(EtlError::MissingConfigError {
                    field: "snapshot_id or as_of_date".to_string(),
                })
            }
        };

        Ok(Self {
            snapshot_id,
            as_of_date,
            valuation: ValuationParams::default(),
            quality: QualityPolicy::default(),
            weights: ScoreWeights::default(),
            rank_order: RankOrder::default(),
            top_n: None,
        })
    }

    pub fn with_valuation(mut self, valuation: ValuationParams) -> Self {
        self.valuation = valuation;
        self
    }

    pub fn with_quality(mut self, quality: QualityPolicy) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_rank_order(mut self, rank_order: RankOrder, top_n: Option<usize>) -> Self {
        self.rank_order = rank_order;
        self.top_n = top_n;
        self
    }
}

impl Validate for RunParameters {
    fn validate(&self) -> Result<()> {
        self.valuation.validate()?;
        self.quality.validate()?;
        self.weights.validate()?;
        if let Some(n) = self.top_n {
            validate_positive_number("top_n", n, 1)?;
        }
        Ok(())
    }
}

/// Required return for a snapshot: the per-snapshot table entry if present,
/// otherwise the default.
pub fn required_return_for(
    snapshot_id: SnapshotId,
    default_rate: f64,
    discount_rates: Option<&HashMap<String, f64>>,
) -> f64 {
    discount_rates
        .and_then(|rates| rates.get(&snapshot_id.to_string()))
        .copied()
        .unwrap_or(default_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_snapshot_id_takes_precedence() {
        let params =
            RunParameters::new(Some("2025Q4".parse().unwrap()), Some(date(2026, 1, 4))).unwrap();
        assert_eq!(params.snapshot_id.to_string(), "2025Q4");
        assert_eq!(params.as_of_date, date(2026, 1, 4));
    }

    #[test]
    fn test_as_of_resolves_snapshot() {
        let params = RunParameters::new(None, Some(date(2026, 5, 20))).unwrap();
        assert_eq!(params.snapshot_id.to_string(), "2026Q2");
    }

    #[test]
    fn test_snapshot_only_defaults_as_of_to_quarter_end() {
        let params = RunParameters::new(Some("2026Q1".parse().unwrap()), None).unwrap();
        assert_eq!(params.as_of_date, date(2026, 3, 31));
    }

    #[test]
    fn test_neither_snapshot_nor_date_fails() {
        assert!(RunParameters::new(None, None).is_err());
    }

    #[test]
    fn test_non_positive_rate_is_invalid_parameter() {
        let params = RunParameters::new(None, Some(date(2026, 1, 4)))
            .unwrap()
            .with_valuation(ValuationParams {
                required_return: 0.0,
                ..ValuationParams::default()
            });
        assert!(matches!(
            params.validate(),
            Err(EtlError::InvalidParameterError { .. })
        ));
    }

    #[test]
    fn test_negative_weight_is_invalid_parameter() {
        let params = RunParameters::new(None, Some(date(2026, 1, 4)))
            .unwrap()
            .with_weights(ScoreWeights {
                roe: -0.3,
                ..ScoreWeights::default()
            });
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("weights.roe"));
    }

    #[test]
    fn test_required_return_table_lookup() {
        let mut rates = HashMap::new();
        rates.insert("2026Q1".to_string(), 0.08);
        let q1: SnapshotId = "2026Q1".parse().unwrap();
        let q2: SnapshotId = "2026Q2".parse().unwrap();
        assert_eq!(required_return_for(q1, 0.10, Some(&rates)), 0.08);
        assert_eq!(required_return_for(q2, 0.10, Some(&rates)), 0.10);
        assert_eq!(required_return_for(q1, 0.10, None), 0.10);
    }

    #[test]
    fn test_rank_order_parsing() {
        assert_eq!("gap_desc".parse::<RankOrder>().unwrap(), RankOrder::GapDesc);
        assert_eq!("srim_asc".parse::<RankOrder>().unwrap(), RankOrder::IntrinsicAsc);
        assert!("mcap_desc".parse::<RankOrder>().is_err());
    }
}
