use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::EtlError;

/// A listed security. The code is normalized on construction, so two feeds
/// spelling `5930` and ` 005930` refer to the same ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub code: String,
    pub market: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
}

impl Ticker {
    pub fn new(code: &str, market: &str) -> Self {
        Self {
            code: Self::normalize_code(code),
            market: market.trim().to_string(),
            name: None,
            sector: None,
        }
    }

    pub fn with_sector(mut self, sector: &str) -> Self {
        self.sector = Some(sector.to_string());
        self
    }

    /// Trims the code and left-pads all-digit codes to six characters.
    pub fn normalize_code(code: &str) -> String {
        let trimmed = code.trim();
        if !trimmed.is_empty() && trimmed.len() < 6 && trimmed.chars().all(|c| c.is_ascii_digit()) {
            format!("{:0>6}", trimmed)
        } else {
            trimmed.to_string()
        }
    }
}

/// Fiscal quarter. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReportingPeriod {
    year: i32,
    quarter: u8,
}

impl ReportingPeriod {
    pub fn new(year: i32, quarter: u8) -> Result<Self, EtlError> {
        if !(1..=4).contains(&quarter) {
            return Err(EtlError::InvalidConfigValueError {
                field: "period".to_string(),
                value: format!("{}Q{}", year, quarter),
                reason: "quarter must be between 1 and 4".to_string(),
            });
        }
        Ok(Self { year, quarter })
    }

    /// The quarter containing `date` (2026-01-04 -> 2026Q1).
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: ((date.month() - 1) / 3 + 1) as u8,
        }
    }

    /// Last calendar day of the quarter.
    pub fn end_date(&self) -> NaiveDate {
        let (year, month) = if self.quarter == 4 {
            (self.year + 1, 1)
        } else {
            (self.year, u32::from(self.quarter) * 3 + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|first_of_next| first_of_next.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    fn ordinal(&self) -> i64 {
        i64::from(self.year) * 4 + i64::from(self.quarter) - 1
    }

    /// Number of whole quarters from `earlier` to `self`; negative when
    /// `earlier` is actually later.
    pub fn periods_since(&self, earlier: &ReportingPeriod) -> i64 {
        self.ordinal() - earlier.ordinal()
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.quarter)
    }
}

impl FromStr for ReportingPeriod {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| EtlError::InvalidConfigValueError {
            field: "period".to_string(),
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let tag = s.trim().to_ascii_uppercase();
        let (year, quarter) = tag
            .split_once('Q')
            .ok_or_else(|| invalid("expected a quarter tag like 2026Q1"))?;
        let year: i32 = year.parse().map_err(|_| invalid("year is not a number"))?;
        let quarter: u8 = quarter
            .parse()
            .map_err(|_| invalid("quarter is not a number"))?;
        Self::new(year, quarter)
    }
}

impl TryFrom<String> for ReportingPeriod {
    type Error = EtlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReportingPeriod> for String {
    fn from(period: ReportingPeriod) -> Self {
        period.to_string()
    }
}

/// Identifier of one reporting-period computation run, e.g. `2026Q1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(ReportingPeriod);

impl SnapshotId {
    pub fn for_date(date: NaiveDate) -> Self {
        Self(ReportingPeriod::containing(date))
    }

    pub fn period(&self) -> ReportingPeriod {
        self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SnapshotId {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Per-ticker, per-period fundamentals as delivered by a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalRecord {
    pub ticker: String,
    pub period: ReportingPeriod,
    pub book_value_of_equity: f64,
    pub net_income: f64,
    pub shares_outstanding: f64,
    #[serde(default)]
    pub total_debt: Option<f64>,
    #[serde(default)]
    pub operating_cash_flow: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub ticker: String,
    pub as_of_date: NaiveDate,
    pub price: f64,
    #[serde(default)]
    pub market_cap: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    Ok,
    Warn,
    Exclude,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Quality::Ok => "OK",
            Quality::Warn => "WARN",
            Quality::Exclude => "EXCLUDE",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    MissingMarketQuote,
    NonPositiveEquity,
    NonPositiveShares,
    NonPositivePrice,
    NonFiniteValue,
    IntrinsicValueUndefined,
    NegativeEarnings,
    RoeOutlier,
    StaleFundamentals,
    FinanceOrHolding,
    NoScorableComponents,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::MissingMarketQuote => "MISSING_MARKET_QUOTE",
            ReasonCode::NonPositiveEquity => "NON_POSITIVE_EQUITY",
            ReasonCode::NonPositiveShares => "NON_POSITIVE_SHARES",
            ReasonCode::NonPositivePrice => "NON_POSITIVE_PRICE",
            ReasonCode::NonFiniteValue => "NON_FINITE_VALUE",
            ReasonCode::IntrinsicValueUndefined => "INTRINSIC_VALUE_UNDEFINED",
            ReasonCode::NegativeEarnings => "NEGATIVE_EARNINGS",
            ReasonCode::RoeOutlier => "ROE_OUTLIER",
            ReasonCode::StaleFundamentals => "STALE_FUNDAMENTALS",
            ReasonCode::FinanceOrHolding => "FINANCE_OR_HOLDING",
            ReasonCode::NoScorableComponents => "NO_SCORABLE_COMPONENTS",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The frozen inputs of one snapshot row: fundamentals plus the quote used
/// for this revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub snapshot_id: SnapshotId,
    pub ticker: Ticker,
    pub revision: u32,
    pub as_of_date: NaiveDate,
    pub fundamental: FundamentalRecord,
    pub quote: Option<MarketQuote>,
}

impl SnapshotRow {
    /// Next revision of this row. Fundamentals are carried over untouched.
    pub fn revise(&self, quote: Option<MarketQuote>, as_of_date: NaiveDate) -> SnapshotRow {
        SnapshotRow {
            snapshot_id: self.snapshot_id,
            ticker: self.ticker.clone(),
            revision: self.revision + 1,
            as_of_date,
            fundamental: self.fundamental.clone(),
            quote,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedFields {
    pub book_value_per_share: Option<f64>,
    pub roe_derived: Option<f64>,
    pub intrinsic_value: Option<f64>,
    pub gap_pct: Option<f64>,
    pub pbr_derived: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub gap_score: Option<f64>,
    pub roe_score: Option<f64>,
    pub pbr_score: Option<f64>,
    pub penalty: f64,
}

/// One computed revision of a ticker within a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    pub row: SnapshotRow,
    pub required_return: f64,
    pub derived: DerivedFields,
    pub quality: Quality,
    pub reasons: Vec<ReasonCode>,
    pub components: ScoreComponents,
    /// `None` only for excluded rows under the omit policy or when no
    /// component could be scored.
    pub score: Option<f64>,
}

impl ValuationSnapshot {
    pub fn ticker_code(&self) -> &str {
        &self.row.ticker.code
    }

    pub fn snapshot_id(&self) -> SnapshotId {
        self.row.snapshot_id
    }

    pub fn revision(&self) -> u32 {
        self.row.revision
    }

    pub fn is_excluded(&self) -> bool {
        self.quality == Quality::Exclude
    }
}

/// A requested ticker that produced no row, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    pub ticker: String,
    pub code: String,
    pub message: String,
}

impl RowFailure {
    pub fn from_error(ticker: &str, error: &EtlError) -> Self {
        Self {
            ticker: ticker.to_string(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Flat ranking line, written as CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRow {
    pub rank: usize,
    pub ticker: String,
    pub market: String,
    pub name: Option<String>,
    pub revision: u32,
    pub score: Option<f64>,
    pub gap_pct: Option<f64>,
    pub intrinsic_value: Option<f64>,
    pub market_price: Option<f64>,
    pub roe_derived: Option<f64>,
    pub pbr_derived: Option<f64>,
    pub quality: Quality,
    pub reasons: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Fundamental ingestion, valuation and scoring.
    Full,
    /// Valuation and scoring against stored fundamentals.
    Recompute,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Full => f.write_str("full"),
            Stage::Recompute => f.write_str("recompute"),
        }
    }
}

impl FromStr for Stage {
    type Err = EtlError;

    /// Accepts `full`/`recompute` or a numeric stage list such as `0,1,2,3`
    /// (any ingestion stage 0-2 means a full run) or `3` (valuation only).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| EtlError::InvalidConfigValueError {
            field: "stages".to_string(),
            value: s.to_string(),
            reason,
        };

        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "all" => return Ok(Stage::Full),
            "recompute" | "valuation" => return Ok(Stage::Recompute),
            _ => {}
        }

        let mut stages = Vec::new();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let stage: u8 = token
                .parse()
                .map_err(|_| invalid(format!("unknown stage '{}'", token)))?;
            if stage > 3 {
                return Err(invalid(format!("stage {} does not exist", stage)));
            }
            stages.push(stage);
        }

        if stages.is_empty() {
            Err(invalid("no stage selected".to_string()))
        } else if stages.iter().any(|s| *s < 3) {
            Ok(Stage::Full)
        } else {
            Ok(Stage::Recompute)
        }
    }
}

/// Everything `extract` hands to `transform`.
#[derive(Debug, Clone, Default)]
pub struct FeedBatch {
    pub tickers: Vec<Ticker>,
    pub fundamentals: Vec<FundamentalRecord>,
    pub quotes: Vec<MarketQuote>,
    pub baseline: Vec<ValuationSnapshot>,
}

/// Result of one run: one row or one failure per requested ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub snapshot_id: SnapshotId,
    pub as_of_date: NaiveDate,
    pub stage: Stage,
    pub required_return: f64,
    pub rows: Vec<ValuationSnapshot>,
    pub ranked: Vec<RankedRow>,
    pub failures: Vec<RowFailure>,
}

impl RunReport {
    pub fn count(&self, quality: Quality) -> usize {
        self.rows.iter().filter(|r| r.quality == quality).count()
    }
}
