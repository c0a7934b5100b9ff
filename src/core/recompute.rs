//! Price-only recomputation against stored fundamentals.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::core::evaluate::{assemble_report, evaluate};
use crate::core::params::RunParameters;
use crate::core::snapshot::select_quote;
use crate::domain::model::{
    MarketQuote, RowFailure, RunReport, SnapshotId, SnapshotRow, Stage, Ticker, ValuationSnapshot,
};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::Validate;

pub struct Recomputation<'a> {
    snapshot_id: SnapshotId,
    as_of_date: NaiveDate,
    /// Latest baseline revision per ticker, ordered by code.
    baseline: BTreeMap<String, &'a ValuationSnapshot>,
    quotes: HashMap<String, Vec<&'a MarketQuote>>,
}

impl<'a> Recomputation<'a> {
    pub fn new(
        snapshot_id: SnapshotId,
        as_of_date: NaiveDate,
        baseline: &'a [ValuationSnapshot],
        quotes: &'a [MarketQuote],
    ) -> Self {
        let mut latest: BTreeMap<String, &'a ValuationSnapshot> = BTreeMap::new();
        for snapshot in baseline.iter().filter(|s| s.snapshot_id() == snapshot_id) {
            let code = Ticker::normalize_code(snapshot.ticker_code());
            match latest.get(&code) {
                Some(existing) if existing.revision() > snapshot.revision() => {}
                _ => {
                    latest.insert(code, snapshot);
                }
            }
        }

        let mut by_ticker: HashMap<String, Vec<&'a MarketQuote>> = HashMap::new();
        for quote in quotes {
            by_ticker
                .entry(Ticker::normalize_code(&quote.ticker))
                .or_default()
                .push(quote);
        }

        Self {
            snapshot_id,
            as_of_date,
            baseline: latest,
            quotes: by_ticker,
        }
    }

    /// Every ticker with a baseline under this snapshot.
    pub fn baseline_tickers(&self) -> Vec<String> {
        self.baseline.keys().cloned().collect()
    }

    /// Latest quote date for `code` past the as-of date, if any. Such quotes
    /// are never selected.
    pub fn later_quote(&self, code: &str) -> Option<NaiveDate> {
        self.quotes
            .get(code)?
            .iter()
            .map(|q| q.as_of_date)
            .filter(|d| *d > self.as_of_date)
            .max()
    }

    /// Next revision for `code`: same fundamentals, new quote. Without a new
    /// quote on or before the as-of date the prior quote is carried over.
    pub fn revise_row(&self, code: &str) -> Result<SnapshotRow> {
        let prior = self
            .baseline
            .get(code)
            .ok_or_else(|| EtlError::NoFundamentalSnapshotError {
                ticker: code.to_string(),
                snapshot_id: self.snapshot_id.to_string(),
            })?;

        let quote = match self
            .quotes
            .get(code)
            .and_then(|quotes| select_quote(quotes, self.as_of_date))
        {
            Some(quote) => Some(MarketQuote {
                ticker: code.to_string(),
                ..quote.clone()
            }),
            None => {
                match self.later_quote(code) {
                    Some(later) => tracing::warn!(
                        "Ignoring {} quote dated {}, after as-of {}; pass --as-of to use it",
                        code,
                        later,
                        self.as_of_date
                    ),
                    None => tracing::info!(
                        "No new quote for {}, keeping revision {} quote",
                        code,
                        prior.revision()
                    ),
                }
                prior.row.quote.clone()
            }
        };

        Ok(prior.row.revise(quote, self.as_of_date))
    }
}

/// Re-runs valuation and scoring for `tickers` (or, when empty, for every
/// baseline ticker of the snapshot) without touching fundamentals.
pub fn run_recompute(
    baseline: &[ValuationSnapshot],
    quotes: &[MarketQuote],
    tickers: &[Ticker],
    params: &RunParameters,
) -> Result<RunReport> {
    params.validate()?;

    let recomputation = Recomputation::new(params.snapshot_id, params.as_of_date, baseline, quotes);

    let requested: Vec<String> = if tickers.is_empty() {
        recomputation.baseline_tickers()
    } else {
        let mut seen = HashSet::new();
        tickers
            .iter()
            .map(|t| Ticker::normalize_code(&t.code))
            .filter(|code| seen.insert(code.clone()))
            .collect()
    };

    let mut rows = Vec::with_capacity(requested.len());
    let mut failures = Vec::new();
    for code in &requested {
        match recomputation.revise_row(code) {
            Ok(row) => rows.push(evaluate(row, params)),
            Err(e) => {
                tracing::warn!("{}", e);
                failures.push(RowFailure::from_error(code, &e));
            }
        }
    }

    Ok(assemble_report(Stage::Recompute, params, rows, failures))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::evaluate::run_full;
    use crate::domain::model::{FeedBatch, FundamentalRecord, Quality};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn quote(ticker: &str, on: NaiveDate, price: f64) -> MarketQuote {
        MarketQuote {
            ticker: ticker.to_string(),
            as_of_date: on,
            price,
            market_cap: Some(price * 10.0),
        }
    }

    fn baseline_report() -> RunReport {
        let batch = FeedBatch {
            tickers: vec![
                Ticker::new("005930", "KOSPI"),
                Ticker::new("000660", "KOSPI"),
            ],
            fundamentals: vec![
                FundamentalRecord {
                    ticker: "005930".to_string(),
                    period: "2025Q4".parse().unwrap(),
                    book_value_of_equity: 100.0,
                    net_income: 15.0,
                    shares_outstanding: 10.0,
                    total_debt: None,
                    operating_cash_flow: None,
                },
                FundamentalRecord {
                    ticker: "000660".to_string(),
                    period: "2025Q4".parse().unwrap(),
                    book_value_of_equity: 200.0,
                    net_income: 20.0,
                    shares_outstanding: 10.0,
                    total_debt: Some(50.0),
                    operating_cash_flow: None,
                },
            ],
            quotes: vec![
                quote("005930", date(2026, 1, 2), 11.0),
                quote("000660", date(2026, 1, 2), 18.0),
            ],
            baseline: Vec::new(),
        };
        run_full(&batch, &params()).unwrap()
    }

    fn params() -> RunParameters {
        RunParameters::new(Some("2026Q1".parse().unwrap()), Some(date(2026, 1, 4))).unwrap()
    }

    #[test]
    fn test_same_quote_is_bit_identical() {
        let base = baseline_report();
        let quotes = vec![quote("005930", date(2026, 1, 2), 11.0)];
        let report = run_recompute(&base.rows, &quotes, &[], &params()).unwrap();

        let before = base.rows.iter().find(|r| r.ticker_code() == "005930").unwrap();
        let after = report.rows.iter().find(|r| r.ticker_code() == "005930").unwrap();
        assert_eq!(after.revision(), 1);
        assert_eq!(after.row.fundamental, before.row.fundamental);
        assert_eq!(after.derived, before.derived);
        assert_eq!(after.components, before.components);
        assert_eq!(after.score.map(f64::to_bits), before.score.map(f64::to_bits));
    }

    #[test]
    fn test_new_price_changes_only_price_dependent_fields() {
        let base = baseline_report();
        let quotes = vec![quote("000660", date(2026, 1, 3), 25.0)];
        let report = run_recompute(&base.rows, &quotes, &[], &params()).unwrap();

        let before = base.rows.iter().find(|r| r.ticker_code() == "000660").unwrap();
        let after = report.rows.iter().find(|r| r.ticker_code() == "000660").unwrap();
        assert_eq!(after.row.fundamental, before.row.fundamental);
        assert_eq!(after.derived.intrinsic_value, before.derived.intrinsic_value);
        assert_ne!(after.derived.gap_pct, before.derived.gap_pct);
        assert_eq!(after.row.quote.as_ref().unwrap().price, 25.0);
        // 005930 had no new quote and keeps its previous price.
        let kept = report.rows.iter().find(|r| r.ticker_code() == "005930").unwrap();
        assert_eq!(kept.row.quote.as_ref().unwrap().price, 11.0);
    }

    #[test]
    fn test_unknown_ticker_is_skipped_not_fatal() {
        let base = baseline_report();
        let tickers = vec![
            Ticker::new("005930", "KOSPI"),
            Ticker::new("035720", "KOSPI"),
        ];
        let report = run_recompute(&base.rows, &[], &tickers, &params()).unwrap();

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].ticker, "035720");
        assert_eq!(report.failures[0].code, "NO_FUNDAMENTAL_SNAPSHOT");
    }

    #[test]
    fn test_other_snapshot_is_not_a_baseline() {
        let base = baseline_report();
        let q2 = RunParameters::new(Some("2026Q2".parse().unwrap()), None).unwrap();
        let report = run_recompute(&base.rows, &[], &[Ticker::new("005930", "KOSPI")], &q2).unwrap();
        assert!(report.rows.is_empty());
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn test_quote_after_quarter_end_is_not_used() {
        let base = baseline_report();
        // No as-of date: the quarter end 2026-03-31 is used.
        let quarter = RunParameters::new(Some("2026Q1".parse().unwrap()), None).unwrap();
        assert_eq!(quarter.as_of_date, date(2026, 3, 31));

        let quotes = vec![quote("005930", date(2026, 4, 2), 40.0)];
        let recomputation =
            Recomputation::new(quarter.snapshot_id, quarter.as_of_date, &base.rows, &quotes);
        assert_eq!(recomputation.later_quote("005930"), Some(date(2026, 4, 2)));
        assert_eq!(recomputation.later_quote("000660"), None);

        let report = run_recompute(&base.rows, &quotes, &[], &quarter).unwrap();
        let row = report.rows.iter().find(|r| r.ticker_code() == "005930").unwrap();
        assert_eq!(row.revision(), 1);
        assert_eq!(row.row.quote.as_ref().unwrap().price, 11.0);
        assert_eq!(row.row.as_of_date, date(2026, 3, 31));

        // With the later as-of date the same quote is picked up.
        let later =
            RunParameters::new(Some("2026Q1".parse().unwrap()), Some(date(2026, 4, 2))).unwrap();
        let report = run_recompute(&base.rows, &quotes, &[], &later).unwrap();
        let row = report.rows.iter().find(|r| r.ticker_code() == "005930").unwrap();
        assert_eq!(row.row.quote.as_ref().unwrap().price, 40.0);
    }

    #[test]
    fn test_latest_revision_is_the_baseline() {
        let base = baseline_report();
        let first = run_recompute(
            &base.rows,
            &[quote("005930", date(2026, 1, 3), 30.0)],
            &[],
            &params(),
        )
        .unwrap();

        let mut history = base.rows.clone();
        history.extend(first.rows.clone());
        let second = run_recompute(&history, &[], &[], &params()).unwrap();

        let row = second.rows.iter().find(|r| r.ticker_code() == "005930").unwrap();
        assert_eq!(row.revision(), 2);
        assert_eq!(row.row.quote.as_ref().unwrap().price, 30.0);
        assert_eq!(row.quality, Quality::Ok);
    }
}
