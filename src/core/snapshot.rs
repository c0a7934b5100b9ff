//! Snapshot assembly: pairs each ticker with its latest eligible fundamentals
//! and the as-of market quote.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

use crate::domain::model::{
    FundamentalRecord, MarketQuote, ReportingPeriod, RowFailure, SnapshotId, SnapshotRow, Ticker,
};
use crate::utils::error::{EtlError, Result};

#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    pub rows: Vec<SnapshotRow>,
    pub failures: Vec<RowFailure>,
}

pub struct SnapshotBuilder<'a> {
    snapshot_id: SnapshotId,
    as_of_date: NaiveDate,
    fundamentals: HashMap<String, Vec<&'a FundamentalRecord>>,
    quotes: HashMap<String, Vec<&'a MarketQuote>>,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(
        snapshot_id: SnapshotId,
        as_of_date: NaiveDate,
        fundamentals: &'a [FundamentalRecord],
        quotes: &'a [MarketQuote],
    ) -> Self {
        Self {
            snapshot_id,
            as_of_date,
            fundamentals: index_by_ticker(fundamentals, |r| r.ticker.as_str()),
            quotes: index_by_ticker(quotes, |q| q.ticker.as_str()),
        }
    }

    /// One row per distinct ticker; tickers without eligible fundamentals
    /// are reported as failures instead of aborting the batch.
    pub fn build(&self, tickers: &[Ticker]) -> BuildOutcome {
        let mut outcome = BuildOutcome::default();
        let mut seen = HashSet::new();

        for ticker in tickers {
            let ticker = Ticker {
                code: Ticker::normalize_code(&ticker.code),
                ..ticker.clone()
            };
            if !seen.insert(ticker.code.clone()) {
                tracing::debug!("Skipping duplicate ticker {}", ticker.code);
                continue;
            }

            match self.resolve_row(&ticker) {
                Ok(row) => outcome.rows.push(row),
                Err(e) => {
                    tracing::warn!("{}", e);
                    outcome.failures.push(RowFailure::from_error(&ticker.code, &e));
                }
            }
        }

        tracing::debug!(
            "Snapshot {} assembled: {} rows, {} failures",
            self.snapshot_id,
            outcome.rows.len(),
            outcome.failures.len()
        );
        outcome
    }

    pub fn resolve_row(&self, ticker: &Ticker) -> Result<SnapshotRow> {
        let fundamental = self
            .fundamentals
            .get(&ticker.code)
            .and_then(|records| select_fundamental(records, self.snapshot_id.period()))
            .ok_or_else(|| EtlError::MissingFundamentalError {
                ticker: ticker.code.clone(),
                snapshot_id: self.snapshot_id.to_string(),
            })?;

        let quote = self
            .quotes
            .get(&ticker.code)
            .and_then(|quotes| select_quote(quotes, self.as_of_date));

        if quote.is_none() {
            tracing::debug!("No quote on or before {} for {}", self.as_of_date, ticker.code);
        }

        Ok(SnapshotRow {
            snapshot_id: self.snapshot_id,
            ticker: ticker.clone(),
            revision: 0,
            as_of_date: self.as_of_date,
            fundamental: FundamentalRecord {
                ticker: ticker.code.clone(),
                ..fundamental.clone()
            },
            quote: quote.map(|q| MarketQuote {
                ticker: ticker.code.clone(),
                ..q.clone()
            }),
        })
    }
}

fn index_by_ticker<'a, T>(
    records: &'a [T],
    ticker_of: impl Fn(&T) -> &str,
) -> HashMap<String, Vec<&'a T>> {
    let mut index: HashMap<String, Vec<&'a T>> = HashMap::new();
    for record in records {
        index
            .entry(Ticker::normalize_code(ticker_of(record)))
            .or_default()
            .push(record);
    }
    index
}

/// Most recent record with `period <= snapshot_period`. Within the same
/// period the record appearing last in the feed wins.
pub fn select_fundamental<'a>(
    records: &[&'a FundamentalRecord],
    snapshot_period: ReportingPeriod,
) -> Option<&'a FundamentalRecord> {
    records
        .iter()
        .copied()
        .filter(|r| r.period <= snapshot_period)
        .fold(None, |best: Option<&FundamentalRecord>, r| match best {
            Some(b) if b.period > r.period => Some(b),
            _ => Some(r),
        })
}

/// Quote nearest to, but not after, `as_of`. Same-day duplicates resolve to
/// the one appearing last.
pub fn select_quote<'a>(quotes: &[&'a MarketQuote], as_of: NaiveDate) -> Option<&'a MarketQuote> {
    quotes
        .iter()
        .copied()
        .filter(|q| q.as_of_date <= as_of)
        .fold(None, |best: Option<&MarketQuote>, q| match best {
            Some(b) if b.as_of_date > q.as_of_date => Some(b),
            _ => Some(q),
        })
}
