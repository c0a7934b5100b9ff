//! File feed adapter. Reads the ticker universe, fundamentals and quotes
//! from CSV files with header rows.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::core::FeedSource;
use crate::domain::model::{FundamentalRecord, MarketQuote, Ticker};
use crate::utils::error::{EtlError, Result};

#[derive(Debug, Deserialize)]
struct TickerRow {
    code: String,
    market: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sector: Option<String>,
}

impl From<TickerRow> for Ticker {
    fn from(row: TickerRow) -> Self {
        let mut ticker = Ticker::new(&row.code, &row.market);
        ticker.name = row.name.filter(|n| !n.trim().is_empty());
        ticker.sector = row.sector.filter(|s| !s.trim().is_empty());
        ticker
    }
}

/// Any path left as `None` yields an empty feed.
#[derive(Debug, Clone, Default)]
pub struct CsvFeed {
    tickers_path: Option<PathBuf>,
    fundamentals_path: Option<PathBuf>,
    quotes_path: Option<PathBuf>,
}

impl CsvFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tickers(mut self, path: impl Into<PathBuf>) -> Self {
        self.tickers_path = Some(path.into());
        self
    }

    pub fn with_fundamentals(mut self, path: impl Into<PathBuf>) -> Self {
        self.fundamentals_path = Some(path.into());
        self
    }

    pub fn with_quotes(mut self, path: impl Into<PathBuf>) -> Self {
        self.quotes_path = Some(path.into());
        self
    }
}

async fn read_records<T: DeserializeOwned>(path: Option<&Path>) -> Result<Vec<T>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    let data = tokio::fs::read(path).await?;
    parse_records(&path.display().to_string(), &data)
}

/// Parses CSV with headers. A malformed record fails the whole feed.
pub fn parse_records<T: DeserializeOwned>(source_name: &str, data: &[u8]) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data);

    let mut records = Vec::new();
    for result in reader.deserialize::<T>() {
        let record = result.map_err(|e| EtlError::FeedRecordError {
            source_name: source_name.to_string(),
            line: e.position().map(|p| p.line()).unwrap_or(0),
            message: e.to_string(),
        })?;
        records.push(record);
    }

    tracing::debug!("Read {} records from {}", records.len(), source_name);
    Ok(records)
}

impl FeedSource for CsvFeed {
    async fn tickers(&self) -> Result<Vec<Ticker>> {
        let rows: Vec<TickerRow> = read_records(self.tickers_path.as_deref()).await?;
        Ok(rows.into_iter().map(Ticker::from).collect())
    }

    async fn fundamentals(&self) -> Result<Vec<FundamentalRecord>> {
        let records: Vec<FundamentalRecord> = read_records(self.fundamentals_path.as_deref()).await?;
        Ok(records
            .into_iter()
            .map(|r| FundamentalRecord {
                ticker: Ticker::normalize_code(&r.ticker),
                ..r
            })
            .collect())
    }

    async fn quotes(&self) -> Result<Vec<MarketQuote>> {
        let quotes: Vec<MarketQuote> = read_records(self.quotes_path.as_deref()).await?;
        Ok(quotes
            .into_iter()
            .map(|q| MarketQuote {
                ticker: Ticker::normalize_code(&q.ticker),
                ..q
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_fundamentals_with_optional_columns() {
        let data = "ticker,period,book_value_of_equity,net_income,shares_outstanding,total_debt,operating_cash_flow\n\
                    5930,2025Q4,100,15,10,,\n\
                    000660,2025Q3,200,20,10,50,30\n";
        let records: Vec<FundamentalRecord> = parse_records("fundamentals.csv", data.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].period.to_string(), "2025Q4");
        assert_eq!(records[0].total_debt, None);
        assert_eq!(records[1].total_debt, Some(50.0));
    }

    #[test]
    fn test_parse_quotes() {
        let data = "ticker,as_of_date,price,market_cap\n005930,2026-01-02,11,110\n";
        let quotes: Vec<MarketQuote> = parse_records("quotes.csv", data.as_bytes()).unwrap();
        assert_eq!(quotes[0].as_of_date, NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());
        assert_eq!(quotes[0].market_cap, Some(110.0));
    }

    #[test]
    fn test_bad_record_reports_line() {
        let data = "ticker,as_of_date,price,market_cap\n005930,2026-01-02,eleven,110\n";
        let err = parse_records::<MarketQuote>("quotes.csv", data.as_bytes()).unwrap_err();
        match err {
            EtlError::FeedRecordError { source_name, line, .. } => {
                assert_eq!(source_name, "quotes.csv");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_csv_feed_normalizes_codes() {
        let mut tickers = NamedTempFile::new().unwrap();
        writeln!(tickers, "code,market,name,sector").unwrap();
        writeln!(tickers, "5930,KOSPI,Samsung Electronics,").unwrap();

        let mut quotes = NamedTempFile::new().unwrap();
        writeln!(quotes, "ticker,as_of_date,price,market_cap").unwrap();
        writeln!(quotes, "5930,2026-01-02,11,").unwrap();

        let feed = CsvFeed::new()
            .with_tickers(tickers.path())
            .with_quotes(quotes.path());

        let loaded = feed.tickers().await.unwrap();
        assert_eq!(loaded[0].code, "005930");
        assert_eq!(loaded[0].name.as_deref(), Some("Samsung Electronics"));
        assert_eq!(loaded[0].sector, None);

        let loaded = feed.quotes().await.unwrap();
        assert_eq!(loaded[0].ticker, "005930");
        assert!(feed.fundamentals().await.unwrap().is_empty());
    }
}
