//! CSV file data adapter.
//!
//! Reads `<data_dir>/<SYMBOL>_<timeframe>.csv` with a header row of
//! `timestamp,open,high,low,close,volume`.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::domain::error::StratbenchError;
use crate::domain::ohlcv::{Candle, Timeframe};
use crate::ports::data_port::DataPort;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, timeframe))
    }
}

fn data_err(reason: String) -> StratbenchError {
    StratbenchError::DataSource { reason }
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`; naive forms are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

fn parse_column(record: &csv::StringRecord, index: usize, name: &str, line: u64) -> Result<f64, StratbenchError> {
    let raw = record
        .get(index)
        .ok_or_else(|| data_err(format!("line {}: missing {} column", line, name)))?;
    raw.trim()
        .parse()
        .map_err(|e| data_err(format!("line {}: invalid {} value '{}': {}", line, name, raw, e)))
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>, StratbenchError> {
        let path = self.csv_path(symbol, timeframe);
        let content = fs::read_to_string(&path)
            .map_err(|e| data_err(format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut candles = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| data_err(format!("CSV parse error: {}", e)))?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let raw_ts = record
                .get(0)
                .ok_or_else(|| data_err(format!("line {}: missing timestamp column", line)))?;
            let timestamp = parse_timestamp(raw_ts)
                .ok_or_else(|| data_err(format!("line {}: invalid timestamp '{}'", line, raw_ts)))?;

            let date = timestamp.date_naive();
            if date < start || date > end {
                continue;
            }

            candles.push(Candle {
                timestamp,
                open: parse_column(&record, 1, "open", line)?,
                high: parse_column(&record, 2, "high", line)?,
                low: parse_column(&record, 3, "low", line)?,
                close: parse_column(&record, 4, "close", line)?,
                volume: parse_column(&record, 5, "volume", line)?,
            });
        }

        candles.sort_by_key(|c| c.timestamp);
        tracing::debug!(symbol, bars = candles.len(), path = %path.display(), "loaded candles");
        Ok(candles)
    }
}
