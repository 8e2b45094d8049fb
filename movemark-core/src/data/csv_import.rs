//! CSV import provider.
//!
//! Reads daily prices from a local CSV file with a header row. Column names are
//! matched case-insensitively, so both `date,open,high,low,close,volume` and a
//! pandas-style `Date,Open,High,Low,Close,Volume` export load. Only `date` and
//! `close` are required.
//!
//! Rows are kept in file order; a file that is not sorted by date is rejected
//! as an invalid series rather than silently reordered.

use super::provider::{DataError, DataSource, FetchResult, PricePoint, PriceProvider, PriceSeries};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

impl CsvRow {
    fn into_point(self) -> PricePoint {
        PricePoint {
            date: self.date,
            open: self.open.unwrap_or(self.close),
            high: self.high.unwrap_or(self.close),
            low: self.low.unwrap_or(self.close),
            close: self.close,
            volume: self.volume.map(|v| v.max(0.0).round() as u64).unwrap_or(0),
        }
    }
}

/// Price provider backed by a CSV file on disk.
pub struct CsvProvider {
    path: PathBuf,
}

impl CsvProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse CSV text and keep the rows inside `[start, end]`.
    pub fn parse(
        reader: impl std::io::Read,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, DataError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers: csv::StringRecord = rdr
            .headers()
            .map_err(|e| DataError::Import(format!("header: {e}")))?
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();
        rdr.set_headers(headers);

        let mut points = Vec::new();
        for (i, row) in rdr.deserialize::<CsvRow>().enumerate() {
            let row = row.map_err(|e| DataError::Import(format!("row {}: {e}", i + 1)))?;
            if row.date < start || row.date > end {
                continue;
            }
            points.push(row.into_point());
        }
        Ok(points)
    }
}

impl PriceProvider for CsvProvider {
    fn name(&self) -> &str {
        "csv_import"
    }

    fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        let file = std::fs::File::open(&self.path)
            .map_err(|e| DataError::Import(format!("open {}: {e}", self.path.display())))?;
        let points = Self::parse(file, start, end)?;
        if points.is_empty() {
            return Err(DataError::SymbolNotFound {
                symbol: ticker.to_string(),
            });
        }

        Ok(FetchResult {
            series: PriceSeries::new(ticker, start, end, points)?,
            source: DataSource::CsvImport,
        })
    }

    fn is_available(&self) -> bool {
        self.path.is_file()
    }
}
