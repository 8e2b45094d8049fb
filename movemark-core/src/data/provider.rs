//! Price provider trait, price series types, and structured error types.
//!
//! The PriceProvider trait abstracts over price sources (Yahoo Finance, CSV import,
//! synthetic data) so we can swap implementations and mock for tests.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One daily OHLCV observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PricePoint {
    /// Convenience constructor for a point where only the close is known.
    pub fn from_close(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0,
        }
    }
}

/// Daily price series for one ticker over `[start, end]`.
///
/// Construction validates the points, so a `PriceSeries` in hand always has
/// strictly increasing dates and finite, positive closes. Deserialization goes
/// through the same check, which is how a tampered cache payload is caught.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedSeries")]
pub struct PriceSeries {
    ticker: String,
    start: NaiveDate,
    end: NaiveDate,
    points: Vec<PricePoint>,
}

#[derive(Deserialize)]
struct UncheckedSeries {
    ticker: String,
    start: NaiveDate,
    end: NaiveDate,
    points: Vec<PricePoint>,
}

impl TryFrom<UncheckedSeries> for PriceSeries {
    type Error = DataError;

    fn try_from(raw: UncheckedSeries) -> Result<Self, Self::Error> {
        PriceSeries::new(raw.ticker, raw.start, raw.end, raw.points)
    }
}

impl PriceSeries {
    pub fn new(
        ticker: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
        points: Vec<PricePoint>,
    ) -> Result<Self, DataError> {
        validate_points(&points)?;
        Ok(Self {
            ticker: ticker.into(),
            start,
            end,
            points,
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Check the series invariants: strictly increasing dates, finite non-negative
/// prices, and a positive close (every close can be a percent-change base).
pub fn validate_points(points: &[PricePoint]) -> Result<(), DataError> {
    let mut prev: Option<NaiveDate> = None;

    for (i, p) in points.iter().enumerate() {
        for (field, value) in [
            ("open", p.open),
            ("high", p.high),
            ("low", p.low),
            ("close", p.close),
        ] {
            if !value.is_finite() {
                return Err(DataError::InvalidSeries(format!(
                    "non-numeric {field} on {} (row {i})",
                    p.date
                )));
            }
            if value < 0.0 {
                return Err(DataError::InvalidSeries(format!(
                    "negative {field} on {} (row {i})",
                    p.date
                )));
            }
        }

        if p.close <= 0.0 {
            return Err(DataError::InvalidSeries(format!(
                "close must be positive on {} (row {i})",
                p.date
            )));
        }

        if let Some(prev_date) = prev {
            if p.date <= prev_date {
                return Err(DataError::InvalidSeries(format!(
                    "dates not strictly increasing: {} follows {prev_date}",
                    p.date
                )));
            }
        }
        prev = Some(p.date);
    }

    Ok(())
}

/// Structured error types for price operations.
///
/// These are designed to be displayable in CLI output as-is.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("invalid price series: {0}")]
    InvalidSeries(String),

    #[error("import error: {0}")]
    Import(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Result of a successful price fetch for a single ticker.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub series: PriceSeries,
    pub source: DataSource,
}

/// Where the prices came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    YahooFinance,
    CsvImport,
    Synthetic,
    Cache,
}

/// Trait for price providers (Yahoo Finance, CSV import, etc).
///
/// The cache layer sits above this trait; providers don't know about the cache.
pub trait PriceProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily OHLCV points for a ticker over a date range.
    fn fetch(&self, ticker: &str, start: NaiveDate, end: NaiveDate)
        -> Result<FetchResult, DataError>;

    /// Check if the provider is currently available (not rate-limited, not blocked).
    fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn valid_series_is_accepted() {
        let series = PriceSeries::new(
            "SPY",
            d(1),
            d(31),
            vec![
                PricePoint::from_close(d(2), 100.0),
                PricePoint::from_close(d(3), 101.0),
            ],
        )
        .unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.ticker(), "SPY");
    }

    #[test]
    fn empty_series_is_valid() {
        assert!(PriceSeries::new("SPY", d(1), d(2), vec![]).unwrap().is_empty());
    }

    #[test]
    fn unsorted_dates_are_rejected() {
        let err = validate_points(&[
            PricePoint::from_close(d(3), 100.0),
            PricePoint::from_close(d(2), 101.0),
        ])
        .unwrap_err();

        assert!(matches!(err, DataError::InvalidSeries(_)));
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let result = validate_points(&[
            PricePoint::from_close(d(2), 100.0),
            PricePoint::from_close(d(2), 101.0),
        ]);
        assert!(matches!(result, Err(DataError::InvalidSeries(_))));
    }

    #[test]
    fn nan_price_is_rejected() {
        let mut p = PricePoint::from_close(d(2), 100.0);
        p.high = f64::NAN;
        let err = validate_points(&[p]).unwrap_err();
        assert!(err.to_string().contains("non-numeric high"));
    }

    #[test]
    fn zero_close_is_rejected() {
        let result = validate_points(&[PricePoint::from_close(d(2), 0.0)]);
        assert!(matches!(result, Err(DataError::InvalidSeries(_))));
    }

    #[test]
    fn deserialization_runs_validation() {
        let json = r#"{
            "ticker": "SPY",
            "start": "2024-01-01",
            "end": "2024-01-31",
            "points": [
                {"date": "2024-01-03", "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0, "volume": 0},
                {"date": "2024-01-02", "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0, "volume": 0}
            ]
        }"#;

        let result: Result<PriceSeries, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
