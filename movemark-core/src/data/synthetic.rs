//! Synthetic price provider for offline development.
//!
//! Produces a deterministic random walk from a starting price of 100.0, seeded
//! from the ticker so repeated runs see identical data. Results built on it are
//! tagged with [`DataSource::Synthetic`].

use super::provider::{DataError, DataSource, FetchResult, PricePoint, PriceProvider, PriceSeries};
use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Maximum absolute daily return of the walk.
const DAILY_RANGE: f64 = 0.03;

#[derive(Debug, Default)]
pub struct SyntheticProvider;

impl SyntheticProvider {
    /// Generate weekday points for `[start, end]`.
    pub fn generate(ticker: &str, start: NaiveDate, end: NaiveDate) -> Vec<PricePoint> {
        let seed: [u8; 32] = *blake3::hash(ticker.as_bytes()).as_bytes();
        let mut rng = StdRng::from_seed(seed);

        let mut points = Vec::new();
        let mut price = 100.0_f64;
        let mut current = start;

        while current <= end {
            let weekday = current.weekday();
            if weekday == chrono::Weekday::Sat || weekday == chrono::Weekday::Sun {
                current += chrono::Duration::days(1);
                continue;
            }

            let daily_return: f64 = rng.gen_range(-DAILY_RANGE..DAILY_RANGE);
            let open = price;
            let close = price * (1.0 + daily_return);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let volume = rng.gen_range(500_000..5_000_000u64);

            points.push(PricePoint {
                date: current,
                open,
                high,
                low,
                close,
                volume,
            });

            price = close;
            current += chrono::Duration::days(1);
        }

        points
    }
}

impl PriceProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        tracing::warn!(ticker, "generating synthetic prices; results are not real market data");
        let points = Self::generate(ticker, start, end);
        Ok(FetchResult {
            series: PriceSeries::new(ticker, start, end, points)?,
            source: DataSource::Synthetic,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    #[test]
    fn synthetic_data_is_deterministic() {
        let (start, end) = range();
        let a = SyntheticProvider::generate("SPY", start, end);
        let b = SyntheticProvider::generate("SPY", start, end);

        assert_eq!(a, b);
    }

    #[test]
    fn different_tickers_get_different_walks() {
        let (start, end) = range();
        let spy = SyntheticProvider::generate("SPY", start, end);
        let qqq = SyntheticProvider::generate("QQQ", start, end);

        assert_eq!(spy.len(), qqq.len());
        assert_ne!(spy[0].close, qqq[0].close);
    }

    #[test]
    fn weekends_are_skipped_and_series_is_valid() {
        let (start, end) = range();
        let result = SyntheticProvider.fetch("SPY", start, end).unwrap();

        // January 2024 has 23 weekdays
        assert_eq!(result.series.len(), 23);
        assert_eq!(result.source, DataSource::Synthetic);
    }
}
