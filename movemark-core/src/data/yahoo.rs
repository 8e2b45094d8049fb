//! Yahoo Finance price provider.
//!
//! Fetches daily OHLCV points from Yahoo's v8 chart API. The shared
//! [`YahooClient`] handles rate limiting, retries with exponential backoff,
//! and the circuit breaker; the news search in `annotate::news` reuses it.
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.
//! The CSV import path is the fallback when Yahoo is unavailable.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, DataSource, FetchResult, PricePoint, PriceProvider, PriceSeries};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Blocking HTTP client with retry and circuit-breaker policy for Yahoo endpoints.
#[derive(Debug, Clone)]
pub struct YahooClient {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooClient {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(circuit_breaker: Arc<CircuitBreaker>, timeout: Duration) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    /// GET `url` and decode the JSON body, retrying transient failures.
    ///
    /// `subject` names what is being fetched (ticker or query) for error messages.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        subject: &str,
    ) -> Result<T, DataError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                tracing::debug!(subject, attempt, ?delay, "retrying Yahoo request");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }

            match self.client.get(url).query(query).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::FORBIDDEN {
                        // IP ban: stop talking to this host for the cooldown
                        self.circuit_breaker.trip();
                        return Err(DataError::CircuitBreakerTripped);
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        self.circuit_breaker.record_failure();
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(DataError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED {
                        return Err(DataError::AuthenticationRequired(
                            "Yahoo Finance requires authentication".into(),
                        ));
                    }

                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(DataError::SymbolNotFound {
                            symbol: subject.to_string(),
                        });
                    }

                    if !status.is_success() {
                        self.circuit_breaker.record_failure();
                        last_error = Some(DataError::Other(format!("HTTP {status} for {subject}")));
                        continue;
                    }

                    let body: T = resp.json().map_err(|e| {
                        DataError::ResponseFormatChanged(format!(
                            "failed to parse response for {subject}: {e}"
                        ))
                    })?;
                    self.circuit_breaker.record_success();
                    return Ok(body);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(DataError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

/// Yahoo Finance price provider.
pub struct YahooProvider {
    client: YahooClient,
}

impl YahooProvider {
    pub fn new(client: YahooClient) -> Self {
        Self { client }
    }

    fn chart_url(ticker: &str) -> String {
        format!("https://query2.finance.yahoo.com/v8/finance/chart/{ticker}")
    }

    fn chart_query(start: NaiveDate, end: NaiveDate) -> Vec<(&'static str, String)> {
        let start_ts = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        // period2 is exclusive; push it to the end of the requested day
        let end_ts = end.and_time(chrono::NaiveTime::MIN).and_utc().timestamp() + 86_399;
        vec![
            ("period1", start_ts.to_string()),
            ("period2", end_ts.to_string()),
            ("interval", "1d".to_string()),
            ("includeAdjustedClose", "true".to_string()),
        ]
    }

    /// Parse the chart API response into price points.
    fn parse_response(ticker: &str, resp: ChartResponse) -> Result<Vec<PricePoint>, DataError> {
        let result = resp.chart.result.ok_or_else(|| {
            if let Some(err) = resp.chart.error {
                if err.code == "Not Found" {
                    DataError::SymbolNotFound {
                        symbol: ticker.to_string(),
                    }
                } else {
                    DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
                }
            } else {
                DataError::ResponseFormatChanged("empty result with no error".into())
            }
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;

        let timestamps = data
            .timestamp
            .ok_or_else(|| DataError::ResponseFormatChanged("no timestamps".into()))?;

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let mut points: Vec<PricePoint> = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            // Holidays and halted sessions come back with a null close
            let Some(close) = quote.close.get(i).copied().flatten() else {
                continue;
            };
            let field = |v: &[Option<f64>]| v.get(i).copied().flatten().unwrap_or(close);

            let point = PricePoint {
                date,
                open: field(&quote.open),
                high: field(&quote.high),
                low: field(&quote.low),
                close,
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
            };

            // Intraday refreshes of the last session repeat its date; keep the latest
            match points.last_mut() {
                Some(last) if last.date == date => *last = point,
                _ => points.push(point),
            }
        }

        if points.is_empty() {
            return Err(DataError::SymbolNotFound {
                symbol: ticker.to_string(),
            });
        }

        Ok(points)
    }
}

impl PriceProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        let chart: ChartResponse = self.client.get_json(
            &Self::chart_url(ticker),
            &Self::chart_query(start, end),
            ticker,
        )?;
        let points = Self::parse_response(ticker, chart)?;
        tracing::debug!(ticker, points = points.len(), "fetched Yahoo chart");

        Ok(FetchResult {
            series: PriceSeries::new(ticker, start, end, points)?,
            source: DataSource::YahooFinance,
        })
    }

    fn is_available(&self) -> bool {
        self.client.circuit_breaker().is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Vec<PricePoint>, DataError> {
        let resp: ChartResponse = serde_json::from_str(json).unwrap();
        YahooProvider::parse_response("AAPL", resp)
    }

    #[test]
    fn parses_chart_and_skips_null_closes() {
        // 2024-01-02, 2024-01-03, 2024-01-04 at 14:30 UTC
        let json = r#"{"chart": {"result": [{
            "timestamp": [1704205800, 1704292200, 1704378600],
            "indicators": {"quote": [{
                "open": [100.0, null, 102.0],
                "high": [101.0, null, 103.0],
                "low": [99.0, null, 101.0],
                "close": [100.5, null, 102.5],
                "volume": [1000, null, 1200]
            }]}
        }], "error": null}}"#;

        let points = parse(json).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(points[1].close, 102.5);
        assert_eq!(points[1].volume, 1200);
    }

    #[test]
    fn missing_open_falls_back_to_close() {
        let json = r#"{"chart": {"result": [{
            "timestamp": [1704205800],
            "indicators": {"quote": [{
                "open": [null], "high": [null], "low": [null],
                "close": [50.0], "volume": [null]
            }]}
        }], "error": null}}"#;

        let points = parse(json).unwrap();
        assert_eq!(points[0].open, 50.0);
        assert_eq!(points[0].volume, 0);
    }

    #[test]
    fn not_found_error_maps_to_symbol_not_found() {
        let json = r#"{"chart": {"result": null,
            "error": {"code": "Not Found", "description": "No data found"}}}"#;

        assert!(matches!(parse(json), Err(DataError::SymbolNotFound { .. })));
    }

    #[test]
    fn repeated_session_date_keeps_latest_point() {
        let json = r#"{"chart": {"result": [{
            "timestamp": [1704205800, 1704220000],
            "indicators": {"quote": [{
                "close": [100.0, 100.7]
            }]}
        }], "error": null}}"#;

        let points = parse(json).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].close, 100.7);
    }

    #[test]
    fn chart_query_covers_whole_end_day() {
        let q = YahooProvider::chart_query(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        let p1: i64 = q[0].1.parse().unwrap();
        let p2: i64 = q[1].1.parse().unwrap();
        assert_eq!(p2 - p1, 86_399);
    }
}
