//! Serializable pipeline options.
//!
//! Options are a plain struct handed to the pipeline; nothing in the library
//! reads the environment. They can be written as TOML, with dates quoted:
//!
//! ```toml
//! ticker = "AAPL"
//! start = "2024-01-01"
//! end = "2024-06-30"
//! min_pct = 7.5
//! display_name = "Apple"
//! ```

use chrono::NaiveDate;
use movemark_core::annotate::AnnotatorConfig;
use movemark_core::moves::DetectParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_min_pct() -> f64 {
    5.0
}

fn default_top_n() -> Option<usize> {
    Some(5)
}

fn default_true() -> bool {
    true
}

fn default_max_words() -> usize {
    10
}

fn default_headline_count() -> usize {
    3
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

fn default_workers() -> usize {
    4
}

/// Everything one pipeline run needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub ticker: String,

    /// First session (inclusive).
    pub start: NaiveDate,

    /// Last session (inclusive).
    pub end: NaiveDate,

    /// Minimum |pct_change| for a move, in percent.
    #[serde(default = "default_min_pct")]
    pub min_pct: f64,

    /// Cap on the number of ranked moves; `None` keeps all.
    #[serde(default = "default_top_n", skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,

    /// When false, every move gets its fallback label and no collaborator is contacted.
    #[serde(default = "default_true")]
    pub annotate: bool,

    /// Drop every cached entry for the ticker before running.
    #[serde(default)]
    pub clear_cache: bool,

    /// Name used in news queries and prompts. Defaults to the ticker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default = "default_max_words")]
    pub max_words: usize,

    #[serde(default = "default_headline_count")]
    pub headline_count: usize,

    /// Bound on each news or summarizer call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Concurrent annotation lookups.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl PipelineOptions {
    pub fn new(ticker: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            ticker: ticker.into(),
            start,
            end,
            min_pct: default_min_pct(),
            top_n: default_top_n(),
            annotate: true,
            clear_cache: false,
            display_name: None,
            max_words: default_max_words(),
            headline_count: default_headline_count(),
            call_timeout_ms: default_call_timeout_ms(),
            workers: default_workers(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticker.trim().is_empty() {
            return Err(ConfigError::Invalid("ticker must not be empty".into()));
        }
        if self.start > self.end {
            return Err(ConfigError::Invalid(format!(
                "start {} is after end {}",
                self.start, self.end
            )));
        }
        if !self.min_pct.is_finite() {
            return Err(ConfigError::Invalid("min_pct must be a finite number".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.max_words == 0 {
            return Err(ConfigError::Invalid("max_words must be at least 1".into()));
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid("call_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.ticker)
    }

    pub fn detect_params(&self) -> DetectParams {
        DetectParams {
            min_pct: self.min_pct,
            top_n: self.top_n,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn annotator_config(&self) -> AnnotatorConfig {
        AnnotatorConfig {
            max_words: self.max_words,
            headline_count: self.headline_count,
            call_timeout: self.call_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    #[test]
    fn minimal_toml_gets_defaults() {
        let opts = PipelineOptions::from_toml(
            r#"
            ticker = "AAPL"
            start = "2024-01-01"
            end = "2024-06-30"
            "#,
        )
        .unwrap();

        assert_eq!(opts, PipelineOptions::new("AAPL", d(1, 1), d(6, 30)));
        assert_eq!(opts.display_name(), "AAPL");
        assert_eq!(opts.detect_params(), DetectParams::default());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn toml_overrides() {
        let opts = PipelineOptions::from_toml(
            r#"
            ticker = "AAPL"
            start = "2024-01-01"
            end = "2024-06-30"
            min_pct = 7.5
            top_n = 2
            annotate = false
            display_name = "Apple"
            workers = 1
            "#,
        )
        .unwrap();

        assert_eq!(opts.min_pct, 7.5);
        assert_eq!(opts.top_n, Some(2));
        assert!(!opts.annotate);
        assert_eq!(opts.display_name(), "Apple");
        assert_eq!(opts.workers, 1);
    }

    #[test]
    fn toml_round_trip() {
        let mut opts = PipelineOptions::new("SPY", d(1, 1), d(2, 1));
        opts.display_name = Some("S&P 500".into());
        let text = opts.to_toml().unwrap();

        assert_eq!(PipelineOptions::from_toml(&text).unwrap(), opts);
    }

    #[test]
    fn missing_ticker_is_parse_error() {
        let err = PipelineOptions::from_toml("start = \"2024-01-01\"\nend = \"2024-02-01\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let base = PipelineOptions::new("SPY", d(1, 1), d(2, 1));

        let mut o = base.clone();
        o.ticker = "  ".into();
        assert!(o.validate().is_err());

        let mut o = base.clone();
        o.start = d(3, 1);
        assert!(o.validate().is_err());

        let mut o = base.clone();
        o.workers = 0;
        assert!(o.validate().is_err());

        let mut o = base.clone();
        o.max_words = 0;
        assert!(o.validate().is_err());

        let mut o = base;
        o.min_pct = f64::NAN;
        assert!(o.validate().is_err());
    }

    #[test]
    fn blank_display_name_falls_back_to_ticker() {
        let mut opts = PipelineOptions::new("SPY", d(1, 1), d(2, 1));
        opts.display_name = Some("".into());
        assert_eq!(opts.display_name(), "SPY");
    }

    #[test]
    fn from_file_reports_missing_path() {
        let err = PipelineOptions::from_file(Path::new("/no/such/movemark.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
