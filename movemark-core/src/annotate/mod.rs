//! Annotation enrichment: turn a detected move into a short explanation.
//!
//! Resolution order for one move:
//!
//! 1. Search news for `"{display name} stock {end date}"`.
//! 2. With headlines and a summarizer, ask for a cause in at most `max_words`
//!    words. Without a usable reply, use the top headline cut to `max_words`.
//!    Either way the source is [`AnnotationSource::News`].
//! 3. With no headlines, or when the search itself failed, use the fallback
//!    label `"{end date} {signed pct}%"` with [`AnnotationSource::Fallback`].
//!
//! Every collaborator call is bounded by the configured timeout; an overrun is
//! a failure like any other. The enricher never errors: degraded paths are
//! reported through [`Enriched::note`].

pub mod news;
pub mod summarizer;

pub use news::{NewsSource, YahooNews};
pub use summarizer::{ChatConfig, ChatSummarizer, Summarizer};

use crate::deadline::{call_with_timeout, CancelFlag};
use crate::moves::{Direction, Move, MoveKey};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Result of a best-effort collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    /// The collaborator is not configured or refuses service.
    Unavailable,
    /// The call was attempted and did not produce a value.
    Failed(String),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(v) => Some(v),
            _ => None,
        }
    }
}

/// Where an annotation's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationSource {
    News,
    Fallback,
}

/// Explanation attached to one move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub move_key: MoveKey,
    pub summary: String,
    pub source: AnnotationSource,
    /// Headlines the summary was built from, best first.
    #[serde(default)]
    pub headlines: Vec<String>,
}

impl Annotation {
    /// The label used when nothing better is known.
    pub fn fallback(mv: &Move) -> Self {
        Self {
            move_key: mv.key(),
            summary: fallback_label(mv),
            source: AnnotationSource::Fallback,
            headlines: Vec::new(),
        }
    }
}

/// `"{end date} {sign}{pct:.1}%"`, e.g. `2024-03-05 -30.0%`.
pub fn fallback_label(mv: &Move) -> String {
    format!("{} {:+.1}%", mv.end_date, mv.pct_change)
}

/// First `max_words` whitespace-separated words of `text`, single-spaced.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The news query for a move.
pub fn news_query(display_name: &str, date: NaiveDate) -> String {
    format!("{display_name} stock {date}")
}

/// Prompt asking for the cause of a move given its headlines.
pub fn build_prompt(
    display_name: &str,
    ticker: &str,
    mv: &Move,
    headlines: &[String],
    max_words: usize,
) -> String {
    let subject = if display_name.eq_ignore_ascii_case(ticker) {
        ticker.to_string()
    } else {
        format!("{display_name} ({ticker})")
    };
    let verb = match mv.direction {
        Direction::Up => "rose",
        Direction::Down => "dropped",
    };
    let listed: String = headlines.iter().map(|h| format!("- {h}\n")).collect();

    format!(
        "{subject} stock {verb} {:.1}% between {} and {}.\n\n\
         Here are relevant news headlines:\n{listed}\n\
         In at most {max_words} words, name the most likely cause of this price move. \
         Reply only with the cause, no extra text.",
        mv.pct_change.abs(),
        mv.start_date,
        mv.end_date,
    )
}

fn clean_reply(text: &str, max_words: usize) -> String {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let unquoted = first_line
        .trim()
        .trim_start_matches("Cause:")
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c.is_whitespace());
    truncate_words(unquoted, max_words)
}

/// Enricher settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotatorConfig {
    pub max_words: usize,
    pub headline_count: usize,
    pub call_timeout: Duration,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            max_words: 10,
            headline_count: 3,
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// An annotation plus what went wrong producing it, if anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enriched {
    pub annotation: Annotation,
    /// Set when a collaborator failed, timed out, or the run was cancelled.
    pub note: Option<String>,
}

impl Enriched {
    fn clean(annotation: Annotation) -> Self {
        Self {
            annotation,
            note: None,
        }
    }

    fn degraded(annotation: Annotation, note: impl Into<String>) -> Self {
        Self {
            annotation,
            note: Some(note.into()),
        }
    }

    /// Whether the result reflects the collaborators' real answer and can be
    /// stored. Degraded results are recomputed on the next run.
    pub fn is_cacheable(&self) -> bool {
        self.note.is_none()
    }
}

/// Resolves annotations from a news source and an optional summarizer.
#[derive(Clone)]
pub struct Annotator {
    news: Arc<dyn NewsSource>,
    summarizer: Option<Arc<dyn Summarizer>>,
    config: AnnotatorConfig,
}

impl std::fmt::Debug for Annotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotator")
            .field("news", &self.news.name())
            .field("summarizer", &self.summarizer.as_ref().map(|s| s.name().to_string()))
            .field("config", &self.config)
            .finish()
    }
}

impl Annotator {
    pub fn new(news: Arc<dyn NewsSource>, config: AnnotatorConfig) -> Self {
        Self {
            news,
            summarizer: None,
            config: AnnotatorConfig {
                max_words: config.max_words.max(1),
                ..config
            },
        }
    }

    /// Same collaborators, new limits.
    pub fn with_config(mut self, config: AnnotatorConfig) -> Self {
        self.config = AnnotatorConfig {
            max_words: config.max_words.max(1),
            ..config
        };
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    /// Resolve the annotation for `mv`. Never fails.
    pub fn annotate(
        &self,
        mv: &Move,
        ticker: &str,
        display_name: &str,
        cancel: &CancelFlag,
    ) -> Enriched {
        if cancel.is_cancelled() {
            return Enriched::degraded(Annotation::fallback(mv), "cancelled before news search");
        }

        let query = news_query(display_name, mv.end_date);
        let limit = self.config.headline_count.max(1);
        let news = Arc::clone(&self.news);
        let search_query = query.clone();
        let searched = call_with_timeout(self.config.call_timeout, move || {
            news.search(&search_query, limit)
        })
        .unwrap_or_else(|e| Outcome::Failed(format!("news search {e}")));

        let headlines: Vec<String> = match searched {
            Outcome::Success(found) => found
                .into_iter()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .take(limit)
                .collect(),
            Outcome::Unavailable => {
                tracing::warn!(query = %query, "news source unavailable");
                return Enriched::degraded(Annotation::fallback(mv), "news source unavailable");
            }
            Outcome::Failed(reason) => {
                tracing::warn!(query = %query, reason = %reason, "news search failed");
                return Enriched::degraded(Annotation::fallback(mv), reason);
            }
        };

        if headlines.is_empty() {
            tracing::debug!(query = %query, "no headlines");
            return Enriched::clean(Annotation::fallback(mv));
        }

        let max_words = self.config.max_words;
        let from_headline = |headlines: Vec<String>| Annotation {
            move_key: mv.key(),
            summary: truncate_words(&headlines[0], max_words),
            source: AnnotationSource::News,
            headlines,
        };

        let Some(summarizer) = self.summarizer.as_ref().map(Arc::clone) else {
            return Enriched::clean(from_headline(headlines));
        };

        if cancel.is_cancelled() {
            return Enriched::degraded(from_headline(headlines), "cancelled before summarizing");
        }

        let prompt = build_prompt(display_name, ticker, mv, &headlines, max_words);
        let summarized = call_with_timeout(self.config.call_timeout, move || {
            summarizer.summarize(&prompt, max_words)
        })
        .unwrap_or_else(|e| Outcome::Failed(format!("summarizer {e}")));

        match summarized {
            Outcome::Success(reply) => {
                let summary = clean_reply(&reply, max_words);
                if summary.is_empty() {
                    return Enriched::degraded(from_headline(headlines), "summarizer returned no text");
                }
                Enriched::clean(Annotation {
                    move_key: mv.key(),
                    summary,
                    source: AnnotationSource::News,
                    headlines,
                })
            }
            Outcome::Unavailable => {
                Enriched::degraded(from_headline(headlines), "summarizer unavailable")
            }
            Outcome::Failed(reason) => {
                tracing::warn!(reason = %reason, "summarizer failed; using top headline");
                Enriched::degraded(from_headline(headlines), reason)
            }
        }
    }
}
