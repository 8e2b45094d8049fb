//! The annotation pipeline: load prices, detect moves, resolve annotations.
//!
//! Stages run in order `LoadPrices → DetectMoves → Annotate → Done`.
//!
//! Price loading follows a cache-first policy:
//! 1. If the series for `(ticker, start, end)` is cached → use it
//! 2. Otherwise fetch from the provider and cache the result
//! 3. A provider failure ends the run with [`PipelineError::PriceUnavailable`]
//!
//! Synthetic series are never written to the cache, so a later real fetch for
//! the same range is not shadowed by generated data.
//!
//! Annotations are resolved per move on a private worker pool. Each move checks
//! the cache, then the enricher; results are matched back to moves by
//! [`MoveKey`] and returned in ranking order. A failing or panicking lookup
//! only affects its own move.

use crate::config::{ConfigError, PipelineOptions};
use movemark_core::annotate::{Annotation, AnnotationSource, Annotator, AnnotatorConfig, Enriched};
use movemark_core::cache::{CacheKey, CacheStore};
use movemark_core::data::{DataError, DataSource, PricePoint, PriceProvider, PriceSeries};
use movemark_core::deadline::CancelFlag;
use movemark_core::moves::{detect_in_series, Move, MoveKey};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

/// Fatal pipeline errors. Everything else degrades to fallbacks.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("prices unavailable for '{ticker}': {reason}")]
    PriceUnavailable { ticker: String, reason: String },

    #[error("invalid price series: {0}")]
    InvalidSeries(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Pipeline stage, reported to the observer as each one starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LoadPrices,
    DetectMoves,
    Annotate,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LoadPrices => "loading prices",
            Self::DetectMoves => "detecting moves",
            Self::Annotate => "annotating moves",
            Self::Done => "done",
        })
    }
}

/// How a move's annotation was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationOrigin {
    Cache,
    Enriched,
    Disabled,
}

impl fmt::Display for AnnotationOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cache => "cached",
            Self::Enriched => "resolved",
            Self::Disabled => "fallback",
        })
    }
}

/// A move paired with its annotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedMove {
    #[serde(rename = "move")]
    pub mv: Move,
    pub annotation: Annotation,
    pub origin: AnnotationOrigin,
}

/// Pipeline output.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedChart {
    pub ticker: String,
    pub display_name: String,
    pub series: PriceSeries,
    /// Events in ranking order.
    pub events: Vec<AnnotatedMove>,
    pub price_source: DataSource,
    /// Per-move notes from degraded annotation paths.
    pub notes: Vec<String>,
}

impl AnnotatedChart {
    /// Events sorted by start date ascending.
    pub fn chronological(&self) -> Vec<&AnnotatedMove> {
        let mut events: Vec<&AnnotatedMove> = self.events.iter().collect();
        events.sort_by_key(|e| (e.mv.start_date, e.mv.end_date));
        events
    }

    /// The view handed to a chart renderer.
    pub fn handoff(&self) -> RenderHandoff<'_> {
        RenderHandoff {
            ticker: &self.ticker,
            display_name: &self.display_name,
            price_source: self.price_source,
            points: self.series.points(),
            events: self.chronological(),
        }
    }

    pub fn count_by(&self, origin: AnnotationOrigin) -> usize {
        self.events.iter().filter(|e| e.origin == origin).count()
    }
}

/// Chronological (move, annotation) pairs plus the series they annotate.
#[derive(Debug, Serialize)]
pub struct RenderHandoff<'a> {
    pub ticker: &'a str,
    pub display_name: &'a str,
    pub price_source: DataSource,
    pub points: &'a [PricePoint],
    pub events: Vec<&'a AnnotatedMove>,
}

/// Progress callbacks. Annotation callbacks arrive from worker threads in
/// completion order.
pub trait PipelineObserver: Sync {
    fn on_stage(&self, _stage: Stage) {}

    /// `index` is the move's rank (0-based) out of `total`.
    fn on_annotation(&self, _index: usize, _total: usize, _event: &AnnotatedMove) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct SilentObserver;

impl PipelineObserver for SilentObserver {}

/// Prints `[i/n]` progress lines to stderr.
#[derive(Debug, Default)]
pub struct StderrObserver;

impl PipelineObserver for StderrObserver {
    fn on_stage(&self, stage: Stage) {
        if stage != Stage::Done {
            eprintln!("{}...", capitalize(&stage.to_string()));
        }
    }

    fn on_annotation(&self, index: usize, total: usize, event: &AnnotatedMove) {
        eprintln!(
            "  [{}/{}] {} {:+.1}% ({}): {}",
            index + 1,
            total,
            event.mv.end_date,
            event.mv.pct_change,
            event.origin,
            event.annotation.summary
        );
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Composes a cache, a price provider, and an optional annotator.
pub struct Pipeline<'a> {
    cache: &'a CacheStore,
    prices: &'a dyn PriceProvider,
    annotator: Option<&'a Annotator>,
    observer: &'a dyn PipelineObserver,
    cancel: CancelFlag,
}

struct Resolved {
    event: AnnotatedMove,
    note: Option<String>,
}

impl<'a> Pipeline<'a> {
    pub fn new(cache: &'a CacheStore, prices: &'a dyn PriceProvider) -> Self {
        Self {
            cache,
            prices,
            annotator: None,
            observer: &SilentObserver,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_annotator(mut self, annotator: &'a Annotator) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn PipelineObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Share an abort flag. Once set, no new collaborator calls are made and
    /// unresolved moves get fallbacks.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run(&self, opts: &PipelineOptions) -> Result<AnnotatedChart, PipelineError> {
        opts.validate()?;
        let ticker = opts.ticker.trim();

        if opts.clear_cache {
            match self.cache.invalidate_ticker(ticker) {
                Ok(removed) => tracing::info!(ticker, removed, "cleared cache before run"),
                Err(e) => tracing::warn!(ticker, error = %e, "cache clear failed"),
            }
        }

        self.observer.on_stage(Stage::LoadPrices);
        let (series, price_source) = self.load_prices(ticker, opts)?;
        tracing::info!(
            ticker,
            points = series.len(),
            source = ?price_source,
            "prices loaded"
        );

        self.observer.on_stage(Stage::DetectMoves);
        let moves = detect_in_series(&series, &opts.detect_params());
        tracing::info!(ticker, moves = moves.len(), min_pct = opts.min_pct, "moves detected");

        self.observer.on_stage(Stage::Annotate);
        let resolved = match self.annotator {
            Some(annotator) if opts.annotate => {
                let annotator = annotator.clone().with_config(opts.annotator_config());
                self.annotate_all(&annotator, ticker, &moves, opts)
            }
            _ => self.fallbacks(&moves),
        };

        let mut events = Vec::with_capacity(resolved.len());
        let mut notes = Vec::new();
        for r in resolved {
            if let Some(note) = r.note {
                notes.push(format!("{}: {note}", r.event.mv.key()));
            }
            events.push(r.event);
        }

        let chart = AnnotatedChart {
            ticker: ticker.to_string(),
            display_name: opts.display_name().to_string(),
            series,
            events,
            price_source,
            notes,
        };
        tracing::info!(
            ticker,
            cached = chart.count_by(AnnotationOrigin::Cache),
            resolved = chart.count_by(AnnotationOrigin::Enriched),
            fallback = chart.count_by(AnnotationOrigin::Disabled),
            degraded = chart.notes.len(),
            "annotations ready"
        );

        self.observer.on_stage(Stage::Done);
        Ok(chart)
    }

    fn load_prices(
        &self,
        ticker: &str,
        opts: &PipelineOptions,
    ) -> Result<(PriceSeries, DataSource), PipelineError> {
        let key = CacheKey::prices(ticker, opts.start, opts.end);

        match self.cache.get::<PriceSeries>(&key) {
            Ok(Some(series)) => return Ok((series, DataSource::Cache)),
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "cached prices unreadable; refetching"),
        }

        let fetched = match self.prices.fetch(ticker, opts.start, opts.end) {
            Ok(fetched) => fetched,
            Err(DataError::InvalidSeries(reason)) => return Err(PipelineError::InvalidSeries(reason)),
            Err(e) => {
                return Err(PipelineError::PriceUnavailable {
                    ticker: ticker.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        if fetched.source != DataSource::Synthetic {
            if let Err(e) = self.cache.put(&key, &fetched.series) {
                tracing::warn!(key = %key, error = %e, "failed to cache prices");
            }
        }

        Ok((fetched.series, fetched.source))
    }

    fn fallbacks(&self, moves: &[Move]) -> Vec<Resolved> {
        let total = moves.len();
        moves
            .iter()
            .enumerate()
            .map(|(index, mv)| {
                let event = AnnotatedMove {
                    mv: mv.clone(),
                    annotation: Annotation::fallback(mv),
                    origin: AnnotationOrigin::Disabled,
                };
                self.observer.on_annotation(index, total, &event);
                Resolved { event, note: None }
            })
            .collect()
    }

    fn annotate_all(
        &self,
        annotator: &Annotator,
        ticker: &str,
        moves: &[Move],
        opts: &PipelineOptions,
    ) -> Vec<Resolved> {
        let total = moves.len();
        let display_name = opts.display_name();
        let resolve = |(index, mv): (usize, &Move)| {
            let resolved = self.resolve_one(annotator, ticker, display_name, mv);
            self.observer.on_annotation(index, total, &resolved.event);
            (mv.key(), resolved)
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(opts.workers)
            .thread_name(|i| format!("movemark-annotate-{i}"))
            .build();

        let finished: Vec<(MoveKey, Resolved)> = match pool {
            Ok(pool) => pool.install(|| moves.par_iter().enumerate().map(resolve).collect()),
            Err(e) => {
                tracing::warn!(error = %e, "worker pool unavailable; annotating sequentially");
                moves.iter().enumerate().map(resolve).collect()
            }
        };

        let mut by_key: HashMap<MoveKey, Resolved> = finished.into_iter().collect();
        moves
            .iter()
            .map(|mv| {
                by_key.remove(&mv.key()).unwrap_or_else(|| Resolved {
                    event: AnnotatedMove {
                        mv: mv.clone(),
                        annotation: Annotation::fallback(mv),
                        origin: AnnotationOrigin::Enriched,
                    },
                    note: Some("no result returned".into()),
                })
            })
            .collect()
    }

    fn resolve_one(
        &self,
        annotator: &Annotator,
        ticker: &str,
        display_name: &str,
        mv: &Move,
    ) -> Resolved {
        let key = CacheKey::annotation(ticker, &mv.key());

        match self.cache.get::<Annotation>(&key) {
            Ok(Some(annotation)) if is_usable(&annotation, mv, annotator.config()) => {
                return Resolved {
                    event: AnnotatedMove {
                        mv: mv.clone(),
                        annotation,
                        origin: AnnotationOrigin::Cache,
                    },
                    note: None,
                };
            }
            Ok(Some(_)) => tracing::debug!(key = %key, "cached annotation unusable; recomputing"),
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "cached annotation unreadable; recomputing"),
        }

        let enriched = catch_unwind(AssertUnwindSafe(|| {
            annotator.annotate(mv, ticker, display_name, &self.cancel)
        }))
        .unwrap_or_else(|_| {
            tracing::warn!(key = %key, "annotation lookup panicked; using fallback");
            Enriched {
                annotation: Annotation::fallback(mv),
                note: Some("annotation lookup panicked".into()),
            }
        });

        if enriched.is_cacheable() {
            if let Err(e) = self.cache.put(&key, &enriched.annotation) {
                tracing::warn!(key = %key, error = %e, "failed to cache annotation");
            }
        }

        Resolved {
            event: AnnotatedMove {
                mv: mv.clone(),
                annotation: enriched.annotation,
                origin: AnnotationOrigin::Enriched,
            },
            note: enriched.note,
        }
    }
}

/// A cached annotation is served only if it matches the move and fits the
/// current word and headline limits.
fn is_usable(annotation: &Annotation, mv: &Move, limits: &AnnotatorConfig) -> bool {
    let fits = match annotation.source {
        AnnotationSource::News => {
            annotation.summary.split_whitespace().count() <= limits.max_words
                && annotation.headlines.len() <= limits.headline_count.max(1)
        }
        AnnotationSource::Fallback => true,
    };
    annotation.move_key == mv.key() && !annotation.summary.trim().is_empty() && fits
}
