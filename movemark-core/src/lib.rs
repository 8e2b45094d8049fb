//! Movemark Core: price data, move detection, annotation enrichment, and the cache store.
//!
//! This crate holds every leaf component of the pipeline:
//! - Price series types and providers (Yahoo, CSV, synthetic)
//! - The move detector over daily closes
//! - The annotation enricher with its news and summarizer collaborators
//! - The two-kind cache store
//! - Bounded calls and cancellation shared by the enricher and the runner

pub mod annotate;
pub mod cache;
pub mod data;
pub mod deadline;
pub mod moves;

pub use annotate::{Annotation, AnnotationSource, Annotator, AnnotatorConfig, Enriched, Outcome};
pub use cache::{CacheError, CacheKey, CacheKind, CacheStore};
pub use data::{DataError, PricePoint, PriceSeries};
pub use moves::{detect_moves, DetectParams, Direction, Move, MoveKey};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything handed to the enrichment worker pool is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<PriceSeries>();
        require_sync::<PriceSeries>();
        require_send::<Move>();
        require_sync::<Move>();
        require_send::<Annotation>();
        require_sync::<Annotation>();
        require_send::<Annotator>();
        require_sync::<Annotator>();
        require_send::<CacheStore>();
        require_sync::<CacheStore>();
        require_send::<data::YahooClient>();
        require_sync::<data::YahooClient>();
    }
}
