//! Movemark Runner: pipeline orchestration over `movemark-core`.
//!
//! This crate provides:
//! - Serializable pipeline options with TOML loading and validation
//! - The cache-first price loader
//! - Concurrent, cache-backed annotation of detected moves
//! - Progress observation and the renderer hand-off view

pub mod config;
pub mod pipeline;

pub use config::{ConfigError, PipelineOptions};
pub use pipeline::{
    AnnotatedChart, AnnotatedMove, AnnotationOrigin, Pipeline, PipelineError, PipelineObserver,
    RenderHandoff, SilentObserver, Stage, StderrObserver,
};
