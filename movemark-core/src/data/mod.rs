//! Price data: series types, provider trait, and provider implementations.

pub mod circuit_breaker;
pub mod csv_import;
pub mod provider;
pub mod synthetic;
pub mod yahoo;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use csv_import::CsvProvider;
pub use provider::{
    validate_points, DataError, DataSource, FetchResult, PricePoint, PriceProvider, PriceSeries,
};
pub use synthetic::SyntheticProvider;
pub use yahoo::{YahooClient, YahooProvider};
