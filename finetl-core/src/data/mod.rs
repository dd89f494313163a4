//! Market data provider boundary and implementations.

pub mod provider;
pub mod yahoo;

pub use provider::{
    MarketDataProvider, MetricRow, PriceRequest, PriceResponse, ProviderError, RawStatement,
};
pub use yahoo::YahooProvider;
