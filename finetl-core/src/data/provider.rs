//! Data provider trait and structured error types.
//!
//! The `MarketDataProvider` trait abstracts over the market data source so the
//! extractor can be driven by Yahoo Finance in production and by fixtures in
//! tests. Providers return data in their own shapes; the extractor owns the
//! reshaping into canonical tables.

use crate::config::{Frequency, Interval, StatementKind};
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use thiserror::Error;

/// Structured error types for provider calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider")]
    RateLimited,

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("HTTP {status} for {symbol}")]
    Http { status: u16, symbol: String },

    #[error("frame construction failed: {0}")]
    Frame(#[from] polars::error::PolarsError),
}

/// A batched price-series request covering every configured ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRequest {
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    /// Exclusive.
    pub end: NaiveDate,
    pub interval: Interval,
    /// Adjust OHLC for splits and dividends.
    pub auto_adjust: bool,
}

/// Provider price response. Its shape depends on how many tickers were asked for.
///
/// Frames carry the provider's own column names: a time index column
/// (`Date` or `Datetime`) followed by `Open`, `High`, `Low`, `Close`, `Volume`.
#[derive(Debug, Clone)]
pub enum PriceResponse {
    /// Nothing came back for any ticker.
    Empty,
    /// One ticker requested: a plain row-per-bar frame with no ticker column.
    Single(DataFrame),
    /// Several tickers requested: one frame per ticker that returned data.
    ByTicker(Vec<(String, DataFrame)>),
}

impl PriceResponse {
    pub fn is_empty(&self) -> bool {
        match self {
            PriceResponse::Empty => true,
            PriceResponse::Single(df) => df.height() == 0,
            PriceResponse::ByTicker(frames) => frames.iter().all(|(_, df)| df.height() == 0),
        }
    }
}

/// One metric of a statement across all reported periods.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub name: String,
    /// Aligned with [`RawStatement::periods`].
    pub values: Vec<Option<f64>>,
}

/// A financial statement as the provider reports it: metric rows by period columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawStatement {
    pub periods: Vec<NaiveDate>,
    pub metrics: Vec<MetricRow>,
}

impl RawStatement {
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty() || self.metrics.is_empty()
    }
}

/// Trait for market data providers.
pub trait MarketDataProvider {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch price bars for every ticker of the request in one call.
    fn download(&self, request: &PriceRequest) -> Result<PriceResponse, ProviderError>;

    /// Fetch one financial statement for one ticker.
    ///
    /// `Ok(None)` means the provider has no such statement for the ticker.
    fn statement(
        &self,
        ticker: &str,
        kind: StatementKind,
        frequency: Frequency,
    ) -> Result<Option<RawStatement>, ProviderError>;
}

impl<P: MarketDataProvider + ?Sized> MarketDataProvider for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn download(&self, request: &PriceRequest) -> Result<PriceResponse, ProviderError> {
        (**self).download(request)
    }

    fn statement(
        &self,
        ticker: &str,
        kind: StatementKind,
        frequency: Frequency,
    ) -> Result<Option<RawStatement>, ProviderError> {
        (**self).statement(ticker, kind, frequency)
    }
}
