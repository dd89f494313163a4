//! finetl core: configuration-driven extract-and-load pipeline for market data.
//!
//! This crate contains:
//! - The configuration model with aggregated validation
//! - The market data provider boundary and the Yahoo Finance provider
//! - The extractor that reshapes provider output into canonical tables
//! - Loaders for CSV, Parquet, Hugging Face Hub and PostgreSQL, plus a registry
//! - The pipeline orchestrator binding one extractor to one loader

pub mod config;
pub mod data;
pub mod error;
pub mod extract;
pub mod load;
pub mod logging;
pub mod model;
pub mod pipeline;

pub use config::{load_config, parse_config, PipelineConfig};
pub use error::{ConfigError, ExtractionError, FinEtlError, LoadingError};
pub use extract::{Extractor, ProviderExtractor};
pub use load::{Loader, LoaderRegistry};
pub use model::{ExtractedData, TableKind};
pub use pipeline::{Pipeline, PipelineReport};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: values handed between pipeline phases are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<PipelineConfig>();
        require_sync::<PipelineConfig>();
        require_send::<ExtractedData>();
        require_sync::<ExtractedData>();
        require_send::<PipelineReport>();
        require_sync::<PipelineReport>();
        require_send::<FinEtlError>();
        require_sync::<FinEtlError>();
    }
}
