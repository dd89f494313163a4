//! Pipeline configuration: typed schema, validation, and file loading.

pub mod loader;
pub mod parse;
pub mod schema;

pub use loader::{load_config, load_document};
pub use parse::parse_config;
pub use schema::{
    DataTypes, Destination, ExtractionSpec, FinancialsSpec, Frequency, HubTarget, IfExists,
    Interval, LoadingSpec, OhlcvSpec, PipelineConfig, PostgresTarget, Provider, StatementKind,
};
