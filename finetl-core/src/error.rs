//! Error taxonomy for the pipeline.
//!
//! Configuration errors abort before any I/O, extraction errors abort the run,
//! loading errors abort the remaining writes. Every variant keeps its cause.

use crate::data::provider::ProviderError;
use crate::load::hub::HubError;
use crate::model::TableKind;
use std::path::PathBuf;
use thiserror::Error;

/// Any failure surfaced by a pipeline run.
#[derive(Debug, Error)]
pub enum FinEtlError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Loading(#[from] LoadingError),
}

/// Bad shape, failed invariant, or unreadable configuration source.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("config path is not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {format} syntax: {message}")]
    Syntax {
        format: &'static str,
        message: String,
    },

    #[error("config file must contain a mapping at the top level")]
    NotAMapping,

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("unsupported destination type: {name}. Supported: {supported}")]
    UnsupportedDestination { name: String, supported: String },
}

impl ConfigError {
    /// Individual violations for [`ConfigError::Invalid`]; empty otherwise.
    pub fn violations(&self) -> &[String] {
        match self {
            ConfigError::Invalid(v) => v,
            _ => &[],
        }
    }
}

/// The provider could not deliver data, or its output could not be reshaped.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to download OHLCV data: {0}")]
    PriceDownload(#[source] ProviderError),

    #[error("failed to reshape {table} data: {source}")]
    Reshape {
        table: TableKind,
        #[source]
        source: polars::error::PolarsError,
    },
}

/// A destination write failed. Table-scoped variants name the table.
#[derive(Debug, Error)]
pub enum LoadingError {
    #[error("failed to create output directory {}: {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {table} data to {}: {source}", path.display())]
    WriteFile {
        table: TableKind,
        path: PathBuf,
        #[source]
        source: polars::error::PolarsError,
    },

    #[error("failed to convert {table} data: {source}")]
    Convert {
        table: TableKind,
        #[source]
        source: polars::error::PolarsError,
    },

    #[error("failed to upload to Hugging Face Hub repo {repo_id}: {source}")]
    Upload {
        repo_id: String,
        #[source]
        source: HubError,
    },

    #[error("failed to start database runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to create database connection: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("table {schema}.{table} already exists")]
    TableExists { schema: String, table: TableKind },

    #[error("failed to write {table} data to database: {source}")]
    WriteTable {
        table: TableKind,
        #[source]
        source: sqlx::Error,
    },
}

impl LoadingError {
    /// The table a failure is tied to, when it is tied to one.
    pub fn table(&self) -> Option<TableKind> {
        match self {
            LoadingError::WriteFile { table, .. }
            | LoadingError::Convert { table, .. }
            | LoadingError::TableExists { table, .. }
            | LoadingError::WriteTable { table, .. } => Some(*table),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_lists_every_violation() {
        let err = ConfigError::Invalid(vec![
            "extraction.tickers: must not be empty".into(),
            "at least one data type must be enabled".into(),
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("invalid configuration"));
        assert!(msg.contains("tickers"));
        assert!(msg.contains("at least one data type"));
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn loading_error_reports_table() {
        let err = LoadingError::TableExists {
            schema: "public".into(),
            table: TableKind::Ohlcv,
        };
        assert_eq!(err.table(), Some(TableKind::Ohlcv));
        assert_eq!(err.to_string(), "table public.ohlcv already exists");
    }

    #[test]
    fn umbrella_error_is_transparent() {
        let err: FinEtlError = ConfigError::NotAMapping.into();
        assert_eq!(
            err.to_string(),
            "config file must contain a mapping at the top level"
        );
    }
}
