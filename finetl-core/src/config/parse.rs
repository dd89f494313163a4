//! Untyped mapping -> [`PipelineConfig`].
//!
//! Serde checks the shape of the document and reports the first missing key,
//! wrong type or unknown choice. The cross-field rules are then checked
//! together, so one [`ConfigError::Invalid`] lists every broken invariant.

use super::schema::{
    Destination, ExtractionSpec, HubTarget, IfExists, LoadingSpec, PipelineConfig,
    PostgresTarget,
};
use crate::error::ConfigError;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

const DEFAULT_OUTPUT_PATH: &str = "./output";
const DEFAULT_PG_PORT: u16 = 5432;
const DEFAULT_PG_SCHEMA: &str = "public";

/// Parse and validate a configuration mapping.
pub fn parse_config(value: &Value) -> Result<PipelineConfig, ConfigError> {
    if !value.is_object() {
        return Err(ConfigError::NotAMapping);
    }
    let raw = RawConfig::deserialize(value).map_err(|e| ConfigError::Invalid(vec![e.to_string()]))?;
    raw.validate()
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    name: String,
    extraction: ExtractionSpec,
    loading: RawLoading,
}

/// The loading section as written: one flat table whose destination-specific
/// keys are all optional until the destination is known.
#[derive(Debug, Deserialize)]
struct RawLoading {
    #[serde(default = "default_destination")]
    destination: String,
    #[serde(default = "default_path")]
    path: PathBuf,

    repo_id: Option<String>,
    #[serde(default)]
    private: bool,

    host: Option<String>,
    #[serde(default = "default_port")]
    port: u16,
    database: Option<String>,
    #[serde(default = "default_schema")]
    schema_name: String,
    user: Option<String>,
    password: Option<String>,
    #[serde(default)]
    if_exists: IfExists,
}

impl RawConfig {
    fn validate(self) -> Result<PipelineConfig, ConfigError> {
        let mut violations = Vec::new();

        let mut extraction = self.extraction;
        extraction.tickers = extraction
            .tickers
            .iter()
            .map(|t| t.trim().to_string())
            .collect();
        check_extraction(&extraction, &mut violations);

        let destination = self.loading.into_destination(&mut violations);
        match destination {
            Some(destination) if violations.is_empty() => Ok(PipelineConfig {
                name: self.name,
                extraction,
                loading: LoadingSpec::new(destination),
            }),
            _ => Err(ConfigError::Invalid(violations)),
        }
    }
}

fn check_extraction(extraction: &ExtractionSpec, violations: &mut Vec<String>) {
    if extraction.tickers.is_empty() {
        violations.push("extraction.tickers: must contain at least one ticker".to_string());
    }
    for (i, ticker) in extraction.tickers.iter().enumerate() {
        if ticker.is_empty() {
            violations.push(format!("extraction.tickers[{i}]: must not be blank"));
        }
    }

    let data_types = &extraction.data_types;
    if let Some(ohlcv) = &data_types.ohlcv {
        if ohlcv.start_date >= ohlcv.end_date {
            violations.push(format!(
                "extraction.data_types.ohlcv: start_date must be before end_date (got {} >= {})",
                ohlcv.start_date, ohlcv.end_date
            ));
        }
    }
    if data_types.enabled_ohlcv().is_none() && data_types.enabled_financials().is_none() {
        violations.push(
            "extraction.data_types: at least one data type must be enabled".to_string(),
        );
    }
}

impl RawLoading {
    fn into_destination(self, violations: &mut Vec<String>) -> Option<Destination> {
        let RawLoading {
            destination,
            path,
            repo_id,
            private,
            host,
            port,
            database,
            schema_name,
            user,
            password,
            if_exists,
        } = self;

        match destination.as_str() {
            "csv" => Some(Destination::Csv { path }),
            "parquet" => Some(Destination::Parquet { path }),
            "huggingface" => match repo_id.filter(|r| !r.trim().is_empty()) {
                Some(repo_id) => Some(Destination::Hub(HubTarget { repo_id, private })),
                None => {
                    violations
                        .push("loading: repo_id is required for huggingface destination".to_string());
                    None
                }
            },
            "postgresql" => {
                let missing: Vec<&str> = [
                    ("host", &host),
                    ("database", &database),
                    ("user", &user),
                    ("password", &password),
                ]
                .into_iter()
                .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
                .map(|(key, _)| key)
                .collect();
                if !missing.is_empty() {
                    violations.push(format!("loading: postgresql requires: {}", missing.join(", ")));
                    return None;
                }
                Some(Destination::Postgres(PostgresTarget {
                    host: host?,
                    port,
                    database: database?,
                    schema: schema_name,
                    user: user?,
                    password: password?,
                    if_exists,
                }))
            }
            other => {
                violations.push(format!(
                    "loading.destination: unsupported destination '{other}' (expected one of {})",
                    Destination::NAMES.join(", ")
                ));
                None
            }
        }
    }
}

fn default_destination() -> String {
    "csv".to_string()
}

fn default_path() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_PATH)
}

fn default_port() -> u16 {
    DEFAULT_PG_PORT
}

fn default_schema() -> String {
    DEFAULT_PG_SCHEMA.to_string()
}
