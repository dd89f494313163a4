//! Reading configuration documents from disk.
//!
//! TOML, YAML and JSON files are all lowered to a `serde_json::Value` mapping
//! and handed to [`parse_config`].

use super::parse::parse_config;
use super::schema::PipelineConfig;
use crate::error::ConfigError;
use serde_json::Value;
use std::path::Path;

/// Load and validate a pipeline configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<PipelineConfig, ConfigError> {
    let value = load_document(path.as_ref())?;
    parse_config(&value)
}

/// Read a configuration file into an untyped mapping without validating it.
pub fn load_document(path: &Path) -> Result<Value, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(ConfigError::NotAFile(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let value = match ext.as_deref() {
        Some("toml") => from_toml(&content)?,
        Some("json") => from_json(&content)?,
        _ => from_yaml(&content)?,
    };

    if !value.is_object() {
        return Err(ConfigError::NotAMapping);
    }
    Ok(value)
}

/// Parse a TOML document. Native TOML dates become `YYYY-MM-DD` strings.
pub fn from_toml(content: &str) -> Result<Value, ConfigError> {
    let table: toml::Table = toml::from_str(content).map_err(|e| ConfigError::Syntax {
        format: "TOML",
        message: e.to_string(),
    })?;
    Ok(toml_to_json(toml::Value::Table(table)))
}

pub fn from_yaml(content: &str) -> Result<Value, ConfigError> {
    serde_yaml::from_str(content).map_err(|e| ConfigError::Syntax {
        format: "YAML",
        message: e.to_string(),
    })
}

pub fn from_json(content: &str) -> Result<Value, ConfigError> {
    serde_json::from_str(content).map_err(|e| ConfigError::Syntax {
        format: "JSON",
        message: e.to_string(),
    })
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}
