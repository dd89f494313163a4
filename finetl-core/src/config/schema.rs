//! Typed, validated pipeline configuration.
//!
//! The extraction sections deserialize directly; [`super::parse_config`] is
//! the only place that builds a [`PipelineConfig`] and checks the cross-field
//! invariants (date ordering, enabled data types, destination fields).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

/// Root configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub name: String,
    pub extraction: ExtractionSpec,
    pub loading: LoadingSpec,
}

/// What to extract and from where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSpec {
    #[serde(default)]
    pub source: Provider,
    pub tickers: Vec<String>,
    pub data_types: DataTypes,
}

/// Supported market data providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "yfinance")]
    #[default]
    Yahoo,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Yahoo => "yfinance",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The data type sections. At least one is present and enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTypes {
    #[serde(default)]
    pub ohlcv: Option<OhlcvSpec>,
    #[serde(default)]
    pub financials: Option<FinancialsSpec>,
}

impl DataTypes {
    /// The OHLCV section, if present and enabled.
    pub fn enabled_ohlcv(&self) -> Option<&OhlcvSpec> {
        self.ohlcv.as_ref().filter(|s| s.enabled)
    }

    /// The financials section, if present and enabled.
    pub fn enabled_financials(&self) -> Option<&FinancialsSpec> {
        self.financials.as_ref().filter(|s| s.enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvSpec {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub start_date: NaiveDate,
    /// Exclusive upper bound, strictly after `start_date`.
    pub end_date: NaiveDate,
    #[serde(default)]
    pub interval: Interval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialsSpec {
    pub enabled: bool,
    pub frequency: Frequency,
    pub statements: Vec<StatementKind>,
}

impl Default for FinancialsSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: Frequency::Annual,
            statements: StatementKind::ALL.to_vec(),
        }
    }
}

/// Sampling granularity of a price series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "2m")]
    TwoMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "60m")]
    SixtyMinutes,
    #[serde(rename = "90m")]
    NinetyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    #[default]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1wk")]
    OneWeek,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::TwoMinutes => "2m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::SixtyMinutes => "60m",
            Interval::NinetyMinutes => "90m",
            Interval::OneHour => "1h",
            Interval::OneDay => "1d",
            Interval::FiveDays => "5d",
            Interval::OneWeek => "1wk",
            Interval::OneMonth => "1mo",
            Interval::ThreeMonths => "3mo",
        }
    }

    /// Intraday bars carry a timestamp; coarser bars carry a calendar date.
    pub fn is_intraday(&self) -> bool {
        matches!(
            self,
            Interval::OneMinute
                | Interval::TwoMinutes
                | Interval::FiveMinutes
                | Interval::FifteenMinutes
                | Interval::ThirtyMinutes
                | Interval::SixtyMinutes
                | Interval::NinetyMinutes
                | Interval::OneHour
        )
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reporting frequency of financial statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Annual,
    Quarterly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Annual => "annual",
            Frequency::Quarterly => "quarterly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of financial statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    BalanceSheet,
    IncomeStatement,
    CashFlow,
}

impl StatementKind {
    pub const ALL: [StatementKind; 3] = [
        StatementKind::BalanceSheet,
        StatementKind::IncomeStatement,
        StatementKind::CashFlow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::BalanceSheet => "balance_sheet",
            StatementKind::IncomeStatement => "income_statement",
            StatementKind::CashFlow => "cash_flow",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where extracted data is written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadingSpec {
    pub destination: Destination,
}

impl LoadingSpec {
    pub fn new(destination: Destination) -> Self {
        Self { destination }
    }
}

/// One case per destination, carrying only that destination's fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "destination", rename_all = "lowercase")]
pub enum Destination {
    Csv { path: PathBuf },
    Parquet { path: PathBuf },
    #[serde(rename = "huggingface")]
    Hub(HubTarget),
    #[serde(rename = "postgresql")]
    Postgres(PostgresTarget),
}

impl Destination {
    pub const NAMES: [&'static str; 4] = ["csv", "parquet", "huggingface", "postgresql"];

    /// Registry key for this destination.
    pub fn name(&self) -> &'static str {
        match self {
            Destination::Csv { .. } => "csv",
            Destination::Parquet { .. } => "parquet",
            Destination::Hub(_) => "huggingface",
            Destination::Postgres(_) => "postgresql",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HubTarget {
    pub repo_id: String,
    pub private: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostgresTarget {
    pub host: String,
    pub port: u16,
    pub database: String,
    #[serde(rename = "schema_name")]
    pub schema: String,
    pub user: String,
    #[serde(serialize_with = "redact")]
    pub password: String,
    pub if_exists: IfExists,
}

/// What to do when the target table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfExists {
    Fail,
    Replace,
    #[default]
    Append,
}

fn enabled_by_default() -> bool {
    true
}

fn redact<S: Serializer>(_: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str("********")
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn wire_names_match_as_str() {
        for interval in [Interval::NinetyMinutes, Interval::OneWeek, Interval::ThreeMonths] {
            let wire = serde_json::to_value(interval).unwrap();
            assert_eq!(wire, json!(interval.as_str()));
            assert_eq!(serde_json::from_value::<Interval>(wire).unwrap(), interval);
        }
        assert_eq!(
            serde_json::to_value(StatementKind::IncomeStatement).unwrap(),
            json!(StatementKind::IncomeStatement.as_str())
        );
        assert_eq!(
            serde_json::from_value::<IfExists>(json!("replace")).unwrap(),
            IfExists::Replace
        );
    }

    #[test]
    fn unknown_interval_lists_choices() {
        let err = serde_json::from_value::<Interval>(json!("2h")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("2h"));
        assert!(msg.contains("1wk"));
    }

    #[test]
    fn ohlcv_section_defaults() {
        let spec: OhlcvSpec =
            serde_json::from_value(json!({ "start_date": "2024-01-01", "end_date": "2024-02-01" }))
                .unwrap();
        assert!(spec.enabled);
        assert_eq!(spec.interval, Interval::OneDay);
    }

    #[test]
    fn intraday_split() {
        assert!(Interval::OneHour.is_intraday());
        assert!(Interval::NinetyMinutes.is_intraday());
        assert!(!Interval::OneDay.is_intraday());
        assert!(!Interval::ThreeMonths.is_intraday());
    }

    #[test]
    fn financials_default_covers_all_statements() {
        let spec = FinancialsSpec::default();
        assert!(spec.enabled);
        assert_eq!(spec.frequency, Frequency::Annual);
        assert_eq!(spec.statements.len(), 3);
    }

    #[test]
    fn password_is_redacted_when_serialized() {
        let dest = Destination::Postgres(PostgresTarget {
            host: "localhost".into(),
            port: 5432,
            database: "market".into(),
            schema: "public".into(),
            user: "etl".into(),
            password: "hunter2".into(),
            if_exists: IfExists::Append,
        });
        let json = serde_json::to_value(&dest).unwrap();
        assert_eq!(json["destination"], "postgresql");
        assert_eq!(json["schema_name"], "public");
        assert_ne!(json["password"], "hunter2");
    }
}
