//! Pipeline orchestration: one configuration, one extractor, one loader.

use crate::config::{self, PipelineConfig, Provider};
use crate::data::YahooProvider;
use crate::error::{ConfigError, ExtractionError, FinEtlError};
use crate::extract::{Extractor, ProviderExtractor};
use crate::load::LoaderRegistry;
use crate::model::{ExtractedData, TableKind};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub name: String,
    pub ohlcv_rows: usize,
    pub financials_rows: usize,
    pub skipped_tickers: Vec<String>,
    /// False when extraction produced nothing and the load phase was skipped.
    pub loaded: bool,
}

impl PipelineReport {
    fn new(name: &str, data: &ExtractedData) -> Self {
        Self {
            name: name.to_string(),
            ohlcv_rows: data.row_count(TableKind::Ohlcv),
            financials_rows: data.row_count(TableKind::Financials),
            skipped_tickers: data.skipped_tickers.clone(),
            loaded: false,
        }
    }
}

/// A validated configuration bound to the loaders it may resolve.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    registry: LoaderRegistry,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            registry: LoaderRegistry::with_defaults(),
        }
    }

    /// Load, validate and bind a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        config::load_config(path).map(Self::new)
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, ConfigError> {
        config::parse_config(value).map(Self::new)
    }

    /// Resolve loaders through `registry` instead of the defaults.
    pub fn with_registry(mut self, registry: LoaderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract with the configured provider, then load.
    pub fn run(&self) -> Result<PipelineReport, FinEtlError> {
        let spec = self.config.extraction.clone();
        match spec.source {
            Provider::Yahoo => {
                let provider = YahooProvider::new().map_err(ExtractionError::PriceDownload)?;
                self.run_with(&ProviderExtractor::new(provider, spec))
            }
        }
    }

    /// Run with an injected extractor. The loader is only resolved when there
    /// is something to load.
    pub fn run_with(&self, extractor: &dyn Extractor) -> Result<PipelineReport, FinEtlError> {
        let name = &self.config.name;
        let destination = &self.config.loading.destination;
        info!(
            pipeline = %name,
            source = %self.config.extraction.source,
            tickers = self.config.extraction.tickers.len(),
            destination = destination.name(),
            "starting pipeline"
        );

        info!(pipeline = %name, "extracting");
        let data = extractor.extract()?;
        let mut report = PipelineReport::new(name, &data);
        info!(
            pipeline = %name,
            ohlcv_rows = report.ohlcv_rows,
            financials_rows = report.financials_rows,
            skipped = report.skipped_tickers.len(),
            "extraction finished"
        );

        if data.is_empty() {
            warn!(pipeline = %name, "no data extracted, skipping load");
            return Ok(report);
        }

        info!(pipeline = %name, destination = destination.name(), "loading");
        let loader = self.registry.create(destination)?;
        loader.load(&data)?;
        report.loaded = true;

        info!(pipeline = %name, "pipeline finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DataTypes, Destination, ExtractionSpec, Interval, LoadingSpec, OhlcvSpec,
    };
    use crate::error::LoadingError;
    use crate::load::Loader;
    use crate::data::ProviderError;
    use chrono::NaiveDate;
    use polars::prelude::*;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    fn config() -> PipelineConfig {
        PipelineConfig {
            name: "daily".to_string(),
            extraction: ExtractionSpec {
                source: Provider::Yahoo,
                tickers: vec!["AAPL".to_string()],
                data_types: DataTypes {
                    ohlcv: Some(OhlcvSpec {
                        enabled: true,
                        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                        end_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                        interval: Interval::OneDay,
                    }),
                    financials: None,
                },
            },
            loading: LoadingSpec::new(Destination::Csv {
                path: PathBuf::from("./output"),
            }),
        }
    }

    struct FixedExtractor(Result<ExtractedData, ()>);

    impl Extractor for FixedExtractor {
        fn extract(&self) -> Result<ExtractedData, ExtractionError> {
            self.0
                .clone()
                .map_err(|()| ExtractionError::PriceDownload(ProviderError::RateLimited))
        }
    }

    fn data() -> ExtractedData {
        let ohlcv = df!("ticker" => &["AAPL", "AAPL"], "close" => &[185.6, 184.2]).unwrap();
        ExtractedData::new(Some(ohlcv), None).with_skipped_tickers(vec!["NOPE".into()])
    }

    #[derive(Default)]
    struct Record {
        created: usize,
        loaded_rows: Vec<usize>,
    }

    struct RecordingLoader {
        record: Arc<Mutex<Record>>,
        fail: bool,
    }

    impl Loader for RecordingLoader {
        fn destination(&self) -> &str {
            "csv"
        }

        fn load(&self, data: &ExtractedData) -> Result<(), LoadingError> {
            if self.fail {
                return Err(LoadingError::TableExists {
                    schema: "public".into(),
                    table: TableKind::Ohlcv,
                });
            }
            self.record
                .lock()
                .unwrap()
                .loaded_rows
                .push(data.row_count(TableKind::Ohlcv));
            Ok(())
        }
    }

    fn recording_pipeline(fail: bool) -> (Pipeline, Arc<Mutex<Record>>) {
        let record = Arc::new(Mutex::new(Record::default()));
        let shared = Arc::clone(&record);
        let mut registry = LoaderRegistry::empty();
        registry.register_loader("csv", move |_| {
            shared.lock().unwrap().created += 1;
            Ok(Box::new(RecordingLoader {
                record: Arc::clone(&shared),
                fail,
            }) as Box<dyn Loader>)
        });
        (Pipeline::new(config()).with_registry(registry), record)
    }

    #[test]
    fn extracted_data_is_loaded_and_reported() {
        let (pipeline, record) = recording_pipeline(false);
        let report = pipeline.run_with(&FixedExtractor(Ok(data()))).unwrap();

        assert_eq!(
            report,
            PipelineReport {
                name: "daily".into(),
                ohlcv_rows: 2,
                financials_rows: 0,
                skipped_tickers: vec!["NOPE".into()],
                loaded: true,
            }
        );
        let record = record.lock().unwrap();
        assert_eq!(record.created, 1);
        assert_eq!(record.loaded_rows, vec![2]);
    }

    #[test]
    fn empty_extraction_never_resolves_a_loader() {
        let (pipeline, record) = recording_pipeline(false);
        let report = pipeline
            .run_with(&FixedExtractor(Ok(ExtractedData::default())))
            .unwrap();

        assert!(!report.loaded);
        assert_eq!(record.lock().unwrap().created, 0);
    }

    #[test]
    fn extraction_failure_skips_load() {
        let (pipeline, record) = recording_pipeline(false);
        let err = pipeline.run_with(&FixedExtractor(Err(()))).unwrap_err();

        assert!(matches!(err, FinEtlError::Extraction(_)));
        assert_eq!(record.lock().unwrap().created, 0);
    }

    #[test]
    fn loading_failure_propagates() {
        let (pipeline, _) = recording_pipeline(true);
        let err = pipeline.run_with(&FixedExtractor(Ok(data()))).unwrap_err();
        assert!(matches!(
            err,
            FinEtlError::Loading(LoadingError::TableExists { .. })
        ));
    }

    #[test]
    fn unregistered_destination_is_config_error() {
        let pipeline = Pipeline::new(config()).with_registry(LoaderRegistry::empty());
        let err = pipeline.run_with(&FixedExtractor(Ok(data()))).unwrap_err();
        assert!(matches!(
            err,
            FinEtlError::Config(ConfigError::UnsupportedDestination { .. })
        ));
    }

    #[test]
    fn from_value_validates() {
        let err = Pipeline::from_value(&json!({ "name": "x" })).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let pipeline = Pipeline::from_value(&json!({
            "name": "daily",
            "extraction": {
                "source": "yfinance",
                "tickers": ["AAPL"],
                "data_types": {
                    "ohlcv": { "start_date": "2024-01-01", "end_date": "2024-02-01" }
                }
            },
            "loading": { "destination": "parquet" }
        }))
        .unwrap();
        assert_eq!(pipeline.config().loading.destination.name(), "parquet");
    }
}
