//! Extraction: fetch raw market data from a provider and reshape it into the
//! canonical OHLCV and financials tables.

mod prices;
mod statements;

pub use prices::normalize_prices;
pub use statements::{merge_statements, transpose_statement};

use crate::config::ExtractionSpec;
use crate::data::{MarketDataProvider, PriceRequest};
use crate::error::ExtractionError;
use crate::model::ExtractedData;
use tracing::{info, warn};

/// Produces one [`ExtractedData`] per call.
pub trait Extractor {
    fn extract(&self) -> Result<ExtractedData, ExtractionError>;
}

impl<E: Extractor + ?Sized> Extractor for Box<E> {
    fn extract(&self) -> Result<ExtractedData, ExtractionError> {
        (**self).extract()
    }
}

/// Extractor driven by a [`MarketDataProvider`] and the extraction section of a config.
pub struct ProviderExtractor<P> {
    provider: P,
    spec: ExtractionSpec,
}

impl<P: MarketDataProvider> ProviderExtractor<P> {
    pub fn new(provider: P, spec: ExtractionSpec) -> Self {
        Self { provider, spec }
    }
}

impl<P: MarketDataProvider> Extractor for ProviderExtractor<P> {
    fn extract(&self) -> Result<ExtractedData, ExtractionError> {
        let tickers = &self.spec.tickers;

        // Price and statement extraction are independent: a failed download
        // still lets statements run, then fails the extraction as a whole.
        let ohlcv = match self.spec.data_types.enabled_ohlcv() {
            Some(ohlcv) => {
                info!(
                    provider = self.provider.name(),
                    tickers = tickers.len(),
                    start = %ohlcv.start_date,
                    end = %ohlcv.end_date,
                    interval = %ohlcv.interval,
                    "extracting OHLCV"
                );
                let request = PriceRequest {
                    tickers: tickers.clone(),
                    start: ohlcv.start_date,
                    end: ohlcv.end_date,
                    interval: ohlcv.interval,
                    auto_adjust: true,
                };
                self.provider
                    .download(&request)
                    .map_err(ExtractionError::PriceDownload)
                    .and_then(|resp| normalize_prices(tickers, resp))
                    .map(Some)
            }
            None => Ok(None),
        };

        let (financials, skipped) = match self.spec.data_types.enabled_financials() {
            Some(spec) => {
                info!(
                    provider = self.provider.name(),
                    tickers = tickers.len(),
                    frequency = %spec.frequency,
                    statements = spec.statements.len(),
                    "extracting financials"
                );
                statements::extract_financials(&self.provider, tickers, spec)?
            }
            None => (None, Vec::new()),
        };

        let ohlcv = ohlcv?;
        let data = ExtractedData::new(ohlcv, financials).with_skipped_tickers(skipped);
        if data.is_empty() {
            warn!("extraction produced no data");
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DataTypes, FinancialsSpec, Frequency, Interval, OhlcvSpec, Provider, StatementKind,
    };
    use crate::data::{MetricRow, PriceResponse, ProviderError, RawStatement};
    use chrono::NaiveDate;
    use polars::prelude::*;
    use std::cell::RefCell;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bars() -> DataFrame {
        df!(
            "Date" => &[date(2024, 1, 2), date(2024, 1, 3)],
            "Open" => &[187.15, 184.22],
            "High" => &[188.44, 185.88],
            "Low" => &[183.89, 183.43],
            "Close" => &[185.64, 184.25],
            "Volume" => &[82_488_700i64, 58_414_500],
        )
        .unwrap()
    }

    fn statement(metric: &str, value: f64) -> RawStatement {
        RawStatement {
            periods: vec![date(2023, 9, 30)],
            metrics: vec![MetricRow {
                name: metric.to_string(),
                values: vec![Some(value)],
            }],
        }
    }

    /// Scripted provider: price result fixed up front, statements per ticker.
    struct FakeProvider {
        prices: RefCell<Option<Result<PriceResponse, ProviderError>>>,
        with_statements: Vec<&'static str>,
        requests: RefCell<Vec<PriceRequest>>,
    }

    impl FakeProvider {
        fn new(prices: Result<PriceResponse, ProviderError>) -> Self {
            Self {
                prices: RefCell::new(Some(prices)),
                with_statements: vec!["AAPL"],
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl MarketDataProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn download(&self, request: &PriceRequest) -> Result<PriceResponse, ProviderError> {
            self.requests.borrow_mut().push(request.clone());
            self.prices
                .borrow_mut()
                .take()
                .unwrap_or(Ok(PriceResponse::Empty))
        }

        fn statement(
            &self,
            ticker: &str,
            kind: StatementKind,
            _frequency: Frequency,
        ) -> Result<Option<RawStatement>, ProviderError> {
            if !self.with_statements.contains(&ticker) {
                return Ok(None);
            }
            Ok(Some(match kind {
                StatementKind::BalanceSheet => statement("Total Assets", 352.0),
                StatementKind::IncomeStatement => statement("Total Revenue", 383.0),
                StatementKind::CashFlow => statement("Free Cash Flow", 99.0),
            }))
        }
    }

    fn spec(ohlcv: bool, financials: bool) -> ExtractionSpec {
        ExtractionSpec {
            source: Provider::Yahoo,
            tickers: vec!["AAPL".to_string()],
            data_types: DataTypes {
                ohlcv: Some(OhlcvSpec {
                    enabled: ohlcv,
                    start_date: date(2024, 1, 1),
                    end_date: date(2024, 1, 31),
                    interval: Interval::OneDay,
                }),
                financials: Some(FinancialsSpec {
                    enabled: financials,
                    frequency: Frequency::Annual,
                    statements: StatementKind::ALL.to_vec(),
                }),
            },
        }
    }

    #[test]
    fn extracts_both_tables() {
        let provider = FakeProvider::new(Ok(PriceResponse::Single(bars())));
        let data = ProviderExtractor::new(provider, spec(true, true))
            .extract()
            .unwrap();

        assert_eq!(data.ohlcv.as_ref().unwrap().height(), 2);
        let financials = data.financials.as_ref().unwrap();
        assert_eq!(financials.height(), 1);
        assert_eq!(financials.width(), 5);
        assert!(data.skipped_tickers.is_empty());
    }

    #[test]
    fn download_request_carries_configured_range() {
        let extractor = ProviderExtractor::new(
            FakeProvider::new(Ok(PriceResponse::Empty)),
            spec(true, false),
        );
        extractor.extract().unwrap();

        let requests = extractor.provider.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tickers, vec!["AAPL".to_string()]);
        assert_eq!(requests[0].start, date(2024, 1, 1));
        assert_eq!(requests[0].end, date(2024, 1, 31));
        assert_eq!(requests[0].interval, Interval::OneDay);
        assert!(requests[0].auto_adjust);
    }

    #[test]
    fn disabled_ohlcv_skips_download() {
        let extractor =
            ProviderExtractor::new(FakeProvider::new(Ok(PriceResponse::Empty)), spec(false, true));
        let data = extractor.extract().unwrap();

        assert!(extractor.provider.requests.borrow().is_empty());
        assert!(data.ohlcv.is_none());
        assert!(data.financials.is_some());
    }

    #[test]
    fn download_failure_fails_extraction() {
        let provider = FakeProvider::new(Err(ProviderError::RateLimited));
        let err = ProviderExtractor::new(provider, spec(true, true))
            .extract()
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::PriceDownload(ProviderError::RateLimited)
        ));
    }

    #[test]
    fn empty_response_yields_empty_data() {
        let mut provider = FakeProvider::new(Ok(PriceResponse::Empty));
        provider.with_statements.clear();
        let data = ProviderExtractor::new(provider, spec(true, true))
            .extract()
            .unwrap();

        assert!(data.is_empty());
        assert_eq!(data.skipped_tickers, vec!["AAPL".to_string()]);
    }
}
