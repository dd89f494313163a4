//! Yahoo Finance data provider.
//!
//! Price bars come from Yahoo's v8 chart API and financial statements from the
//! fundamentals-timeseries API. Failures are propagated as-is: there is no
//! retry or backoff here.
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.

use super::provider::{
    MarketDataProvider, MetricRow, PriceRequest, PriceResponse, ProviderError, RawStatement,
};
use crate::config::{Frequency, Interval, StatementKind};
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";

/// Earliest period the fundamentals API is asked for.
const FUNDAMENTALS_START_TS: i64 = 493_590_046;

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Fundamentals-timeseries API response.
#[derive(Debug, Deserialize)]
struct TimeseriesResponse {
    timeseries: TimeseriesResult,
}

#[derive(Debug, Deserialize)]
struct TimeseriesResult {
    result: Option<Vec<serde_json::Value>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct SeriesPoint {
    #[serde(rename = "asOfDate")]
    as_of_date: NaiveDate,
    #[serde(rename = "reportedValue")]
    reported_value: Option<ReportedValue>,
}

#[derive(Debug, Deserialize)]
struct ReportedValue {
    raw: Option<f64>,
}

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new() -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| {
                ProviderError::NetworkUnreachable(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the provider at another host (a mirror or a local test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// GET a Yahoo endpoint and decode the JSON body, mapping HTTP failures.
    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        symbol: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| ProviderError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthenticationRequired(
                "Yahoo Finance requires authentication".into(),
            ));
        }
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                symbol: symbol.to_string(),
            });
        }

        resp.json().map_err(|e| {
            ProviderError::ResponseFormatChanged(format!(
                "failed to parse response for {symbol}: {e}"
            ))
        })
    }

    /// Fetch one symbol's bars as a provider-shaped frame.
    fn fetch_chart(&self, symbol: &str, request: &PriceRequest) -> Result<DataFrame, ProviderError> {
        let url = format!("{}/v8/finance/chart/{symbol}", self.base_url);
        let query = [
            ("period1", day_start_ts(request.start).to_string()),
            ("period2", day_start_ts(request.end).to_string()),
            ("interval", request.interval.as_str().to_string()),
            ("includeAdjustedClose", "true".to_string()),
            ("events", "div,splits".to_string()),
        ];
        let chart: ChartResponse = self.get_json(symbol, &url, &query)?;
        parse_chart(symbol, chart, request.interval, request.auto_adjust)
    }
}

impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yfinance"
    }

    fn download(&self, request: &PriceRequest) -> Result<PriceResponse, ProviderError> {
        let mut frames = Vec::with_capacity(request.tickers.len());

        for symbol in &request.tickers {
            debug!(symbol = %symbol, interval = %request.interval, "fetching chart");
            match self.fetch_chart(symbol, request) {
                Ok(df) if df.height() > 0 => frames.push((symbol.clone(), df)),
                Ok(_) => warn!(symbol = %symbol, "no price data returned"),
                Err(ProviderError::SymbolNotFound { .. }) => {
                    warn!(symbol = %symbol, "symbol not found, omitted from response")
                }
                Err(e) => return Err(e),
            }
        }

        if frames.is_empty() {
            return Ok(PriceResponse::Empty);
        }
        if request.tickers.len() == 1 {
            if let Some((_, df)) = frames.pop() {
                return Ok(PriceResponse::Single(df));
            }
        }
        Ok(PriceResponse::ByTicker(frames))
    }

    fn statement(
        &self,
        ticker: &str,
        kind: StatementKind,
        frequency: Frequency,
    ) -> Result<Option<RawStatement>, ProviderError> {
        let keys = statement_keys(kind);
        let types: Vec<String> = keys
            .iter()
            .map(|k| format!("{}{k}", frequency.as_str()))
            .collect();

        let url = format!(
            "{}/ws/fundamentals-timeseries/v1/finance/timeseries/{ticker}",
            self.base_url
        );
        let query = [
            ("symbol", ticker.to_string()),
            ("type", types.join(",")),
            ("period1", FUNDAMENTALS_START_TS.to_string()),
            ("period2", Utc::now().timestamp().to_string()),
        ];
        debug!(ticker, statement = %kind, frequency = %frequency, "fetching statement");
        let resp: TimeseriesResponse = self.get_json(ticker, &url, &query)?;
        let statement = parse_timeseries(ticker, resp, frequency, keys)?;
        Ok(Some(statement).filter(|s| !s.is_empty()))
    }
}

/// Midnight UTC of a date as a Unix timestamp.
fn day_start_ts(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

/// Parse the chart API response into a frame named the way the provider names columns.
fn parse_chart(
    symbol: &str,
    resp: ChartResponse,
    interval: Interval,
    auto_adjust: bool,
) -> Result<DataFrame, ProviderError> {
    let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
        Some(err) if err.code == "Not Found" => ProviderError::SymbolNotFound {
            symbol: symbol.to_string(),
        },
        Some(err) => ProviderError::ResponseFormatChanged(format!("{}: {}", err.code, err.description)),
        None => ProviderError::ResponseFormatChanged("empty result with no error".into()),
    })?;

    let data = result
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ResponseFormatChanged("result array is empty".into()))?;

    // A valid symbol with no bars in range has no timestamp array at all.
    let timestamps = data.timestamp.unwrap_or_default();
    let gmtoffset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);

    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);

    let n = timestamps.len();
    let mut index = Vec::with_capacity(n);
    let mut opens = Vec::with_capacity(n);
    let mut highs = Vec::with_capacity(n);
    let mut lows = Vec::with_capacity(n);
    let mut closes = Vec::with_capacity(n);
    let mut volumes = Vec::with_capacity(n);

    for (i, &ts) in timestamps.iter().enumerate() {
        let mut open = quote.open.get(i).copied().flatten();
        let mut high = quote.high.get(i).copied().flatten();
        let mut low = quote.low.get(i).copied().flatten();
        let mut close = quote.close.get(i).copied().flatten();
        let volume = quote.volume.get(i).copied().flatten();

        // Skip bars where all OHLCV are None (holidays/non-trading days)
        if open.is_none() && high.is_none() && low.is_none() && close.is_none() && volume.is_none()
        {
            continue;
        }

        if auto_adjust {
            let adj = adj_closes.as_ref().and_then(|v| v.get(i).copied().flatten());
            if let (Some(adj), Some(c)) = (adj, close) {
                if c != 0.0 {
                    let ratio = adj / c;
                    open = open.map(|v| v * ratio);
                    high = high.map(|v| v * ratio);
                    low = low.map(|v| v * ratio);
                    close = Some(adj);
                }
            }
        }

        index.push(ts);
        opens.push(open);
        highs.push(high);
        lows.push(low);
        closes.push(close);
        volumes.push(volume);
    }

    let index_col = if interval.is_intraday() {
        let millis: Vec<i64> = index.iter().map(|ts| ts * 1000).collect();
        Column::new("Datetime".into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
    } else {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
        let days = index
            .iter()
            .map(|ts| {
                DateTime::from_timestamp(ts + gmtoffset, 0)
                    .map(|dt| (dt.date_naive() - epoch).num_days() as i32)
                    .ok_or_else(|| {
                        ProviderError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                    })
            })
            .collect::<Result<Vec<i32>, _>>()?;
        Column::new("Date".into(), days).cast(&DataType::Date)?
    };

    Ok(DataFrame::new(vec![
        index_col,
        Column::new("Open".into(), opens),
        Column::new("High".into(), highs),
        Column::new("Low".into(), lows),
        Column::new("Close".into(), closes),
        Column::new("Volume".into(), volumes),
    ])?)
}

/// Parse a fundamentals-timeseries response into metric rows over periods,
/// newest period first, metrics in `keys` order.
fn parse_timeseries(
    ticker: &str,
    resp: TimeseriesResponse,
    frequency: Frequency,
    keys: &[&str],
) -> Result<RawStatement, ProviderError> {
    let results = match (resp.timeseries.result, resp.timeseries.error) {
        (Some(results), _) => results,
        (None, Some(err)) if err.code == "Not Found" => {
            return Err(ProviderError::SymbolNotFound {
                symbol: ticker.to_string(),
            })
        }
        (None, Some(err)) => {
            return Err(ProviderError::ResponseFormatChanged(format!(
                "{}: {}",
                err.code, err.description
            )))
        }
        (None, None) => return Ok(RawStatement::default()),
    };

    let prefix = frequency.as_str();
    let mut series: BTreeMap<String, BTreeMap<NaiveDate, f64>> = BTreeMap::new();

    for item in results {
        let Some(type_key) = item["meta"]["type"][0].as_str() else {
            continue;
        };
        let Some(points) = item.get(type_key) else {
            continue;
        };
        let points: Vec<Option<SeriesPoint>> = serde_json::from_value(points.clone())
            .map_err(|e| ProviderError::ResponseFormatChanged(format!("{type_key}: {e}")))?;

        let metric = type_key.strip_prefix(prefix).unwrap_or(type_key);
        let values = series.entry(metric.to_string()).or_default();
        for point in points.into_iter().flatten() {
            if let Some(raw) = point.reported_value.and_then(|v| v.raw) {
                values.insert(point.as_of_date, raw);
            }
        }
    }

    let mut periods: Vec<NaiveDate> = series
        .values()
        .flat_map(|values| values.keys().copied())
        .collect();
    periods.sort_unstable_by(|a, b| b.cmp(a));
    periods.dedup();

    let metrics = keys
        .iter()
        .filter_map(|key| {
            let values = series.get(*key).filter(|v| !v.is_empty())?;
            Some(MetricRow {
                name: prettify_metric(key),
                values: periods.iter().map(|p| values.get(p).copied()).collect(),
            })
        })
        .collect();

    Ok(RawStatement { periods, metrics })
}

/// `TotalAssets` -> `Total Assets`, `NetPPE` -> `Net PPE`, `EBITDA` stays.
pub fn prettify_metric(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 8);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower)
            {
                out.push(' ');
            }
        }
        out.push(c);
    }
    out
}

fn statement_keys(kind: StatementKind) -> &'static [&'static str] {
    match kind {
        StatementKind::BalanceSheet => BALANCE_SHEET_KEYS,
        StatementKind::IncomeStatement => INCOME_STATEMENT_KEYS,
        StatementKind::CashFlow => CASH_FLOW_KEYS,
    }
}

const INCOME_STATEMENT_KEYS: &[&str] = &[
    "TotalRevenue",
    "OperatingRevenue",
    "CostOfRevenue",
    "GrossProfit",
    "OperatingExpense",
    "SellingGeneralAndAdministration",
    "ResearchAndDevelopment",
    "OperatingIncome",
    "NetInterestIncome",
    "InterestIncome",
    "InterestExpense",
    "OtherIncomeExpense",
    "PretaxIncome",
    "TaxProvision",
    "NetIncome",
    "NetIncomeCommonStockholders",
    "BasicEPS",
    "DilutedEPS",
    "BasicAverageShares",
    "DilutedAverageShares",
    "TotalExpenses",
    "NormalizedIncome",
    "EBIT",
    "EBITDA",
    "NormalizedEBITDA",
    "ReconciledDepreciation",
];

const BALANCE_SHEET_KEYS: &[&str] = &[
    "TotalAssets",
    "CurrentAssets",
    "CashAndCashEquivalents",
    "CashCashEquivalentsAndShortTermInvestments",
    "Receivables",
    "AccountsReceivable",
    "Inventory",
    "TotalNonCurrentAssets",
    "NetPPE",
    "GrossPPE",
    "Goodwill",
    "GoodwillAndOtherIntangibleAssets",
    "TotalLiabilitiesNetMinorityInterest",
    "CurrentLiabilities",
    "AccountsPayable",
    "CurrentDebt",
    "LongTermDebt",
    "TotalDebt",
    "NetDebt",
    "StockholdersEquity",
    "TotalEquityGrossMinorityInterest",
    "RetainedEarnings",
    "CommonStock",
    "WorkingCapital",
    "InvestedCapital",
    "TangibleBookValue",
    "ShareIssued",
    "OrdinarySharesNumber",
    "TreasurySharesNumber",
];

const CASH_FLOW_KEYS: &[&str] = &[
    "OperatingCashFlow",
    "InvestingCashFlow",
    "FinancingCashFlow",
    "FreeCashFlow",
    "CapitalExpenditure",
    "BeginningCashPosition",
    "EndCashPosition",
    "ChangesInCash",
    "NetIncomeFromContinuingOperations",
    "DepreciationAndAmortization",
    "StockBasedCompensation",
    "ChangeInWorkingCapital",
    "NetBusinessPurchaseAndSale",
    "NetInvestmentPurchaseAndSale",
    "RepurchaseOfCapitalStock",
    "CashDividendsPaid",
    "IssuanceOfDebt",
    "RepaymentOfDebt",
    "IncomeTaxPaidSupplementalData",
    "InterestPaidSupplementalData",
];
