//! Financial statement extraction into the canonical financials table.

use crate::config::{FinancialsSpec, StatementKind};
use crate::data::{MarketDataProvider, RawStatement};
use crate::error::ExtractionError;
use crate::model::TableKind;
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Fetch, merge and stack the configured statements of every ticker.
///
/// Returns the financials table (if any ticker had data) and the tickers
/// that were dropped because none of their statements produced data. A
/// statement that fails to fetch or reshape is skipped; a ticker whose
/// statements fail to merge is dropped like a ticker without data.
pub(crate) fn extract_financials<P: MarketDataProvider>(
    provider: &P,
    tickers: &[String],
    spec: &FinancialsSpec,
) -> Result<(Option<DataFrame>, Vec<String>), ExtractionError> {
    let mut per_ticker = Vec::with_capacity(tickers.len());
    let mut skipped = Vec::new();

    for ticker in tickers {
        match ticker_financials(provider, ticker, spec) {
            Ok(Some(df)) => per_ticker.push(
                df.lazy()
                    .with_column(lit(ticker.to_string()).alias("ticker")),
            ),
            Ok(None) => {
                warn!(ticker = %ticker, "no financial data, ticker skipped");
                skipped.push(ticker.clone());
            }
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "statements could not be merged, ticker skipped");
                skipped.push(ticker.clone());
            }
        }
    }

    if per_ticker.is_empty() {
        warn!("no financial data returned for any ticker");
        return Ok((None, skipped));
    }

    let stacked = concat_lf_diagonal(per_ticker, UnionArgs::default())
        .and_then(LazyFrame::collect)
        .and_then(order_columns)
        .map_err(|source| ExtractionError::Reshape {
            table: TableKind::Financials,
            source,
        })?;
    debug!(rows = stacked.height(), columns = stacked.width(), "stacked financials");
    Ok((Some(stacked), skipped))
}

/// The merged statements of one ticker, `None` when no statement had data.
fn ticker_financials<P: MarketDataProvider>(
    provider: &P,
    ticker: &str,
    spec: &FinancialsSpec,
) -> PolarsResult<Option<DataFrame>> {
    let mut parts = Vec::with_capacity(spec.statements.len());
    for &kind in &spec.statements {
        match provider.statement(ticker, kind, spec.frequency) {
            Ok(Some(raw)) if !raw.is_empty() => match transpose_statement(&raw) {
                Ok(df) => parts.push((kind, df)),
                Err(e) => {
                    warn!(ticker = %ticker, statement = %kind, error = %e, "malformed statement, skipping")
                }
            },
            Ok(_) => debug!(ticker = %ticker, statement = %kind, "no statement data"),
            Err(e) => {
                warn!(ticker = %ticker, statement = %kind, error = %e, "statement fetch failed, skipping")
            }
        }
    }
    merge_statements(parts)
}

/// Turn metric rows over period columns into period rows over metric columns.
///
/// A metric name repeated within one statement keeps its first row.
pub fn transpose_statement(raw: &RawStatement) -> PolarsResult<DataFrame> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let days: Vec<i32> = raw
        .periods
        .iter()
        .map(|p| (*p - epoch).num_days() as i32)
        .collect();

    let mut columns = Vec::with_capacity(raw.metrics.len() + 1);
    columns.push(Column::new("period".into(), days).cast(&DataType::Date)?);

    let mut seen = HashSet::new();
    for metric in &raw.metrics {
        if metric.name == "period" || !seen.insert(metric.name.as_str()) {
            continue;
        }
        let mut values = metric.values.clone();
        values.resize(raw.periods.len(), None);
        columns.push(Column::new(metric.name.as_str().into(), values));
    }

    DataFrame::new(columns)
}

/// Full outer join of one ticker's transposed statements on `period`,
/// sorted by period ascending. Colliding metric names from a later
/// statement get a `_<statement_kind>` suffix.
pub fn merge_statements(parts: Vec<(StatementKind, DataFrame)>) -> PolarsResult<Option<DataFrame>> {
    let mut parts = parts.into_iter().filter(|(_, df)| df.height() > 0);
    let Some((_, first)) = parts.next() else {
        return Ok(None);
    };

    let merged = parts.fold(first.lazy(), |acc, (kind, df)| {
        acc.join(
            df.lazy(),
            [col("period")],
            [col("period")],
            JoinArgs::new(JoinType::Full)
                .with_coalesce(JoinCoalesce::CoalesceColumns)
                .with_suffix(Some(format!("_{}", kind.as_str()).into())),
        )
    });

    let df = merged
        .sort(["period"], SortMultipleOptions::default())
        .collect()?;
    Ok(Some(df))
}

/// `ticker, period`, then metric columns in first-seen order.
fn order_columns(df: DataFrame) -> PolarsResult<DataFrame> {
    let mut order: Vec<PlSmallStr> = vec!["ticker".into(), "period".into()];
    order.extend(
        df.get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != "ticker" && name.as_str() != "period")
            .cloned(),
    );
    df.select(order)
}
