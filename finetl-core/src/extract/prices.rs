//! Price-series normalization into the canonical OHLCV table.

use crate::data::PriceResponse;
use crate::error::ExtractionError;
use crate::model::{TableKind, OHLCV_COLUMNS};
use polars::prelude::*;
use tracing::{debug, warn};

const PRICE_COLUMNS: [&str; 4] = ["open", "high", "low", "close"];

/// Reshape a provider price response into `ticker, date, open, high, low, close, volume`.
///
/// An empty response yields an empty frame.
pub fn normalize_prices(
    tickers: &[String],
    response: PriceResponse,
) -> Result<DataFrame, ExtractionError> {
    normalize(tickers, response).map_err(|source| ExtractionError::Reshape {
        table: TableKind::Ohlcv,
        source,
    })
}

fn normalize(tickers: &[String], response: PriceResponse) -> PolarsResult<DataFrame> {
    if response.is_empty() {
        warn!("provider returned no price rows");
        return Ok(DataFrame::empty());
    }

    let frames: Vec<LazyFrame> = match response {
        PriceResponse::Empty => Vec::new(),
        PriceResponse::Single(df) => match tickers.first() {
            Some(ticker) => vec![with_ticker(df, ticker)?],
            None => Vec::new(),
        },
        PriceResponse::ByTicker(mut frames) => {
            let mut ordered = Vec::with_capacity(frames.len());
            for ticker in tickers {
                match frames.iter().position(|(t, _)| t == ticker) {
                    Some(pos) => {
                        let (_, df) = frames.swap_remove(pos);
                        ordered.push(with_ticker(df, ticker)?);
                    }
                    None => debug!(ticker = %ticker, "no price frame returned"),
                }
            }
            ordered
        }
    };

    if frames.is_empty() {
        warn!("no OHLCV data returned for any ticker");
        return Ok(DataFrame::empty());
    }

    let df = concat_lf_diagonal(frames, UnionArgs::default())?.collect()?;
    debug!(rows = df.height(), "normalized OHLCV");
    Ok(df)
}

/// Normalize one provider frame and attach its ticker.
fn with_ticker(mut df: DataFrame, ticker: &str) -> PolarsResult<LazyFrame> {
    let lowered: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_lowercase())
        .collect();
    df.set_column_names(lowered.iter().map(String::as_str))?;

    if df.column("date").is_err() {
        let index = ["datetime", "index"]
            .into_iter()
            .find(|name| df.column(name).is_ok());
        if let Some(index) = index {
            df.rename(index, "date".into())?;
        }
    }

    let mut casts = vec![lit(ticker.to_string()).alias("ticker")];
    for name in PRICE_COLUMNS {
        if df.column(name).is_ok() {
            casts.push(col(name).cast(DataType::Float64));
        }
    }
    if df.column("volume").is_ok() {
        casts.push(col("volume").cast(DataType::Int64));
    }

    let present: Vec<Expr> = OHLCV_COLUMNS
        .iter()
        .filter(|name| **name == "ticker" || df.column(name).is_ok())
        .map(|name| col(*name))
        .collect();

    Ok(df.lazy().with_columns(casts).select(present))
}
