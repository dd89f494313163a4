//! Canonical extraction result handed from the extractor to a loader.

use polars::prelude::*;
use std::fmt;

/// Column order of the canonical OHLCV table.
pub const OHLCV_COLUMNS: [&str; 7] = ["ticker", "date", "open", "high", "low", "close", "volume"];

/// Which of the two canonical tables a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Ohlcv,
    Financials,
}

impl TableKind {
    /// Table name used for file stems, dataset splits and database tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Ohlcv => "ohlcv",
            TableKind::Financials => "financials",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one extraction run.
///
/// Tables are either absent or non-empty: [`ExtractedData::new`] drops empty
/// frames so loaders never see a zero-row table.
#[derive(Debug, Clone, Default)]
pub struct ExtractedData {
    pub ohlcv: Option<DataFrame>,
    pub financials: Option<DataFrame>,
    /// Tickers dropped from the financials table because none of their
    /// statements produced data.
    pub skipped_tickers: Vec<String>,
}

impl ExtractedData {
    pub fn new(ohlcv: Option<DataFrame>, financials: Option<DataFrame>) -> Self {
        Self {
            ohlcv: ohlcv.filter(has_rows),
            financials: financials.filter(has_rows),
            skipped_tickers: Vec::new(),
        }
    }

    pub fn with_skipped_tickers(mut self, skipped: Vec<String>) -> Self {
        self.skipped_tickers = skipped;
        self
    }

    /// True when neither table carries any rows. Gates the load phase.
    pub fn is_empty(&self) -> bool {
        self.table(TableKind::Ohlcv).is_none() && self.table(TableKind::Financials).is_none()
    }

    /// The given table, if present and non-empty.
    pub fn table(&self, kind: TableKind) -> Option<&DataFrame> {
        let df = match kind {
            TableKind::Ohlcv => self.ohlcv.as_ref(),
            TableKind::Financials => self.financials.as_ref(),
        };
        df.filter(|df| has_rows(df))
    }

    /// Present tables in write order: OHLCV first, then financials.
    pub fn tables(&self) -> impl Iterator<Item = (TableKind, &DataFrame)> {
        [TableKind::Ohlcv, TableKind::Financials]
            .into_iter()
            .filter_map(|kind| self.table(kind).map(|df| (kind, df)))
    }

    pub fn row_count(&self, kind: TableKind) -> usize {
        self.table(kind).map_or(0, |df| df.height())
    }
}

fn has_rows(df: &DataFrame) -> bool {
    df.height() > 0 && df.width() > 0
}
