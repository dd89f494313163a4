//! Local file loader writing one CSV or Parquet file per table.

use super::Loader;
use crate::error::LoadingError;
use crate::model::{ExtractedData, TableKind};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// On-disk format of a [`FileLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Parquet,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Parquet => "parquet",
        }
    }
}

/// Writes `ohlcv.<ext>` and `financials.<ext>` into a directory.
#[derive(Debug, Clone)]
pub struct FileLoader {
    dir: PathBuf,
    format: FileFormat,
}

impl FileLoader {
    pub fn new(dir: impl Into<PathBuf>, format: FileFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn csv(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, FileFormat::Csv)
    }

    pub fn parquet(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, FileFormat::Parquet)
    }

    /// Path a table is written to.
    pub fn table_path(&self, table: TableKind) -> PathBuf {
        self.dir
            .join(format!("{}.{}", table.as_str(), self.format.extension()))
    }

    fn write_table(&self, table: TableKind, df: &DataFrame) -> Result<(), LoadingError> {
        let path = self.table_path(table);
        write_frame(df, &path, self.format).map_err(|source| LoadingError::WriteFile {
            table,
            path: path.clone(),
            source,
        })?;
        info!(table = %table, rows = df.height(), path = %path.display(), "wrote table");
        Ok(())
    }
}

impl Loader for FileLoader {
    fn destination(&self) -> &str {
        self.format.extension()
    }

    fn load(&self, data: &ExtractedData) -> Result<(), LoadingError> {
        if data.is_empty() {
            debug!(dir = %self.dir.display(), "nothing to write");
            return Ok(());
        }

        fs::create_dir_all(&self.dir).map_err(|source| LoadingError::CreateDirectory {
            path: self.dir.clone(),
            source,
        })?;

        for (table, df) in data.tables() {
            self.write_table(table, df)?;
        }
        Ok(())
    }
}

fn write_frame(df: &DataFrame, path: &Path, format: FileFormat) -> PolarsResult<()> {
    let mut file = fs::File::create(path)?;
    let mut df = df.clone();
    match format {
        FileFormat::Csv => CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df),
        FileFormat::Parquet => ParquetWriter::new(&mut file).finish(&mut df).map(|_| ()),
    }
}
