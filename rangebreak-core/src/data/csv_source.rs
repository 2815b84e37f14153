//! CSV bar files: `{root}/{INSTRUMENT}.csv` with columns
//! `timestamp,open,high,low,close` (RFC 3339 UTC timestamps).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::canonicalize::canonicalize_logged;
use super::provider::{clip, BarSource, DataError};
use crate::domain::PriceBar;

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

impl From<CsvRow> for PriceBar {
    fn from(row: CsvRow) -> Self {
        PriceBar::new(row.timestamp, row.open, row.high, row.low, row.close)
    }
}

impl From<&PriceBar> for CsvRow {
    fn from(bar: &PriceBar) -> Self {
        CsvRow {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
        }
    }
}

/// Read every row of a bar CSV file. Not canonicalized.
pub fn read_csv_bars(path: &Path) -> Result<Vec<PriceBar>, DataError> {
    let csv_err = |e: csv::Error| DataError::Csv {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    reader
        .deserialize::<CsvRow>()
        .map(|row| row.map(PriceBar::from).map_err(csv_err))
        .collect()
}

/// Write bars to a CSV file, replacing it atomically.
pub fn write_csv_bars(path: &Path, bars: &[PriceBar]) -> Result<(), DataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
    }
    let tmp_path = path.with_extension("csv.tmp");
    let csv_err = |e: csv::Error| DataError::Csv {
        path: tmp_path.clone(),
        message: e.to_string(),
    };
    {
        let mut writer = csv::Writer::from_path(&tmp_path).map_err(csv_err)?;
        for bar in bars {
            writer.serialize(CsvRow::from(bar)).map_err(csv_err)?;
        }
        writer.flush().map_err(|e| DataError::io(&tmp_path, e))?;
    }
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::io(path, e)
    })
}

/// Directory of per-instrument CSV files.
#[derive(Debug, Clone)]
pub struct CsvBarSource {
    root: PathBuf,
}

impl CsvBarSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, instrument: &str) -> PathBuf {
        self.root.join(format!("{instrument}.csv"))
    }
}

impl BarSource for CsvBarSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn load(
        &self,
        instrument: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>, DataError> {
        let path = self.path_for(instrument);
        if !path.exists() {
            return Err(DataError::NoData {
                instrument: instrument.to_string(),
                start,
                end,
            });
        }
        let bars = canonicalize_logged("csv", instrument, read_csv_bars(&path)?);
        let bars = clip(bars, start, end);
        if bars.is_empty() {
            return Err(DataError::NoData {
                instrument: instrument.to_string(),
                start,
                end,
            });
        }
        Ok(bars)
    }
}
