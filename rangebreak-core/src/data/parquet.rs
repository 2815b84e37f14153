//! Parquet bar store with Hive-style partitioning.
//!
//! Layout: `{root}/instrument={INSTRUMENT}/{year}.parquet`
//!
//! Columns: `timestamp_ms` (i64, UTC epoch millis), `open`, `high`, `low`,
//! `close` (f64). Partition writes are atomic: write to `.tmp`, rename into
//! place. Writing a year replaces that year's partition.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use polars::prelude::*;
use tracing::debug;

use super::canonicalize::canonicalize_logged;
use super::provider::{clip, BarSource, DataError};
use crate::domain::PriceBar;

const COLUMNS: [&str; 5] = ["timestamp_ms", "open", "high", "low", "close"];

#[derive(Debug, Clone)]
pub struct ParquetBarStore {
    root: PathBuf,
}

impl ParquetBarStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn instrument_dir(&self, instrument: &str) -> PathBuf {
        self.root.join(format!("instrument={instrument}"))
    }

    fn year_path(&self, instrument: &str, year: i32) -> PathBuf {
        self.instrument_dir(instrument).join(format!("{year}.parquet"))
    }

    /// Write bars grouped by UTC year. Returns the number of partitions written.
    pub fn write(&self, instrument: &str, bars: &[PriceBar]) -> Result<usize, DataError> {
        if bars.is_empty() {
            return Err(DataError::ValidationError("no bars to store".into()));
        }
        let dir = self.instrument_dir(instrument);
        fs::create_dir_all(&dir).map_err(|e| DataError::io(&dir, e))?;

        let mut by_year: BTreeMap<i32, Vec<&PriceBar>> = BTreeMap::new();
        for bar in bars {
            by_year.entry(bar.timestamp.year()).or_default().push(bar);
        }

        for (year, year_bars) in &by_year {
            let mut df = bars_to_dataframe(year_bars)?;
            let path = self.year_path(instrument, *year);
            let tmp_path = path.with_extension("parquet.tmp");
            write_parquet(&mut df, &tmp_path)?;
            fs::rename(&tmp_path, &path).map_err(|e| {
                let _ = fs::remove_file(&tmp_path);
                DataError::io(&path, e)
            })?;
            debug!(instrument, year, rows = year_bars.len(), "wrote parquet partition");
        }
        Ok(by_year.len())
    }

    /// Years with a stored partition, ascending.
    pub fn years(&self, instrument: &str) -> Result<Vec<i32>, DataError> {
        let dir = self.instrument_dir(instrument);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut years = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| DataError::io(&dir, e))? {
            let path = entry.map_err(|e| DataError::io(&dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            if let Some(year) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i32>().ok())
            {
                years.push(year);
            }
        }
        years.sort_unstable();
        Ok(years)
    }
}

impl BarSource for ParquetBarStore {
    fn name(&self) -> &str {
        "parquet"
    }

    fn load(
        &self,
        instrument: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>, DataError> {
        let mut bars = Vec::new();
        for year in start.year()..=end.year() {
            let path = self.year_path(instrument, year);
            if path.exists() {
                bars.extend(read_parquet(&path)?);
            }
        }
        let bars = clip(canonicalize_logged("parquet", instrument, bars), start, end);
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

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn bars_to_dataframe(bars: &[&PriceBar]) -> Result<DataFrame, DataError> {
    let timestamps: Vec<i64> = bars.iter().map(|b| b.timestamp.timestamp_millis()).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    DataFrame::new(vec![
        Column::new("timestamp_ms".into(), timestamps),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let file = fs::File::create(path).map_err(|e| DataError::io(path, e))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| DataError::ParquetError(format!("write {}: {e}", path.display())))?;
    Ok(())
}

fn read_parquet(path: &Path) -> Result<Vec<PriceBar>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::io(path, e))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read {}: {e}", path.display())))?;

    for name in COLUMNS {
        if df.column(name).is_err() {
            return Err(DataError::ValidationError(format!(
                "{}: missing column '{name}'",
                path.display()
            )));
        }
    }
    dataframe_to_bars(&df)
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<PriceBar>, DataError> {
    let col_err = |e: PolarsError| DataError::ParquetError(format!("column read: {e}"));

    let ts_ca = df.column("timestamp_ms").map_err(col_err)?.i64().map_err(col_err)?;
    let open_ca = df.column("open").map_err(col_err)?.f64().map_err(col_err)?;
    let high_ca = df.column("high").map_err(col_err)?.f64().map_err(col_err)?;
    let low_ca = df.column("low").map_err(col_err)?.f64().map_err(col_err)?;
    let close_ca = df.column("close").map_err(col_err)?.f64().map_err(col_err)?;

    let n = df.height();
    let mut bars = Vec::with_capacity(n);
    for i in 0..n {
        let millis = ts_ca
            .get(i)
            .ok_or_else(|| DataError::ValidationError(format!("null timestamp at row {i}")))?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            DataError::ValidationError(format!("timestamp out of range at row {i}"))
        })?;
        // Nulls become NaN so the bar fails the sanity check downstream.
        bars.push(PriceBar::new(
            timestamp,
            open_ca.get(i).unwrap_or(f64::NAN),
            high_ca.get(i).unwrap_or(f64::NAN),
            low_ca.get(i).unwrap_or(f64::NAN),
            close_ca.get(i).unwrap_or(f64::NAN),
        ));
    }
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample_bars() -> Vec<PriceBar> {
        let dec = Utc.with_ymd_and_hms(2023, 12, 29, 14, 30, 0).unwrap();
        let jan = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        vec![
            PriceBar::new(dec, 4780.0, 4782.5, 4779.0, 4781.25),
            PriceBar::new(dec + Duration::minutes(1), 4781.25, 4783.0, 4780.5, 4782.0),
            PriceBar::new(jan, 4790.0, 4791.0, 4788.75, 4789.5),
        ]
    }

    #[test]
    fn write_partitions_by_year_and_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetBarStore::new(dir.path());
        assert_eq!(store.write("ES", &sample_bars()).unwrap(), 2);
        assert_eq!(store.years("ES").unwrap(), vec![2023, 2024]);

        let start = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let loaded = store.load("ES", start, end).unwrap();
        assert_eq!(loaded, sample_bars());
    }

    #[test]
    fn load_clips_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetBarStore::new(dir.path());
        store.write("ES", &sample_bars()).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let loaded = store.load("ES", start, start + Duration::days(5)).unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetBarStore::new(dir.path());
        store.write("ES", &sample_bars()).unwrap();
        let leftovers = fs::read_dir(dir.path().join("instrument=ES"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn missing_instrument_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetBarStore::new(dir.path());
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            store.load("NQ", start, start + Duration::days(1)),
            Err(DataError::NoData { .. })
        ));
    }
}
