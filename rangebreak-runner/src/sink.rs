//! Record sinks — trade tapes and validation history as JSONL.
//!
//! - [`TradeSink::replace`] overwrites a strategy's trade tape atomically:
//!   the file is written to a temp path and renamed into place.
//! - [`ValidationResultSink::append`] adds one line per (strategy, stage,
//!   run) to an append-only history. Each line is an independent JSON object.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

use rangebreak_core::domain::{SimulatedTrade, StrategyId};

use crate::validator::ValidationResult;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{path}:{line}: malformed record: {message}")]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("in-memory sink lock poisoned")]
    Poisoned,
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> SinkError + '_ {
    move |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub trait TradeSink: Send + Sync {
    /// Replace every stored trade of `strategy_id` with `trades`.
    fn replace(&self, strategy_id: &StrategyId, trades: &[SimulatedTrade]) -> Result<(), SinkError>;
}

pub trait ValidationResultSink: Send + Sync {
    fn append(&self, result: &ValidationResult) -> Result<(), SinkError>;
}

// ─── JSONL files ─────────────────────────────────────────────────────

/// One `{strategy_id}.trades.jsonl` file per strategy under `root`.
#[derive(Debug, Clone)]
pub struct JsonlTradeSink {
    root: PathBuf,
}

impl JsonlTradeSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, strategy_id: &StrategyId) -> PathBuf {
        self.root.join(format!("{}.trades.jsonl", strategy_id.as_str()))
    }

    pub fn read(&self, strategy_id: &StrategyId) -> Result<Vec<SimulatedTrade>, SinkError> {
        read_jsonl(&self.path_for(strategy_id))
    }
}

impl TradeSink for JsonlTradeSink {
    fn replace(
        &self,
        strategy_id: &StrategyId,
        trades: &[SimulatedTrade],
    ) -> Result<(), SinkError> {
        fs::create_dir_all(&self.root).map_err(io_err(&self.root))?;
        let path = self.path_for(strategy_id);
        let tmp_path = path.with_extension("jsonl.tmp");
        {
            let file = fs::File::create(&tmp_path).map_err(io_err(&tmp_path))?;
            let mut writer = BufWriter::new(file);
            for trade in trades {
                serde_json::to_writer(&mut writer, trade)?;
                writer.write_all(b"\n").map_err(io_err(&tmp_path))?;
            }
            writer.flush().map_err(io_err(&tmp_path))?;
        }
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            io_err(&path)(e)
        })?;
        debug!(
            strategy = %strategy_id,
            trades = trades.len(),
            path = %path.display(),
            "replaced trade tape"
        );
        Ok(())
    }
}

/// Append-only validation history file.
#[derive(Debug, Clone)]
pub struct JsonlValidationLog {
    path: PathBuf,
}

impl JsonlValidationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every recorded result, oldest first. A missing file is empty history.
    pub fn read_all(&self) -> Result<Vec<ValidationResult>, SinkError> {
        read_jsonl(&self.path)
    }
}

impl ValidationResultSink for JsonlValidationLog {
    fn append(&self, result: &ValidationResult) -> Result<(), SinkError> {
        let json = serde_json::to_string(result)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err(&self.path))?;
        writeln!(file, "{json}").map_err(io_err(&self.path))?;
        file.flush().map_err(io_err(&self.path))
    }
}

fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, SinkError> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(path)(e)),
    };
    let mut records = Vec::new();
    for (i, line) in io::BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err(path))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| SinkError::Malformed {
            path: path.to_path_buf(),
            line: i + 1,
            message: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

// ─── In-memory ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryTradeSink {
    tapes: Mutex<BTreeMap<StrategyId, Vec<SimulatedTrade>>>,
}

impl MemoryTradeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, strategy_id: &StrategyId) -> Option<Vec<SimulatedTrade>> {
        self.tapes.lock().ok()?.get(strategy_id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tapes.lock().map(|t| t.is_empty()).unwrap_or(true)
    }
}

impl TradeSink for MemoryTradeSink {
    fn replace(
        &self,
        strategy_id: &StrategyId,
        trades: &[SimulatedTrade],
    ) -> Result<(), SinkError> {
        self.tapes
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .insert(strategy_id.clone(), trades.to_vec());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryValidationLog {
    results: Mutex<Vec<ValidationResult>>,
}

impl MemoryValidationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<ValidationResult> {
        self.results.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ValidationResultSink for MemoryValidationLog {
    fn append(&self, result: &ValidationResult) -> Result<(), SinkError> {
        self.results
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .push(result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::tests::trade;
    use rangebreak_core::domain::Outcome;

    #[test]
    fn replace_overwrites_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlTradeSink::new(dir.path());
        let id = StrategyId::new("t");

        let first: Vec<_> = (0..5).map(|d| trade(d, Outcome::Win, 1.0)).collect();
        sink.replace(&id, &first).unwrap();
        assert_eq!(sink.read(&id).unwrap(), first);

        let second = vec![trade(9, Outcome::Loss, 0.0)];
        sink.replace(&id, &second).unwrap();
        assert_eq!(sink.read(&id).unwrap(), second);

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["t.trades.jsonl".to_string()]);
    }

    #[test]
    fn missing_tape_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlTradeSink::new(dir.path().join("nested"));
        assert!(sink.read(&StrategyId::new("none")).unwrap().is_empty());
    }

    #[test]
    fn malformed_line_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        fs::write(&path, "\n{not json}\n").unwrap();
        let err = JsonlValidationLog::new(&path).read_all().unwrap_err();
        assert!(matches!(err, SinkError::Malformed { line: 2, .. }));
    }

    #[test]
    fn memory_sink_replaces() {
        let sink = MemoryTradeSink::new();
        assert!(sink.is_empty());
        let id = StrategyId::new("m");
        sink.replace(&id, &[trade(0, Outcome::Win, 1.0)]).unwrap();
        sink.replace(&id, &[]).unwrap();
        assert_eq!(sink.get(&id), Some(Vec::new()));
    }
}
