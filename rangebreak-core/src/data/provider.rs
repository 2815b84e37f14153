//! Bar source trait and structured error types.
//!
//! The BarSource trait abstracts over where bars live (in-memory fixtures,
//! CSV exports, the Parquet store) so the runner can swap implementations
//! and tests can count reads.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::PriceBar;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no bars for instrument '{instrument}' in [{start}, {end})")]
    NoData {
        instrument: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {message}")]
    Csv { path: PathBuf, message: String },

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

impl DataError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DataError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Read-only, timestamp-ordered source of bars for one instrument.
///
/// Implementations must return canonical bars (see
/// [`canonicalize`](super::canonicalize::canonicalize)) restricted to the
/// half-open range `[start, end)`. Gaps are left as gaps.
pub trait BarSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    fn load(
        &self,
        instrument: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>, DataError>;
}

/// Keep bars with `start <= timestamp < end`.
pub(crate) fn clip(bars: Vec<PriceBar>, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<PriceBar> {
    bars.into_iter()
        .filter(|b| b.timestamp >= start && b.timestamp < end)
        .collect()
}
