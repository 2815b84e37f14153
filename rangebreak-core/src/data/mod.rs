//! Bar sources: trait, canonicalization, and storage backends.

pub mod canonicalize;
pub mod csv_source;
pub mod memory;
pub mod parquet;
pub mod provider;
pub mod synthetic;

pub use canonicalize::{canonicalize, CanonicalReport};
pub use csv_source::{read_csv_bars, write_csv_bars, CsvBarSource};
pub use memory::InMemoryBarSource;
pub use parquet::ParquetBarStore;
pub use provider::{BarSource, DataError};
pub use synthetic::{random_walk, scripted_day, weekdays, RandomWalkConfig, ScriptedOutcome};
