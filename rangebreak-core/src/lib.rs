//! RangeBreak Core — opening-range breakout simulation engine.
//!
//! This crate contains the per-day engine and the types it works on:
//! - Domain types (bars, ranges, signals, strategy specs, trades)
//! - Exchange session calendar and window definitions
//! - Range builder and breakout signal detector
//! - Cost model, outcome classifier, and B-entry execution simulator
//! - Deterministic seeding and fingerprints
//! - Bar sources (in-memory, CSV, Parquet) and synthetic data

pub mod data;
pub mod domain;
pub mod engine;
pub mod execution;
pub mod fingerprint;
pub mod range_builder;
pub mod rng;
pub mod session;
pub mod signal_detector;

pub use engine::{simulate_day, DayOutcome};
pub use range_builder::{build_opening_range, DataGapError};
pub use session::{
    split_by_trading_day, SessionCalendar, SessionError, TradingDay, WindowDefinition,
};
pub use signal_detector::detect_breakout;
