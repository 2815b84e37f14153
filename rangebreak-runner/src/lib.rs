//! RangeBreak Runner — day runner, aggregation and walk-forward validation.
//!
//! This crate builds on `rangebreak-core` to provide:
//! - Run configuration (TOML) and the strategy registry
//! - Parallel day runner with cooperative cancellation
//! - Trade aggregation with sample-size gating and cost stress
//! - Random-entry control baseline
//! - Calendar split, parameter grid and the promotion state machine
//! - JSONL trade tapes and validation history
//! - JSON, markdown and CSV reports

pub mod baseline;
pub mod commands;
pub mod config;
pub mod grid;
pub mod metrics;
pub mod registry;
pub mod report;
pub mod runner;
pub mod sink;
pub mod validator;
pub mod walk_forward;

pub use baseline::{BaselineReference, BaselineSource, ControlBaseline};
pub use commands::Services;
pub use config::{ConfigError, ResolvedConfig, RunConfig};
pub use grid::{GridEvaluation, GridPoint};
pub use metrics::{Expectancy, TradeStats, TradeTally};
pub use registry::{
    resolve_strategy, InMemoryRegistry, RegistryError, ResolvedStrategy, SpecSource, TomlRegistry,
};
pub use report::{BacktestReport, DayReport, ReportError, ValidationReport};
pub use runner::{
    build_pool, load_trading_days, simulate_days, DayCounts, RunContext, RunError,
    SimulationEvaluator,
};
pub use sink::{
    JsonlTradeSink, JsonlValidationLog, MemoryTradeSink, MemoryValidationLog, SinkError, TradeSink,
    ValidationResultSink,
};
pub use validator::{
    GateFailure, NotEvaluatedKind, Stage, StageEvaluation, StageEvaluator, ValidationOutcome,
    ValidationResult, Verdict, WalkForwardValidator,
};
pub use walk_forward::{CalendarSplit, SliceBounds, SplitError};
