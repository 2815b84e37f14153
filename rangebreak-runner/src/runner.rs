//! Day runner — loads bars, splits trading days, simulates them in parallel.
//!
//! Days are independent, so they are fanned out over a Rayon pool of
//! `execution.workers` threads. Results are collected in input order, which
//! makes the output identical for every worker count. Cancellation is
//! cooperative: a shared flag is checked before each day.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use rangebreak_core::data::{BarSource, DataError};
use rangebreak_core::domain::{SimulatedTrade, SpecError, StrategySpec};
use rangebreak_core::{simulate_day, split_by_trading_day, DayOutcome, SessionCalendar, TradingDay};

use crate::baseline::ControlBaseline;
use crate::config::{ConfigError, ResolvedConfig};
use crate::metrics::TradeStats;
use crate::registry::ResolvedStrategy;
use crate::sink::SinkError;
use crate::validator::{StageEvaluation, StageEvaluator};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("configuration error: {0}")]
    Spec(#[from] SpecError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("run cancelled")]
    Cancelled,
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

impl RunError {
    /// Raised before any simulation, from the run file or the registry.
    pub fn is_configuration(&self) -> bool {
        matches!(self, RunError::Config(_) | RunError::Spec(_) | RunError::Pool(_))
    }
}

// ─── Context ─────────────────────────────────────────────────────────

/// Worker pool and cancellation flag shared by every stage of a run.
pub struct RunContext<'a> {
    pub pool: &'a ThreadPool,
    pub cancel: Option<&'a AtomicBool>,
}

impl<'a> RunContext<'a> {
    pub fn new(pool: &'a ThreadPool, cancel: Option<&'a AtomicBool>) -> Self {
        Self { pool, cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|f| f.load(Ordering::Relaxed))
    }

    pub fn check_cancelled(&self) -> Result<(), RunError> {
        if self.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub fn build_pool(workers: usize) -> Result<ThreadPool, RunError> {
    Ok(rayon::ThreadPoolBuilder::new().num_threads(workers).build()?)
}

// ─── Loading ─────────────────────────────────────────────────────────

/// Load `instrument` and return its trading days `first..=last`.
pub fn load_trading_days(
    source: &dyn BarSource,
    calendar: &SessionCalendar,
    instrument: &str,
    first: NaiveDate,
    last: NaiveDate,
) -> Result<Vec<TradingDay>, RunError> {
    let (start, end) = calendar.utc_bounds(first, last);
    let bars = source.load(instrument, start, end)?;
    let days: Vec<TradingDay> = split_by_trading_day(&bars, calendar)
        .into_iter()
        .filter(|d| d.date >= first && d.date <= last)
        .collect();
    info!(
        source = source.name(),
        instrument,
        %first,
        %last,
        bars = bars.len(),
        days = days.len(),
        "loaded trading days"
    );
    Ok(days)
}

// ─── Simulation ──────────────────────────────────────────────────────

/// Simulate every day for one strategy. Output order matches `days`.
pub fn simulate_days(
    days: &[TradingDay],
    strategy: &ResolvedStrategy,
    calendar: &SessionCalendar,
    ctx: &RunContext<'_>,
) -> Result<Vec<DayOutcome>, RunError> {
    let outcomes = ctx.pool.install(|| {
        days.par_iter()
            .map(|day| {
                ctx.check_cancelled()?;
                Ok(simulate_day(
                    day,
                    &strategy.window,
                    calendar,
                    &strategy.spec,
                    &strategy.costs,
                ))
            })
            .collect::<Result<Vec<_>, RunError>>()
    })?;
    ctx.check_cancelled()?;
    debug!(
        strategy = %strategy.spec.strategy_id(),
        days = outcomes.len(),
        "simulated days"
    );
    Ok(outcomes)
}

/// Trades of the traded days, in day order.
pub fn collect_trades(outcomes: &[DayOutcome]) -> Vec<SimulatedTrade> {
    outcomes.iter().filter_map(DayOutcome::trade).cloned().collect()
}

/// Per-day tallies outside the trade statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCounts {
    pub trading_days: usize,
    pub incomplete: usize,
    pub no_signal: usize,
    /// Zero-size ranges; also counted in `no_signal`.
    pub unbreakable: usize,
    pub traded: usize,
}

impl DayCounts {
    pub fn from_outcomes(outcomes: &[DayOutcome]) -> Self {
        let mut counts = Self {
            trading_days: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                DayOutcome::Incomplete { .. } => counts.incomplete += 1,
                DayOutcome::NoSignal { unbreakable, .. } => {
                    counts.no_signal += 1;
                    if *unbreakable {
                        counts.unbreakable += 1;
                    }
                }
                DayOutcome::Traded { .. } => counts.traded += 1,
            }
        }
        counts
    }
}

// ─── Stage evaluation by simulation ──────────────────────────────────

/// Evaluates a spec by simulating it and its control baseline over a slice.
pub struct SimulationEvaluator<'a> {
    pub config: &'a ResolvedConfig,
    pub strategy: &'a ResolvedStrategy,
    pub ctx: RunContext<'a>,
}

impl StageEvaluator for SimulationEvaluator<'_> {
    fn evaluate(
        &self,
        spec: &StrategySpec,
        days: &[TradingDay],
    ) -> Result<StageEvaluation, RunError> {
        let strategy = self.strategy.with_spec(spec.clone());
        let outcomes = simulate_days(days, &strategy, &self.config.calendar, &self.ctx)?;
        let trades = collect_trades(&outcomes);
        let aggregation = &self.config.aggregation;
        let stats = TradeStats::with_stress(
            &trades,
            aggregation.min_sample,
            &aggregation.stress_multipliers,
        );
        let baseline = ControlBaseline::generate(
            days,
            &strategy,
            &self.config.calendar,
            &self.config.baseline,
            aggregation.min_sample,
            &self.ctx,
        )?;
        Ok(StageEvaluation {
            stats,
            baseline: baseline.reference,
        })
    }
}
