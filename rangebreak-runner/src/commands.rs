//! Top-level operations: simulate one day, backtest a range, validate.
//!
//! Each command resolves the strategy against the run config before any bar
//! is read, so a bad spec never costs a data load. Sinks are written only
//! after the whole command succeeded; a cancelled run leaves them untouched.

use std::sync::atomic::AtomicBool;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use rangebreak_core::data::{BarSource, DataError};
use rangebreak_core::domain::{PriceBar, RunId, StrategyId};
use rangebreak_core::fingerprint::{dataset_hash, spec_fingerprint};
use rangebreak_core::rng::RngHierarchy;
use rangebreak_core::{simulate_day, TradingDay};

use crate::config::ResolvedConfig;
use crate::metrics::TradeStats;
use crate::registry::{resolve_strategy, ResolvedStrategy, SpecSource};
use crate::report::{BacktestReport, DayReport, ValidationReport};
use crate::runner::{
    build_pool, collect_trades, load_trading_days, simulate_days, DayCounts, RunContext, RunError,
    SimulationEvaluator,
};
use crate::sink::{TradeSink, ValidationResultSink};
use crate::validator::{NotEvaluatedKind, Stage, Verdict, WalkForwardValidator};

/// Everything a command reads from or writes to.
pub struct Services<'a> {
    pub config: &'a ResolvedConfig,
    pub specs: &'a dyn SpecSource,
    pub bars: &'a dyn BarSource,
    pub trades: Option<&'a dyn TradeSink>,
    pub history: Option<&'a dyn ValidationResultSink>,
    pub cancel: Option<&'a AtomicBool>,
}

impl<'a> Services<'a> {
    pub fn new(
        config: &'a ResolvedConfig,
        specs: &'a dyn SpecSource,
        bars: &'a dyn BarSource,
    ) -> Self {
        Self {
            config,
            specs,
            bars,
            trades: None,
            history: None,
            cancel: None,
        }
    }

    pub fn with_trade_sink(mut self, sink: &'a dyn TradeSink) -> Self {
        self.trades = Some(sink);
        self
    }

    pub fn with_history(mut self, sink: &'a dyn ValidationResultSink) -> Self {
        self.history = Some(sink);
        self
    }

    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn resolve(&self, strategy_id: &str) -> Result<ResolvedStrategy, RunError> {
        Ok(resolve_strategy(self.specs, strategy_id, self.config)?)
    }

    /// Simulate a single trading day. A day without bars is reported as an
    /// incomplete window.
    pub fn run_day(&self, strategy_id: &str, date: NaiveDate) -> Result<DayReport, RunError> {
        let strategy = self.resolve(strategy_id)?;
        let calendar = &self.config.calendar;
        let instrument = strategy.spec.instrument();
        let days = match load_trading_days(self.bars, calendar, instrument, date, date) {
            Ok(days) => days,
            Err(RunError::Data(DataError::NoData { .. })) => Vec::new(),
            Err(e) => return Err(e),
        };
        let day = days.into_iter().next().unwrap_or(TradingDay {
            date,
            bars: Vec::new(),
        });
        let outcome = simulate_day(
            &day,
            &strategy.window,
            calendar,
            &strategy.spec,
            &strategy.costs,
        );
        Ok(DayReport {
            strategy_id: strategy.spec.strategy_id().clone(),
            date,
            outcome,
        })
    }

    /// Simulate every trading day in `first..=last` and summarize.
    pub fn run_backtest(
        &self,
        strategy_id: &str,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<BacktestReport, RunError> {
        let strategy = self.resolve(strategy_id)?;
        let pool = build_pool(self.config.execution.workers)?;
        let ctx = RunContext::new(&pool, self.cancel);
        let calendar = &self.config.calendar;

        let days = load_trading_days(self.bars, calendar, strategy.spec.instrument(), first, last)?;
        let outcomes = simulate_days(&days, &strategy, calendar, &ctx)?;
        let trades = collect_trades(&outcomes);
        let aggregation = &self.config.aggregation;
        let stats = TradeStats::with_stress(
            &trades,
            aggregation.min_sample,
            &aggregation.stress_multipliers,
        );

        if let Some(sink) = self.trades {
            sink.replace(strategy.spec.strategy_id(), &trades)?;
        }
        info!(
            strategy = %strategy.spec.strategy_id(),
            days = days.len(),
            resolved = stats.sample_size,
            expected_r = ?stats.expected_r(),
            "backtest finished"
        );
        Ok(BacktestReport {
            strategy_id: strategy.spec.strategy_id().clone(),
            instrument: strategy.spec.instrument().to_string(),
            window_id: strategy.spec.window_id().clone(),
            first_day: first,
            last_day: last,
            spec_fingerprint: spec_fingerprint(&strategy.spec),
            dataset_hash: dataset_hash(&session_bars(&days)),
            days: DayCounts::from_outcomes(&outcomes),
            stats,
        })
    }

    /// Walk-forward validation of one strategy over `first..=last`.
    ///
    /// Configuration and data problems produce a `NOT_EVALUATED` report and
    /// append nothing. `Err` means the run was cancelled or a sink failed.
    pub fn run_validation(
        &self,
        strategy_id: &str,
        first: NaiveDate,
        last: NaiveDate,
        recorded_at: DateTime<Utc>,
    ) -> Result<ValidationReport, RunError> {
        let not_evaluated = |kind: NotEvaluatedKind, error: &RunError| ValidationReport {
            strategy_id: StrategyId::new(strategy_id),
            run_id: None,
            config_hash: self.config.config_hash.clone(),
            split: None,
            stages: Vec::new(),
            grid: Vec::new(),
            verdict: Verdict::NotEvaluated {
                stage: Stage::Concept,
                kind,
                reason: error.to_string(),
            },
        };

        let strategy = match self.resolve(strategy_id) {
            Ok(s) => s,
            Err(e) => {
                warn!(strategy = strategy_id, error = %e, "strategy not evaluated");
                return Ok(not_evaluated(NotEvaluatedKind::Configuration, &e));
            }
        };
        let pool = match build_pool(self.config.execution.workers) {
            Ok(pool) => pool,
            Err(e) => return Ok(not_evaluated(NotEvaluatedKind::Configuration, &e)),
        };
        let calendar = &self.config.calendar;
        let instrument = strategy.spec.instrument();
        let days = match load_trading_days(self.bars, calendar, instrument, first, last) {
            Ok(days) => days,
            Err(RunError::Cancelled) => return Err(RunError::Cancelled),
            Err(e) => {
                warn!(strategy = strategy_id, error = %e, "strategy not evaluated");
                return Ok(not_evaluated(NotEvaluatedKind::of(&e), &e));
            }
        };

        let fingerprint = spec_fingerprint(&strategy.spec);
        let seed =
            RngHierarchy::for_strategy(strategy.spec.strategy_id(), &fingerprint).master_seed();
        let run_id = RunId::new(fingerprint, dataset_hash(&session_bars(&days)), seed).hash();

        let evaluator = SimulationEvaluator {
            config: self.config,
            strategy: &strategy,
            ctx: RunContext::new(&pool, self.cancel),
        };
        let ctx = RunContext::new(&pool, self.cancel);
        let validator = WalkForwardValidator::new(self.config, &evaluator, &ctx);
        let outcome = validator.run(&strategy.spec, &days, &run_id, recorded_at)?;

        if let Some(history) = self.history {
            for result in &outcome.results {
                history.append(result)?;
            }
        }
        Ok(ValidationReport {
            strategy_id: strategy.spec.strategy_id().clone(),
            run_id: Some(run_id),
            config_hash: self.config.config_hash.clone(),
            split: outcome.split,
            stages: outcome.results,
            grid: outcome.grid,
            verdict: outcome.verdict,
        })
    }
}

/// In-session bars of `days`, in order; the input to the dataset hash.
fn session_bars(days: &[TradingDay]) -> Vec<PriceBar> {
    days.iter().flat_map(|d| d.bars.iter().copied()).collect()
}
