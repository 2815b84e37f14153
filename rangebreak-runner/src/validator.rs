//! Walk-forward validator — the promotion state machine.
//!
//! ```text
//! CONCEPT_TEST ─pass─▶ PARAMETER_OPTIMIZATION ─pass─▶ OUT_OF_SAMPLE_VERIFICATION ─pass─▶ PROMOTE
//!      │ fail                  │ fail                         │ fail
//!      ▼                       ▼                              ▼
//!    REJECT                  REJECT                         REJECT
//! ```
//!
//! - **Concept test:** the registry spec, unchanged, on the validation slice.
//! - **Parameter optimization:** the grid on the train slice only.
//! - **Out-of-sample verification:** the selected config, unchanged, on the
//!   test slice.
//!
//! Every evaluated stage yields a [`ValidationResult`]. A stage that cannot be
//! evaluated ends the run with [`Verdict::NotEvaluated`], which never shares a
//! code with a failed gate.

use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rangebreak_core::domain::{StrategyId, StrategySpec};
use rangebreak_core::fingerprint::spec_fingerprint;
use rangebreak_core::TradingDay;

use crate::baseline::BaselineReference;
use crate::config::ResolvedConfig;
use crate::grid::{self, GridEvaluation, GridPoint};
use crate::metrics::TradeStats;
use crate::runner::{RunContext, RunError};
use crate::walk_forward::{CalendarSplit, SliceBounds};

// ─── Evaluation seam ─────────────────────────────────────────────────

/// Statistics of one spec over one slice, with its control baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct StageEvaluation {
    pub stats: TradeStats,
    pub baseline: BaselineReference,
}

/// Produces the numbers each gate looks at.
pub trait StageEvaluator: Sync {
    fn evaluate(
        &self,
        spec: &StrategySpec,
        days: &[TradingDay],
    ) -> Result<StageEvaluation, RunError>;
}

// ─── Records ─────────────────────────────────────────────────────────

/// Slice a [`ValidationResult`] was measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Concept test on the validation slice.
    Concept,
    /// Parameter optimization on the train slice.
    Train,
    /// Out-of-sample verification on the test slice.
    Test,
}

impl Stage {
    pub fn state_name(self) -> &'static str {
        match self {
            Stage::Concept => "CONCEPT_TEST",
            Stage::Train => "PARAMETER_OPTIMIZATION",
            Stage::Test => "OUT_OF_SAMPLE_VERIFICATION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateVerdict {
    Pass,
    Fail,
}

/// Why a gate failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateFailure {
    InsufficientSample { n: usize, min: usize },
    BelowThreshold { expected_r: f64, threshold: f64 },
    NonPositiveExpectancy { expected_r: f64 },
    NoQualifyingConfig { evaluated: usize },
    BaselineNotBeaten {
        win_rate: Option<f64>,
        expected_r: Option<f64>,
        baseline_win_rate: f64,
        baseline_expected_r: f64,
    },
    ExcessiveDegradation { degradation: f64, max: f64 },
    SuspectedLeakage { degradation: f64, floor: f64 },
}

/// Thresholds a stage was held to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub min_sample: usize,
    /// Inclusive lower bound on expected R.
    pub min_expected_r: Option<f64>,
    /// Expected R must be strictly positive.
    pub positive_expected_r: bool,
    pub max_degradation: Option<f64>,
    pub leakage_floor: Option<f64>,
    pub win_rate_margin: f64,
    pub expected_r_margin: f64,
}

/// One line of the append-only validation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub run_id: String,
    pub strategy_id: StrategyId,
    pub stage: Stage,
    pub slice: SliceBounds,
    pub sample_size: usize,
    pub open_count: usize,
    pub no_trade_count: usize,
    pub win_rate: Option<f64>,
    pub expected_r: Option<f64>,
    /// `100 × (train − test) / train`; test stage only.
    pub degradation_pct: Option<f64>,
    pub suspected_leakage: bool,
    pub baseline: BaselineReference,
    pub thresholds: Thresholds,
    pub verdict: GateVerdict,
    pub failures: Vec<GateFailure>,
    pub spec: StrategySpec,
    pub spec_fingerprint: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotEvaluatedKind {
    Configuration,
    Data,
    Cancelled,
}

impl NotEvaluatedKind {
    pub fn of(error: &RunError) -> Self {
        match error {
            RunError::Cancelled => NotEvaluatedKind::Cancelled,
            e if e.is_configuration() => NotEvaluatedKind::Configuration,
            _ => NotEvaluatedKind::Data,
        }
    }
}

/// Final outcome of a validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Promote {
        spec: StrategySpec,
    },
    Reject {
        stage: Stage,
        failures: Vec<GateFailure>,
    },
    NotEvaluated {
        stage: Stage,
        kind: NotEvaluatedKind,
        reason: String,
    },
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Promote { .. } => "PROMOTE",
            Verdict::Reject { .. } => "REJECT",
            Verdict::NotEvaluated { .. } => "NOT_EVALUATED",
        }
    }

    pub fn is_promote(&self) -> bool {
        matches!(self, Verdict::Promote { .. })
    }
}

/// Slice bounds of a walk-forward split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitBounds {
    pub train: SliceBounds,
    pub validation: SliceBounds,
    pub test: SliceBounds,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub verdict: Verdict,
    pub results: Vec<ValidationResult>,
    pub grid: Vec<GridEvaluation>,
    pub split: Option<SplitBounds>,
}

// ─── State machine ───────────────────────────────────────────────────

enum State {
    ConceptTest,
    ParameterOptimization,
    OutOfSampleVerification {
        selected: StrategySpec,
        train_expected_r: f64,
    },
    Done(Verdict),
}

/// Runs the three stages over a day series.
pub struct WalkForwardValidator<'a, E: StageEvaluator> {
    pub config: &'a ResolvedConfig,
    pub evaluator: &'a E,
    pub ctx: &'a RunContext<'a>,
}

struct Run<'r> {
    run_id: &'r str,
    base: &'r StrategySpec,
    recorded_at: DateTime<Utc>,
    results: Vec<ValidationResult>,
    grid: Vec<GridEvaluation>,
}

impl<'a, E: StageEvaluator> WalkForwardValidator<'a, E> {
    pub fn new(config: &'a ResolvedConfig, evaluator: &'a E, ctx: &'a RunContext<'a>) -> Self {
        Self {
            config,
            evaluator,
            ctx,
        }
    }

    /// Validate `base` over `days` (sorted, one per trading day).
    ///
    /// Returns `Err` only for cancellation; every other problem becomes a
    /// [`Verdict::NotEvaluated`].
    pub fn run(
        &self,
        base: &StrategySpec,
        days: &[TradingDay],
        run_id: &str,
        recorded_at: DateTime<Utc>,
    ) -> Result<ValidationOutcome, RunError> {
        let mut run = Run {
            run_id,
            base,
            recorded_at,
            results: Vec::new(),
            grid: Vec::new(),
        };

        let split = match CalendarSplit::new(days.len(), &self.config.walk_forward) {
            Ok(split) => split,
            Err(e) => {
                return Ok(ValidationOutcome {
                    verdict: Verdict::NotEvaluated {
                        stage: Stage::Concept,
                        kind: NotEvaluatedKind::Data,
                        reason: e.to_string(),
                    },
                    results: run.results,
                    grid: run.grid,
                    split: None,
                })
            }
        };
        let bounds = match (
            SliceBounds::of(split.train(days)),
            SliceBounds::of(split.validation(days)),
            SliceBounds::of(split.test(days)),
        ) {
            (Some(train), Some(validation), Some(test)) => Some(SplitBounds {
                train,
                validation,
                test,
            }),
            _ => None,
        };

        let mut state = State::ConceptTest;
        let verdict = loop {
            self.ctx.check_cancelled()?;
            state = match state {
                State::ConceptTest => self.concept_test(&mut run, split.validation(days))?,
                State::ParameterOptimization => self.optimize(&mut run, split.train(days))?,
                State::OutOfSampleVerification {
                    selected,
                    train_expected_r,
                } => self.out_of_sample(&mut run, &selected, train_expected_r, split.test(days))?,
                State::Done(verdict) => break verdict,
            };
        };

        info!(
            strategy = %base.strategy_id(),
            run_id,
            verdict = verdict.label(),
            stages = run.results.len(),
            "walk-forward validation finished"
        );
        Ok(ValidationOutcome {
            verdict,
            results: run.results,
            grid: run.grid,
            split: bounds,
        })
    }

    fn concept_test(&self, run: &mut Run<'_>, days: &[TradingDay]) -> Result<State, RunError> {
        let stage = Stage::Concept;
        let base = run.base;
        let eval = match self.evaluate(stage, base, days)? {
            Ok(eval) => eval,
            Err(verdict) => return Ok(State::Done(verdict)),
        };
        let wf = &self.config.walk_forward;
        let thresholds = Thresholds {
            min_expected_r: Some(wf.concept_min_expected_r),
            ..self.base_thresholds()
        };

        let mut failures = Vec::new();
        match sample_gate(&eval.stats, &thresholds) {
            Err(failure) => failures.push(failure),
            Ok(er) => {
                if er < wf.concept_min_expected_r {
                    failures.push(GateFailure::BelowThreshold {
                        expected_r: er,
                        threshold: wf.concept_min_expected_r,
                    });
                }
                failures.extend(self.baseline_gate(&eval));
            }
        }

        self.record(run, stage, base, days, &eval, thresholds, None, false, &failures);
        Ok(advance(stage, failures, State::ParameterOptimization))
    }

    fn optimize(&self, run: &mut Run<'_>, days: &[TradingDay]) -> Result<State, RunError> {
        let stage = Stage::Train;
        let base = run.base;
        let variants = match grid::expand(&self.config.grid)
            .into_iter()
            .map(|p| p.apply(base).map(|spec| (p, spec)))
            .collect::<Result<Vec<(GridPoint, StrategySpec)>, _>>()
        {
            Ok(v) if !v.is_empty() => v,
            Ok(_) => {
                return Ok(State::Done(Verdict::NotEvaluated {
                    stage,
                    kind: NotEvaluatedKind::Configuration,
                    reason: "parameter grid is empty".to_string(),
                }))
            }
            Err(e) => {
                return Ok(State::Done(Verdict::NotEvaluated {
                    stage,
                    kind: NotEvaluatedKind::Configuration,
                    reason: e.to_string(),
                }))
            }
        };

        let evaluations = self.ctx.pool.install(|| {
            variants
                .par_iter()
                .map(|(_, spec)| {
                    self.ctx.check_cancelled()?;
                    self.evaluator.evaluate(spec, days)
                })
                .collect::<Result<Vec<_>, RunError>>()
        });
        let evaluations = match evaluations {
            Ok(v) => v,
            Err(RunError::Cancelled) => return Err(RunError::Cancelled),
            Err(e) => return Ok(State::Done(not_evaluated(stage, &e))),
        };
        self.ctx.check_cancelled()?;

        run.grid = variants
            .iter()
            .zip(&evaluations)
            .map(|((point, _), eval)| GridEvaluation {
                point: *point,
                stats: eval.stats.clone(),
            })
            .collect();

        let thresholds = Thresholds {
            positive_expected_r: true,
            ..self.base_thresholds()
        };
        let Some(best) = grid::select_best(&run.grid).map(|e| e.point.index) else {
            // Nothing met the sample minimum; record the best-sampled variant.
            let failures = vec![GateFailure::NoQualifyingConfig {
                evaluated: evaluations.len(),
            }];
            let fallback = (0..evaluations.len())
                .max_by_key(|&i| (evaluations[i].stats.sample_size, std::cmp::Reverse(i)))
                .unwrap_or(0);
            let spec = &variants[fallback].1;
            let fallback_eval = &evaluations[fallback];
            self.record(run, stage, spec, days, fallback_eval, thresholds, None, false, &failures);
            return Ok(State::Done(Verdict::Reject { stage, failures }));
        };

        let (selected, eval) = (&variants[best].1, &evaluations[best]);
        let mut failures = Vec::new();
        let er = eval.stats.expected_r().unwrap_or(0.0);
        if er <= 0.0 {
            failures.push(GateFailure::NonPositiveExpectancy { expected_r: er });
        }
        failures.extend(self.baseline_gate(eval));

        self.record(run, stage, selected, days, eval, thresholds, None, false, &failures);
        let next = State::OutOfSampleVerification {
            selected: selected.clone(),
            train_expected_r: er,
        };
        Ok(advance(stage, failures, next))
    }

    fn out_of_sample(
        &self,
        run: &mut Run<'_>,
        selected: &StrategySpec,
        train_expected_r: f64,
        days: &[TradingDay],
    ) -> Result<State, RunError> {
        let stage = Stage::Test;
        let eval = match self.evaluate(stage, selected, days)? {
            Ok(eval) => eval,
            Err(verdict) => return Ok(State::Done(verdict)),
        };
        let wf = &self.config.walk_forward;
        let thresholds = Thresholds {
            min_expected_r: Some(wf.test_min_expected_r),
            max_degradation: Some(wf.max_degradation),
            leakage_floor: Some(wf.leakage_floor),
            ..self.base_thresholds()
        };

        let mut failures = Vec::new();
        let mut degradation = None;
        let mut suspected_leakage = false;
        match sample_gate(&eval.stats, &thresholds) {
            Err(failure) => failures.push(failure),
            Ok(er) => {
                if er < wf.test_min_expected_r {
                    failures.push(GateFailure::BelowThreshold {
                        expected_r: er,
                        threshold: wf.test_min_expected_r,
                    });
                }
                // The optimization gate guarantees train_expected_r > 0.
                let d = (train_expected_r - er) / train_expected_r;
                degradation = Some(d);
                if d > wf.max_degradation {
                    failures.push(GateFailure::ExcessiveDegradation {
                        degradation: d,
                        max: wf.max_degradation,
                    });
                }
                if d < wf.leakage_floor {
                    suspected_leakage = true;
                    warn!(
                        strategy = %selected.strategy_id(),
                        degradation = d,
                        floor = wf.leakage_floor,
                        "out-of-sample result beats train by more than the leakage floor"
                    );
                    if wf.reject_on_suspected_leakage {
                        failures.push(GateFailure::SuspectedLeakage {
                            degradation: d,
                            floor: wf.leakage_floor,
                        });
                    }
                }
                failures.extend(self.baseline_gate(&eval));
            }
        }

        self.record(
            run,
            stage,
            selected,
            days,
            &eval,
            thresholds,
            degradation.map(|d| d * 100.0),
            suspected_leakage,
            &failures,
        );
        let next = State::Done(Verdict::Promote {
            spec: selected.clone(),
        });
        Ok(advance(stage, failures, next))
    }

    // ─── helpers ─────────────────────────────────────────────────────

    fn base_thresholds(&self) -> Thresholds {
        Thresholds {
            min_sample: self.config.aggregation.min_sample,
            min_expected_r: None,
            positive_expected_r: false,
            max_degradation: None,
            leakage_floor: None,
            win_rate_margin: self.config.baseline.win_rate_margin,
            expected_r_margin: self.config.baseline.expected_r_margin,
        }
    }

    /// `Ok(Err(verdict))` when the stage could not be evaluated.
    fn evaluate(
        &self,
        stage: Stage,
        spec: &StrategySpec,
        days: &[TradingDay],
    ) -> Result<Result<StageEvaluation, Verdict>, RunError> {
        match self.evaluator.evaluate(spec, days) {
            Ok(eval) => Ok(Ok(eval)),
            Err(RunError::Cancelled) => Err(RunError::Cancelled),
            Err(e) => Ok(Err(not_evaluated(stage, &e))),
        }
    }

    fn baseline_gate(&self, eval: &StageEvaluation) -> Option<GateFailure> {
        let stats = &eval.stats;
        let beaten = eval
            .baseline
            .is_beaten_by(stats.win_rate, stats.expected_r(), &self.config.baseline);
        (!beaten).then(|| GateFailure::BaselineNotBeaten {
            win_rate: stats.win_rate,
            expected_r: stats.expected_r(),
            baseline_win_rate: eval.baseline.win_rate,
            baseline_expected_r: eval.baseline.expected_r,
        })
    }

    /// Append the stage's result to the run history.
    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        run: &mut Run<'_>,
        stage: Stage,
        spec: &StrategySpec,
        days: &[TradingDay],
        eval: &StageEvaluation,
        thresholds: Thresholds,
        degradation_pct: Option<f64>,
        suspected_leakage: bool,
        failures: &[GateFailure],
    ) {
        let verdict = if failures.is_empty() {
            GateVerdict::Pass
        } else {
            GateVerdict::Fail
        };
        info!(
            strategy = %spec.strategy_id(),
            stage = stage.state_name(),
            verdict = ?verdict,
            sample = eval.stats.sample_size,
            expected_r = ?eval.stats.expected_r(),
            failures = failures.len(),
            "stage gate"
        );
        let slice = SliceBounds::of(days).unwrap_or(SliceBounds {
            first_day: NaiveDate::MIN,
            last_day: NaiveDate::MIN,
            trading_days: 0,
        });
        run.results.push(ValidationResult {
            run_id: run.run_id.to_string(),
            strategy_id: spec.strategy_id().clone(),
            stage,
            slice,
            sample_size: eval.stats.sample_size,
            open_count: eval.stats.open_count,
            no_trade_count: eval.stats.no_trade_count,
            win_rate: eval.stats.win_rate,
            expected_r: eval.stats.expected_r(),
            degradation_pct,
            suspected_leakage,
            baseline: eval.baseline,
            thresholds,
            verdict,
            failures: failures.to_vec(),
            spec: spec.clone(),
            spec_fingerprint: spec_fingerprint(spec),
            recorded_at: run.recorded_at,
        });
    }
}

/// `next` when every gate passed, otherwise REJECT at `stage`.
fn advance(stage: Stage, failures: Vec<GateFailure>, next: State) -> State {
    if failures.is_empty() {
        next
    } else {
        State::Done(Verdict::Reject { stage, failures })
    }
}

/// Expected R when the sample suffices.
fn sample_gate(stats: &TradeStats, thresholds: &Thresholds) -> Result<f64, GateFailure> {
    match stats.expected_r() {
        Some(er) if stats.meets_sample(thresholds.min_sample) => Ok(er),
        _ => Err(GateFailure::InsufficientSample {
            n: stats.sample_size,
            min: thresholds.min_sample,
        }),
    }
}

fn not_evaluated(stage: Stage, error: &RunError) -> Verdict {
    Verdict::NotEvaluated {
        stage,
        kind: NotEvaluatedKind::of(error),
        reason: error.to_string(),
    }
}
