//! Reports — validation verdicts and backtest summaries.
//!
//! Every report serializes to JSON for the dashboard and renders to markdown
//! for humans. The backtest trade tape can also be exported as CSV.

use std::fmt::Write as _;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rangebreak_core::domain::{Outcome, SimulatedTrade, StrategyId, WindowId};
use rangebreak_core::DayOutcome;

use crate::grid::GridEvaluation;
use crate::metrics::{Expectancy, TradeStats};
use crate::runner::DayCounts;
use crate::validator::{GateFailure, GateVerdict, SplitBounds, Stage, ValidationResult, Verdict};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.1}%", v * 100.0))
}

fn r(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:+.3}R"))
}

fn describe_failure(failure: &GateFailure) -> String {
    match failure {
        GateFailure::InsufficientSample { n, min } => {
            format!("insufficient sample: {n} resolved trades < {min}")
        }
        GateFailure::BelowThreshold {
            expected_r,
            threshold,
        } => format!("expected R {expected_r:+.3} below threshold {threshold:+.3}"),
        GateFailure::NonPositiveExpectancy { expected_r } => {
            format!("selected config has non-positive expected R {expected_r:+.3}")
        }
        GateFailure::NoQualifyingConfig { evaluated } => {
            format!("none of {evaluated} grid configs met the sample minimum")
        }
        GateFailure::BaselineNotBeaten {
            win_rate,
            expected_r,
            baseline_win_rate,
            baseline_expected_r,
        } => format!(
            "baseline not beaten: win rate {} vs {:.1}%, expected R {} vs {:+.3}",
            pct(*win_rate),
            baseline_win_rate * 100.0,
            r(*expected_r),
            baseline_expected_r
        ),
        GateFailure::ExcessiveDegradation { degradation, max } => format!(
            "degradation {:.1}% exceeds maximum {:.1}%",
            degradation * 100.0,
            max * 100.0
        ),
        GateFailure::SuspectedLeakage { degradation, floor } => format!(
            "suspected leakage: degradation {:.1}% below floor {:.1}%",
            degradation * 100.0,
            floor * 100.0
        ),
    }
}

// ─── Validation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub strategy_id: StrategyId,
    pub run_id: Option<String>,
    pub config_hash: String,
    pub split: Option<SplitBounds>,
    pub stages: Vec<ValidationResult>,
    pub grid: Vec<GridEvaluation>,
    pub verdict: Verdict,
}

impl ValidationReport {
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn stage(&self, stage: Stage) -> Option<&ValidationResult> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Walk-forward validation: `{}`\n", self.strategy_id);
        if let Some(run_id) = &self.run_id {
            let _ = writeln!(out, "Run ID: `{run_id}`  ");
        }
        let _ = writeln!(out, "Config: `{}`\n", self.config_hash);

        let _ = writeln!(out, "## Verdict: {}\n", self.verdict.label());
        match &self.verdict {
            Verdict::Promote { spec } => {
                let _ = writeln!(
                    out,
                    "Selected: ratio {}, stop {:?}, size filter {}\n",
                    spec.reward_risk_ratio(),
                    spec.stop_mode(),
                    spec.size_filter().map_or_else(
                        || "none".to_string(),
                        |f| format!("{:?}..{:?}", f.min_points, f.max_points)
                    )
                );
            }
            Verdict::Reject { stage, failures } => {
                let _ = writeln!(out, "Rejected at {}:\n", stage.state_name());
                for failure in failures {
                    let _ = writeln!(out, "- {}", describe_failure(failure));
                }
                out.push('\n');
            }
            Verdict::NotEvaluated {
                stage,
                kind,
                reason,
            } => {
                let _ = writeln!(
                    out,
                    "Not evaluated at {} ({kind:?}): {reason}\n",
                    stage.state_name()
                );
            }
        }

        if let Some(split) = &self.split {
            out.push_str("## Calendar\n\n");
            out.push_str("| Slice | First | Last | Days |\n");
            out.push_str("|-------|-------|------|------|\n");
            for (name, slice) in [
                ("train", &split.train),
                ("validation", &split.validation),
                ("test", &split.test),
            ] {
                let _ = writeln!(
                    out,
                    "| {name} | {} | {} | {} |",
                    slice.first_day, slice.last_day, slice.trading_days
                );
            }
            out.push('\n');
        }

        if !self.stages.is_empty() {
            out.push_str("## Stages\n\n");
            out.push_str(concat!(
                "| Stage | Sample | Win rate | Expected R | Degradation ",
                "| Baseline WR | Baseline R | Gate |\n",
                "|-------|--------|----------|------------|-------------",
                "|-------------|------------|------|\n",
            ));
            for s in &self.stages {
                let _ = writeln!(
                    out,
                    "| {} | {} | {} | {} | {} | {:.1}% | {:+.3}R | {} |",
                    s.stage.state_name(),
                    s.sample_size,
                    pct(s.win_rate),
                    r(s.expected_r),
                    s.degradation_pct
                        .map_or_else(|| "-".to_string(), |d| format!("{d:.1}%")),
                    s.baseline.win_rate * 100.0,
                    s.baseline.expected_r,
                    match s.verdict {
                        GateVerdict::Pass => "PASS",
                        GateVerdict::Fail => "FAIL",
                    }
                );
            }
            out.push('\n');
        }

        if !self.grid.is_empty() {
            out.push_str("## Parameter grid (train)\n\n");
            out.push_str("| # | Ratio | Stop | Size filter | Sample | Expected R |\n");
            out.push_str("|---|-------|------|-------------|--------|------------|\n");
            for g in &self.grid {
                let _ = writeln!(
                    out,
                    "| {} | {} | {:?} | {} | {} | {} |",
                    g.point.index,
                    g.point.reward_risk_ratio,
                    g.point.stop_mode,
                    if g.point.size_filter.is_some() { "yes" } else { "no" },
                    g.stats.sample_size,
                    r(g.stats.expected_r())
                );
            }
        }
        out
    }
}

// ─── Backtest ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub strategy_id: StrategyId,
    pub instrument: String,
    pub window_id: WindowId,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub spec_fingerprint: String,
    pub dataset_hash: String,
    pub days: DayCounts,
    pub stats: TradeStats,
}

impl BacktestReport {
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_markdown(&self) -> String {
        let s = &self.stats;
        let mut out = format!(
            "# Backtest: `{}` on {} ({} → {})\n\n\
## Days\n\
- Trading days: {}\n\
- Traded: {}\n\
- No signal: {} (zero-size ranges: {})\n\
- Incomplete window: {}\n\n\
## Trades\n\
- Resolved: {} ({} wins, {} losses)\n\
- Open at close: {}\n\
- No trade: {}\n\
- Win rate: {}\n\
- Expected R: {}\n\
- Average win: {}\n\
- Max consecutive losses: {}\n\
- Max drawdown: {:.3}R\n",
            self.strategy_id,
            self.instrument,
            self.first_day,
            self.last_day,
            self.days.trading_days,
            self.days.traded,
            self.days.no_signal,
            self.days.unbreakable,
            self.days.incomplete,
            s.sample_size,
            s.wins,
            s.losses,
            s.open_count,
            s.no_trade_count,
            pct(s.win_rate),
            expectancy_text(&s.expectancy),
            r(s.average_win_r),
            s.max_consecutive_losses,
            s.max_drawdown_r,
        );
        if !s.stress.is_empty() {
            out.push_str("\n## Cost stress\n\n");
            out.push_str("| Friction × | Expected R | Average win |\n");
            out.push_str("|-----------|------------|-------------|\n");
            for v in &s.stress {
                let _ = writeln!(
                    out,
                    "| {:.2} | {} | {} |",
                    v.multiplier,
                    expectancy_text(&v.expectancy),
                    r(v.average_win_r)
                );
            }
        }
        out
    }
}

fn expectancy_text(e: &Expectancy) -> String {
    match e {
        Expectancy::Reported { expected_r } => format!("{expected_r:+.3}R"),
        Expectancy::InsufficientSample { n, min } => format!("withheld ({n} < {min} resolved)"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayReport {
    pub strategy_id: StrategyId,
    pub date: NaiveDate,
    pub outcome: DayOutcome,
}

impl DayReport {
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ─── CSV trade tape ──────────────────────────────────────────────────

#[derive(Serialize)]
struct TradeRow<'a> {
    trading_day: NaiveDate,
    direction: String,
    outcome: &'static str,
    signal_timestamp: String,
    entry_timestamp: String,
    exit_timestamp: String,
    entry_price: f64,
    stop_price: f64,
    target_price: f64,
    risk_points: f64,
    friction_dollars: f64,
    r_multiple: Option<f64>,
    same_bar_tie: bool,
    no_trade_reason: String,
    strategy_id: &'a str,
}

fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Win => "WIN",
        Outcome::Loss => "LOSS",
        Outcome::Open => "OPEN",
        Outcome::NoTrade => "NO_TRADE",
    }
}

pub fn trades_csv(trades: &[SimulatedTrade]) -> Result<String, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for t in trades {
        writer.serialize(TradeRow {
            trading_day: t.trading_day,
            direction: format!("{:?}", t.direction).to_uppercase(),
            outcome: outcome_label(t.outcome),
            signal_timestamp: t.signal_timestamp.to_rfc3339(),
            entry_timestamp: t.entry_timestamp.map(|ts| ts.to_rfc3339()).unwrap_or_default(),
            exit_timestamp: t.exit_timestamp.map(|ts| ts.to_rfc3339()).unwrap_or_default(),
            entry_price: t.entry_price,
            stop_price: t.stop_price,
            target_price: t.target_price,
            risk_points: t.risk_points,
            friction_dollars: t.friction_dollars,
            r_multiple: t.r_multiple(),
            same_bar_tie: t.same_bar_tie,
            no_trade_reason: t
                .no_trade_reason
                .map(|reason| format!("{reason:?}"))
                .unwrap_or_default(),
            strategy_id: t.strategy_id.as_str(),
        })?;
    }
    let bytes = writer.into_inner().map_err(|e| ReportError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn write_trades_csv(path: &Path, trades: &[SimulatedTrade]) -> Result<(), ReportError> {
    std::fs::write(path, trades_csv(trades)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::tests::trade;

    #[test]
    fn csv_has_one_row_per_trade() {
        let trades = vec![
            trade(0, Outcome::Win, 1.5),
            trade(1, Outcome::Loss, 0.0),
            trade(2, Outcome::NoTrade, 0.0),
        ];
        let csv = trades_csv(&trades).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("trading_day,direction,outcome"));
        assert!(lines[1].contains(",WIN,"));
        assert!(lines[2].contains(",-1.0,") || lines[2].contains(",-1,"));
    }

    #[test]
    fn backtest_markdown_mentions_withheld_expectancy() {
        let trades = vec![trade(0, Outcome::Win, 1.0)];
        let report = BacktestReport {
            strategy_id: StrategyId::new("t"),
            instrument: "ES".into(),
            window_id: WindowId::new("w"),
            first_day: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            last_day: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            spec_fingerprint: "f".into(),
            dataset_hash: "d".into(),
            days: DayCounts::default(),
            stats: TradeStats::with_stress(&trades, 30, &[1.5]),
        };
        let md = report.to_markdown();
        assert!(md.contains("withheld (1 < 30 resolved)"));
        assert!(md.contains("## Cost stress"));
        assert!(report.to_json().unwrap().contains("\"insufficient_sample\""));
    }
}
