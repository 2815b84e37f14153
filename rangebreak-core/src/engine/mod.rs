//! Per-day pipeline: range builder → signal detector → execution simulator.
//!
//! Each trading day depends only on its own bars and the already-resolved
//! strategy spec and cost model, so days can be simulated in any order or in
//! parallel.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{OpeningRange, SimulatedTrade, StrategySpec};
use crate::execution::{simulate_trade, CostModel};
use crate::range_builder::{build_opening_range, DataGapError};
use crate::session::{SessionCalendar, TradingDay, WindowDefinition};
use crate::signal_detector::detect_breakout;

/// Complete result of one (trading day, strategy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DayOutcome {
    /// The window lacked data; the day is reported, not simulated.
    Incomplete { error: DataGapError },
    /// Complete range but no close outside it. `unbreakable` marks a
    /// zero-size range.
    NoSignal {
        range: OpeningRange,
        unbreakable: bool,
    },
    /// A breakout signal fired and was run through the simulator.
    Traded { range: OpeningRange, trade: SimulatedTrade },
}

impl DayOutcome {
    pub fn trade(&self) -> Option<&SimulatedTrade> {
        match self {
            DayOutcome::Traded { trade, .. } => Some(trade),
            _ => None,
        }
    }

    pub fn into_trade(self) -> Option<SimulatedTrade> {
        match self {
            DayOutcome::Traded { trade, .. } => Some(trade),
            _ => None,
        }
    }

    pub fn range(&self) -> Option<&OpeningRange> {
        match self {
            DayOutcome::Incomplete { .. } => None,
            DayOutcome::NoSignal { range, .. } | DayOutcome::Traded { range, .. } => Some(range),
        }
    }
}

/// Run the full per-day pipeline for one strategy.
pub fn simulate_day(
    day: &TradingDay,
    window: &WindowDefinition,
    calendar: &SessionCalendar,
    spec: &StrategySpec,
    costs: &CostModel,
) -> DayOutcome {
    let range = match build_opening_range(day, window, calendar) {
        Ok(range) => range,
        Err(error) => {
            debug!(day = %day.date, window = %window.id, %error, "incomplete window");
            return DayOutcome::Incomplete { error };
        }
    };

    let signal = detect_breakout(day, &range, window, calendar);
    match simulate_trade(day, &range, &signal, spec, costs) {
        Some(trade) => DayOutcome::Traded { range, trade },
        None => DayOutcome::NoSignal {
            unbreakable: range.is_unbreakable(),
            range,
        },
    }
}
