//! Parameter grid — reward:risk × stop mode × size filter.
//!
//! Points are enumerated ratio-major in config order, so a point's index is
//! stable across runs and serves as the tie-breaker during selection.

use serde::{Deserialize, Serialize};

use rangebreak_core::domain::{SizeFilter, SpecError, StopMode, StrategySpec};

use crate::config::GridConfig;
use crate::metrics::TradeStats;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub index: usize,
    pub reward_risk_ratio: f64,
    pub stop_mode: StopMode,
    pub size_filter: Option<SizeFilter>,
}

impl GridPoint {
    /// Derive the grid variant of `base`; validated like a registry spec.
    pub fn apply(&self, base: &StrategySpec) -> Result<StrategySpec, SpecError> {
        base.with_parameters(self.reward_risk_ratio, self.stop_mode, self.size_filter)
    }
}

pub fn expand(grid: &GridConfig) -> Vec<GridPoint> {
    let mut filters: Vec<Option<SizeFilter>> = Vec::with_capacity(grid.size_filters.len() + 1);
    if grid.include_unfiltered {
        filters.push(None);
    }
    filters.extend(grid.size_filters.iter().copied().map(Some));

    let mut points = Vec::new();
    for &reward_risk_ratio in &grid.reward_risk_ratios {
        for &stop_mode in &grid.stop_modes {
            for &size_filter in &filters {
                points.push(GridPoint {
                    index: points.len(),
                    reward_risk_ratio,
                    stop_mode,
                    size_filter,
                });
            }
        }
    }
    points
}

/// One evaluated grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridEvaluation {
    pub point: GridPoint,
    pub stats: TradeStats,
}

/// Highest reported expectancy; the earliest index wins ties. Points whose
/// expectancy is withheld for sample size never qualify.
pub fn select_best(evaluations: &[GridEvaluation]) -> Option<&GridEvaluation> {
    let mut best: Option<(&GridEvaluation, f64)> = None;
    let mut ordered: Vec<&GridEvaluation> = evaluations.iter().collect();
    ordered.sort_by_key(|e| e.point.index);
    for evaluation in ordered {
        let Some(er) = evaluation.stats.expected_r() else {
            continue;
        };
        if best.map_or(true, |(_, top)| er > top) {
            best = Some((evaluation, er));
        }
    }
    best.map(|(e, _)| e)
}
