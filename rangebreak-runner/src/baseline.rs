//! Control baseline — the same trade mechanics with random entries.
//!
//! A strategy must beat what random entries produce on the same days, with
//! the same stop and target geometry and the same costs. For every day with
//! a complete opening range (that passes the size filter) `draws_per_day`
//! post-window bars are drawn as pseudo-signals and a permitted direction is
//! drawn at random. Each pseudo-signal goes through `simulate_from_bar`,
//! exactly like a real breakout.
//!
//! The RNG is seeded from the strategy id and spec fingerprint and sub-seeded
//! per (day, draw), so the baseline is independent of scheduling order.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use rangebreak_core::domain::{Direction, DirectionFilter, SimulatedTrade};
use rangebreak_core::execution::simulate_from_bar;
use rangebreak_core::fingerprint::spec_fingerprint;
use rangebreak_core::rng::RngHierarchy;
use rangebreak_core::{build_opening_range, SessionCalendar, TradingDay};

use crate::config::BaselineConfig;
use crate::metrics::TradeStats;
use crate::registry::ResolvedStrategy;
use crate::runner::{RunContext, RunError};

const SCOPE: &str = "baseline";

/// Where the reference numbers came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineSource {
    /// Random-entry trades produced at least `min_sample` resolved trades.
    Sampled,
    /// Too few resolved random trades; chance level for the ratio is used.
    ChanceLevel,
}

/// Numbers a strategy has to beat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineReference {
    pub source: BaselineSource,
    pub win_rate: f64,
    pub expected_r: f64,
    /// Resolved random-entry trades behind the reference.
    pub resolved: usize,
    pub draws: usize,
}

impl BaselineReference {
    /// Break-even win rate `1 / (1 + rr)` and zero expectancy.
    pub fn chance_level(reward_risk_ratio: f64, resolved: usize, draws: usize) -> Self {
        Self {
            source: BaselineSource::ChanceLevel,
            win_rate: 1.0 / (1.0 + reward_risk_ratio),
            expected_r: 0.0,
            resolved,
            draws,
        }
    }

    /// Whether (`win_rate`, `expected_r`) clear this reference by the margins.
    pub fn is_beaten_by(
        &self,
        win_rate: Option<f64>,
        expected_r: Option<f64>,
        config: &BaselineConfig,
    ) -> bool {
        match (win_rate, expected_r) {
            (Some(wr), Some(er)) => {
                wr >= self.win_rate + config.win_rate_margin
                    && er >= self.expected_r + config.expected_r_margin
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlBaseline {
    pub trades: Vec<SimulatedTrade>,
    pub stats: TradeStats,
    pub reference: BaselineReference,
}

impl ControlBaseline {
    pub fn generate(
        days: &[TradingDay],
        strategy: &ResolvedStrategy,
        calendar: &SessionCalendar,
        config: &BaselineConfig,
        min_sample: usize,
        ctx: &RunContext<'_>,
    ) -> Result<Self, RunError> {
        let spec = &strategy.spec;
        let rng = RngHierarchy::for_strategy(spec.strategy_id(), &spec_fingerprint(spec));

        let per_day = ctx.pool.install(|| {
            days.par_iter()
                .map(|day| {
                    ctx.check_cancelled()?;
                    Ok(random_entries(day, strategy, calendar, config.draws_per_day, &rng))
                })
                .collect::<Result<Vec<_>, RunError>>()
        })?;
        ctx.check_cancelled()?;

        let trades: Vec<SimulatedTrade> = per_day.into_iter().flatten().collect();
        let stats = TradeStats::from_trades(&trades, min_sample);
        let draws = trades.len();
        let reference = if stats.meets_sample(min_sample) {
            BaselineReference {
                source: BaselineSource::Sampled,
                win_rate: stats.win_rate.unwrap_or(0.0),
                expected_r: stats.expected_r().unwrap_or(0.0),
                resolved: stats.sample_size,
                draws,
            }
        } else {
            BaselineReference::chance_level(spec.reward_risk_ratio(), stats.sample_size, draws)
        };
        debug!(
            strategy = %spec.strategy_id(),
            draws,
            resolved = stats.sample_size,
            source = ?reference.source,
            "control baseline"
        );
        Ok(Self {
            trades,
            stats,
            reference,
        })
    }
}

fn random_entries(
    day: &TradingDay,
    strategy: &ResolvedStrategy,
    calendar: &SessionCalendar,
    draws: u32,
    rng: &RngHierarchy,
) -> Vec<SimulatedTrade> {
    let spec = &strategy.spec;
    let Ok(range) = build_opening_range(day, &strategy.window, calendar) else {
        return Vec::new();
    };
    if spec.size_filter().is_some_and(|f| !f.contains(range.size)) {
        return Vec::new();
    }
    // A pseudo-signal needs a following bar to enter on.
    let last = day.bars.len().saturating_sub(1);
    let candidates: Vec<usize> = (0..last)
        .filter(|&i| strategy.window.is_after(calendar.local_time(day.bars[i].timestamp)))
        .collect();
    if candidates.is_empty() {
        return Vec::new();
    }

    (0..u64::from(draws))
        .filter_map(|draw| {
            let mut r = rng.rng_for(SCOPE, day.date, draw);
            let index = candidates[r.gen_range(0..candidates.len())];
            let direction = match spec.direction_filter() {
                DirectionFilter::UpOnly => Direction::Up,
                DirectionFilter::DownOnly => Direction::Down,
                DirectionFilter::Both => {
                    if r.gen_bool(0.5) {
                        Direction::Up
                    } else {
                        Direction::Down
                    }
                }
            };
            simulate_from_bar(day, &range, direction, index, spec, &strategy.costs)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::build_pool;
    use chrono::{NaiveDate, NaiveTime};
    use chrono_tz::America::New_York;
    use rangebreak_core::data::{random_walk, RandomWalkConfig};
    use rangebreak_core::domain::{RawStrategySpec, StopMode, StrategySpec, WindowId};
    use rangebreak_core::execution::CostModel;
    use rangebreak_core::{split_by_trading_day, WindowDefinition};

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn calendar() -> SessionCalendar {
        SessionCalendar::new(New_York, hm(9, 30), hm(16, 0)).unwrap()
    }

    fn strategy(filter: DirectionFilter) -> ResolvedStrategy {
        let spec = StrategySpec::from_raw(RawStrategySpec {
            strategy_id: Some("base".into()),
            instrument: Some("ES".into()),
            window_id: Some("w".into()),
            direction_filter: Some(filter),
            reward_risk_ratio: Some(1.0),
            stop_mode: Some(StopMode::Half),
            size_filter: None,
            cost_profile: Some("ES".into()),
        })
        .unwrap();
        ResolvedStrategy {
            spec,
            window: WindowDefinition {
                id: WindowId::new("w"),
                start: hm(9, 30),
                end: hm(10, 0),
                bar_minutes: 5,
                allowed_missing_bars: 0,
            },
            costs: CostModel {
                instrument: "ES".into(),
                point_value: 50.0,
                tick_size: 0.25,
                commission_round_trip: 4.0,
                spread_points: 0.25,
                slippage_points: 0.25,
            },
        }
    }

    fn days() -> Vec<TradingDay> {
        let bars = random_walk(
            &calendar(),
            &RandomWalkConfig {
                first_day: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                days: 30,
                bar_minutes: 5,
                start_price: 4500.0,
                max_step: 3.0,
                tick_size: 0.25,
                seed: 11,
            },
        );
        split_by_trading_day(&bars, &calendar())
    }

    fn config(draws_per_day: u32) -> BaselineConfig {
        BaselineConfig {
            draws_per_day,
            win_rate_margin: 0.0,
            expected_r_margin: 0.0,
        }
    }

    #[test]
    fn draws_per_day_and_worker_independence() {
        let days = days();
        let s = strategy(DirectionFilter::Both);
        let run = |workers| {
            let pool = build_pool(workers).unwrap();
            let ctx = RunContext::new(&pool, None);
            ControlBaseline::generate(&days, &s, &calendar(), &config(3), 5, &ctx).unwrap()
        };
        let one = run(1);
        let four = run(4);
        assert_eq!(one.trades.len(), 30 * 3);
        assert_eq!(one, four);
    }

    #[test]
    fn direction_filter_is_respected() {
        let pool = build_pool(2).unwrap();
        let baseline = ControlBaseline::generate(
            &days(),
            &strategy(DirectionFilter::DownOnly),
            &calendar(),
            &config(2),
            5,
            &RunContext::new(&pool, None),
        )
        .unwrap();
        assert!(baseline.trades.iter().all(|t| t.direction == Direction::Down));
    }

    #[test]
    fn small_sample_falls_back_to_chance_level() {
        let pool = build_pool(1).unwrap();
        let baseline = ControlBaseline::generate(
            &days()[..2],
            &strategy(DirectionFilter::Both),
            &calendar(),
            &config(1),
            30,
            &RunContext::new(&pool, None),
        )
        .unwrap();
        assert_eq!(baseline.reference.source, BaselineSource::ChanceLevel);
        assert_eq!(baseline.reference.win_rate, 0.5);
        assert_eq!(baseline.reference.expected_r, 0.0);
    }

    #[test]
    fn margins_must_be_cleared() {
        let reference = BaselineReference::chance_level(1.0, 0, 0);
        let margins = BaselineConfig {
            draws_per_day: 1,
            win_rate_margin: 0.05,
            expected_r_margin: 0.1,
        };
        assert!(reference.is_beaten_by(Some(0.6), Some(0.2), &margins));
        assert!(!reference.is_beaten_by(Some(0.54), Some(0.2), &margins));
        assert!(!reference.is_beaten_by(Some(0.6), Some(0.05), &margins));
        assert!(!reference.is_beaten_by(Some(0.6), None, &margins));
    }
}
