//! Execution simulator — B-entry fill, stop/target geometry and outcome.
//!
//! Entry is the OPEN of the bar following the signal bar. The outcome scan
//! starts at the bar after the entry bar, so the entry bar's own high/low can
//! never resolve the trade.

use tracing::debug;

use crate::domain::{
    BreakoutSignal, Direction, NoTradeReason, OpeningRange, Outcome, SimulatedTrade, StopMode,
    StrategySpec,
};
use crate::execution::classifier::classify;
use crate::execution::cost_model::CostModel;
use crate::session::TradingDay;
use crate::signal_detector::signal_bar_index;

/// Simulate the trade implied by `signal`.
///
/// Returns `None` when the signal carries no breakout (direction NONE or a
/// signal bar missing from `day`).
pub fn simulate_trade(
    day: &TradingDay,
    range: &OpeningRange,
    signal: &BreakoutSignal,
    spec: &StrategySpec,
    costs: &CostModel,
) -> Option<SimulatedTrade> {
    if !signal.is_breakout() {
        return None;
    }
    let index = signal_bar_index(day, signal)?;
    simulate_from_bar(day, range, signal.direction, index, spec, costs)
}

/// Simulate a trade whose signal fired on `day.bars[signal_index]`.
///
/// Shared by breakout signals and randomized control entries so both go
/// through identical fill, filter and classification rules. Returns `None`
/// when `signal_index` is past the end of the day.
pub fn simulate_from_bar(
    day: &TradingDay,
    range: &OpeningRange,
    direction: Direction,
    signal_index: usize,
    spec: &StrategySpec,
    costs: &CostModel,
) -> Option<SimulatedTrade> {
    let signal_bar = day.bars.get(signal_index)?;
    let mut trade = SimulatedTrade {
        trading_day: day.date,
        strategy_id: spec.strategy_id().clone(),
        direction,
        signal_timestamp: signal_bar.timestamp,
        entry_timestamp: None,
        entry_price: 0.0,
        stop_price: 0.0,
        target_price: 0.0,
        risk_points: 0.0,
        reward_points: 0.0,
        friction_points: 0.0,
        friction_dollars: 0.0,
        outcome: Outcome::NoTrade,
        exit_timestamp: None,
        realized_risk_dollars: 0.0,
        realized_reward_dollars: 0.0,
        realized_rr: None,
        same_bar_tie: false,
        no_trade_reason: None,
    };

    if !spec.direction_filter().allows(direction) {
        trade.no_trade_reason = Some(NoTradeReason::DirectionFiltered);
        return Some(trade);
    }
    if let Some(filter) = spec.size_filter() {
        if !filter.contains(range.size) {
            trade.no_trade_reason = Some(NoTradeReason::SizeFiltered);
            return Some(trade);
        }
    }

    let Some(entry_bar) = day.bars.get(signal_index + 1) else {
        trade.no_trade_reason = Some(NoTradeReason::NoEntryBar);
        return Some(trade);
    };
    let entry = entry_bar.open;
    let stop = stop_price(range, direction, spec.stop_mode());
    let sign = direction.sign();
    let risk_points = sign * (entry - stop);

    trade.entry_timestamp = Some(entry_bar.timestamp);
    trade.entry_price = entry;
    trade.stop_price = stop;
    trade.risk_points = risk_points;

    if !(risk_points.is_finite() && risk_points > 0.0) {
        trade.no_trade_reason = Some(NoTradeReason::DegenerateRisk);
        return Some(trade);
    }

    let reward_points = spec.reward_risk_ratio() * risk_points;
    let target = entry + sign * reward_points;
    let legs = costs.realize(risk_points, reward_points);

    trade.target_price = target;
    trade.reward_points = reward_points;
    trade.friction_points = legs.friction.points;
    trade.friction_dollars = legs.friction.dollars;
    trade.realized_risk_dollars = legs.risk_dollars;
    trade.realized_reward_dollars = legs.reward_dollars;

    let scan = &day.bars[signal_index + 2..];
    let classification = classify(scan, entry, stop, target, direction);
    if classification.same_bar_tie {
        debug!(
            day = %day.date,
            strategy = %spec.strategy_id(),
            ?direction,
            entry,
            stop,
            target,
            "stop and target touched in one bar; classified as LOSS"
        );
    }

    trade.outcome = classification.outcome;
    trade.exit_timestamp = classification.resolved_at;
    trade.same_bar_tie = classification.same_bar_tie;
    trade.realized_rr = (classification.outcome == Outcome::Win).then(|| legs.realized_rr());
    if classification.outcome == Outcome::NoTrade {
        trade.no_trade_reason = Some(NoTradeReason::DegenerateRisk);
    }
    Some(trade)
}

/// Protective stop for a breakout in `direction`.
pub fn stop_price(range: &OpeningRange, direction: Direction, mode: StopMode) -> f64 {
    match (mode, direction) {
        (StopMode::Half, _) => range.midpoint(),
        (StopMode::Full, Direction::Down) => range.high,
        (StopMode::Full, _) => range.low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DirectionFilter, PriceBar, RawStrategySpec, SizeFilter, WindowId};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn spec(rr: f64, stop_mode: StopMode, filter: DirectionFilter) -> StrategySpec {
        StrategySpec::from_raw(RawStrategySpec {
            strategy_id: Some("es_orb".into()),
            instrument: Some("ES".into()),
            window_id: Some("rth_15m".into()),
            direction_filter: Some(filter),
            reward_risk_ratio: Some(rr),
            stop_mode: Some(stop_mode),
            size_filter: None,
            cost_profile: Some("ES".into()),
        })
        .unwrap()
    }

    fn range() -> OpeningRange {
        OpeningRange::new(
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            WindowId::new("rth_15m"),
            4500.0,
            4490.0,
            15,
        )
    }

    /// Bars as (open, high, low, close) from 09:45 ET; bar 0 is the signal bar.
    fn day(bars: &[(f64, f64, f64, f64)]) -> TradingDay {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 4, 14, 45, 0).unwrap();
        TradingDay {
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            bars: bars
                .iter()
                .enumerate()
                .map(|(i, &(o, h, l, c))| {
                    PriceBar::new(t0 + Duration::minutes(i as i64), o, h, l, c)
                })
                .collect(),
        }
    }

    fn frictionless() -> CostModel {
        CostModel::frictionless("ES", 50.0, 0.25)
    }

    fn both(rr: f64, stop_mode: StopMode) -> StrategySpec {
        spec(rr, stop_mode, DirectionFilter::Both)
    }

    /// Frictionless trade for a signal on bar 0.
    fn run(d: &TradingDay, direction: Direction, spec: &StrategySpec) -> SimulatedTrade {
        simulate_from_bar(d, &range(), direction, 0, spec, &frictionless()).unwrap()
    }

    #[test]
    fn b_entry_geometry_full_stop() {
        let d = day(&[
            (4499.0, 4501.5, 4498.5, 4501.0),
            (4502.0, 4503.0, 4501.0, 4502.5),
            (4505.0, 4521.0, 4504.0, 4519.0),
        ]);
        let t = run(&d, Direction::Up, &both(1.5, StopMode::Full));
        assert_eq!(t.entry_price, 4502.0);
        assert_eq!(t.stop_price, 4490.0);
        assert_eq!(t.risk_points, 12.0);
        assert_eq!(t.target_price, 4520.0);
        assert_eq!(t.outcome, Outcome::Win);
        assert_eq!(t.entry_timestamp, Some(d.bars[1].timestamp));
        assert_eq!(t.exit_timestamp, Some(d.bars[2].timestamp));
        assert!((t.realized_rr.unwrap() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn entry_bar_extremes_do_not_resolve() {
        // Entry bar itself spans the target; only later bars count.
        let d = day(&[
            (4499.0, 4501.5, 4498.5, 4501.0),
            (4502.0, 4530.0, 4485.0, 4502.5),
        ]);
        let t = run(&d, Direction::Up, &both(1.5, StopMode::Full));
        assert_eq!(t.outcome, Outcome::Open);
        assert!(t.realized_rr.is_none());
    }

    #[test]
    fn half_stop_uses_midpoint() {
        let d = day(&[
            (4499.0, 4501.5, 4498.5, 4501.0),
            (4502.0, 4503.0, 4501.0, 4502.5),
            (4502.0, 4503.0, 4494.0, 4495.0),
        ]);
        let t = run(&d, Direction::Up, &both(2.0, StopMode::Half));
        assert_eq!(t.stop_price, 4495.0);
        assert_eq!(t.risk_points, 7.0);
        assert_eq!(t.target_price, 4516.0);
        assert_eq!(t.outcome, Outcome::Loss);
        assert_eq!(t.realized_rr, None);
    }

    #[test]
    fn last_bar_signal_has_no_entry() {
        let d = day(&[(4499.0, 4501.5, 4498.5, 4501.0)]);
        let t = run(&d, Direction::Up, &both(1.5, StopMode::Full));
        assert_eq!(t.outcome, Outcome::NoTrade);
        assert_eq!(t.no_trade_reason, Some(NoTradeReason::NoEntryBar));
    }

    #[test]
    fn gap_through_stop_is_degenerate() {
        // Entry opens below the FULL stop for a long.
        let d = day(&[
            (4499.0, 4501.5, 4498.5, 4501.0),
            (4489.0, 4491.0, 4480.0, 4485.0),
            (4485.0, 4600.0, 4400.0, 4500.0),
        ]);
        let t = run(&d, Direction::Up, &both(1.5, StopMode::Full));
        assert_eq!(t.outcome, Outcome::NoTrade);
        assert_eq!(t.no_trade_reason, Some(NoTradeReason::DegenerateRisk));
    }

    #[test]
    fn entry_at_stop_is_no_trade_not_open() {
        let d = day(&[
            (4495.0, 4495.0, 4489.0, 4489.0),
            (4500.0, 4501.0, 4499.0, 4500.0),
            (4500.0, 4501.0, 4499.0, 4500.0),
        ]);
        let t = run(&d, Direction::Down, &both(1.0, StopMode::Full));
        assert_eq!(t.outcome, Outcome::NoTrade);
        assert_eq!(t.no_trade_reason, Some(NoTradeReason::DegenerateRisk));
    }

    #[test]
    fn direction_filter_blocks_before_entry() {
        let d = day(&[
            (4499.0, 4501.5, 4498.5, 4501.0),
            (4502.0, 4503.0, 4501.0, 4502.5),
        ]);
        let t = run(
            &d,
            Direction::Up,
            &spec(1.5, StopMode::Full, DirectionFilter::DownOnly),
        );
        assert_eq!(t.no_trade_reason, Some(NoTradeReason::DirectionFiltered));
        assert!(t.entry_timestamp.is_none());
    }

    #[test]
    fn size_filter_blocks_before_entry() {
        let d = day(&[
            (4499.0, 4501.5, 4498.5, 4501.0),
            (4502.0, 4503.0, 4501.0, 4502.5),
        ]);
        let s = spec(1.5, StopMode::Full, DirectionFilter::Both)
            .with_parameters(
                1.5,
                StopMode::Full,
                Some(SizeFilter {
                    min_points: Some(15.0),
                    max_points: None,
                }),
            )
            .unwrap();
        let t = run(&d, Direction::Up, &s);
        assert_eq!(t.no_trade_reason, Some(NoTradeReason::SizeFiltered));
    }

    #[test]
    fn friction_shrinks_realized_rr() {
        let d = day(&[
            (4499.0, 4501.5, 4498.5, 4501.0),
            (4502.0, 4503.0, 4501.0, 4502.5),
            (4505.0, 4521.0, 4504.0, 4519.0),
        ]);
        let costs = CostModel {
            instrument: "ES".into(),
            point_value: 50.0,
            tick_size: 0.25,
            commission_round_trip: 5.0,
            spread_points: 0.25,
            slippage_points: 0.25,
        };
        let spec = both(1.5, StopMode::Full);
        let t = simulate_from_bar(&d, &range(), Direction::Up, 0, &spec, &costs).unwrap();
        assert_eq!(t.outcome, Outcome::Win);
        let rr = t.realized_rr.unwrap();
        assert!(rr < 1.5);
        assert!((rr - (900.0 - 42.5) / (600.0 + 42.5)).abs() < 1e-12);
    }

    #[test]
    fn signal_index_past_the_day_is_skipped() {
        let d = day(&[(4499.0, 4501.5, 4498.5, 4501.0)]);
        let spec = both(1.5, StopMode::Full);
        for index in [1, 9] {
            let t = simulate_from_bar(&d, &range(), Direction::Up, index, &spec, &frictionless());
            assert!(t.is_none(), "index {index}");
        }
    }

    #[test]
    fn short_full_stop_is_range_high() {
        assert_eq!(stop_price(&range(), Direction::Down, StopMode::Full), 4500.0);
        assert_eq!(stop_price(&range(), Direction::Up, StopMode::Full), 4490.0);
        assert_eq!(stop_price(&range(), Direction::Down, StopMode::Half), 4495.0);
    }
}
