//! Property tests for trade aggregation.
//!
//! 1. Order independence: shuffling trades leaves tallies and expectancy unchanged
//! 2. Partition independence: merging per-slice tallies equals one tally
//! 3. Sample gate: expectancy is reported iff WIN + LOSS reaches the minimum

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;

use rangebreak_core::domain::{Direction, NoTradeReason, Outcome, SimulatedTrade, StrategyId};
use rangebreak_runner::{Expectancy, TradeStats, TradeTally};

fn trade(day: i64, outcome: Outcome, realized_rr: f64) -> SimulatedTrade {
    let ts = Utc.with_ymd_and_hms(2024, 1, 2, 14, 45, 0).unwrap() + Duration::days(day);
    let entered = outcome != Outcome::NoTrade;
    SimulatedTrade {
        trading_day: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap() + Duration::days(day),
        strategy_id: StrategyId::new("prop"),
        direction: Direction::Up,
        signal_timestamp: ts,
        entry_timestamp: entered.then(|| ts + Duration::minutes(1)),
        entry_price: 101.0,
        stop_price: 99.0,
        target_price: 104.0,
        risk_points: 2.0,
        reward_points: 3.0,
        friction_points: 0.0,
        friction_dollars: 0.0,
        outcome,
        exit_timestamp: outcome.is_resolved().then(|| ts + Duration::minutes(5)),
        realized_risk_dollars: 100.0,
        realized_reward_dollars: 100.0 * realized_rr,
        realized_rr: (outcome == Outcome::Win).then_some(realized_rr),
        same_bar_tie: false,
        no_trade_reason: (!entered).then_some(NoTradeReason::DegenerateRisk),
    }
}

fn arb_trades() -> impl Strategy<Value = Vec<SimulatedTrade>> {
    prop::collection::vec((0..4u8, 0.2..3.0_f64), 0..80).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (kind, rr))| {
                let outcome = match kind {
                    0 => Outcome::Win,
                    1 => Outcome::Loss,
                    2 => Outcome::Open,
                    _ => Outcome::NoTrade,
                };
                trade(i as i64, outcome, rr)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn shuffling_does_not_change_aggregates(
        (trades, shuffled) in arb_trades()
            .prop_flat_map(|t| (Just(t.clone()), Just(t).prop_shuffle()))
    ) {
        let a: TradeTally = trades.iter().collect();
        let b: TradeTally = shuffled.iter().collect();
        prop_assert_eq!(a, b);

        let sa = TradeStats::from_trades(&trades, 10);
        let sb = TradeStats::from_trades(&shuffled, 10);
        prop_assert_eq!(sa.expectancy, sb.expectancy);
        prop_assert_eq!(sa.win_rate, sb.win_rate);
        prop_assert_eq!(sa.average_win_r, sb.average_win_r);
    }

    #[test]
    fn merged_tallies_equal_the_whole(trades in arb_trades(), cut in 0usize..80) {
        let cut = cut.min(trades.len());
        let whole: TradeTally = trades.iter().collect();
        let left: TradeTally = trades[..cut].iter().collect();
        let right: TradeTally = trades[cut..].iter().collect();
        prop_assert_eq!(left.merge(right), whole);
    }

    #[test]
    fn expectancy_is_gated_on_resolved_trades(trades in arb_trades(), min_sample in 1usize..60) {
        let stats = TradeStats::from_trades(&trades, min_sample);
        let resolved = trades.iter().filter(|t| t.outcome.is_resolved()).count();
        prop_assert_eq!(stats.sample_size, resolved);
        prop_assert_eq!(stats.open_count + stats.no_trade_count + resolved, trades.len());
        match stats.expectancy {
            Expectancy::Reported { .. } => prop_assert!(resolved >= min_sample),
            Expectancy::InsufficientSample { n, min } => {
                prop_assert_eq!(n, resolved);
                prop_assert_eq!(min, min_sample);
                prop_assert!(resolved < min_sample);
            }
        }
    }
}
