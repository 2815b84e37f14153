//! SimulatedTrade — one classified trade per (trading day, strategy).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ids::StrategyId;
use super::signal::Direction;

/// Closed set of trade outcomes.
///
/// `NoTrade` means the trade was never validly entered; `Open` means it was
/// entered but neither stop nor target was touched before the day ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Win,
    Loss,
    Open,
    NoTrade,
}

impl Outcome {
    /// WIN and LOSS are the only outcomes that count toward the sample.
    pub fn is_resolved(self) -> bool {
        matches!(self, Outcome::Win | Outcome::Loss)
    }
}

/// Why a day with a breakout signal produced no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoTradeReason {
    /// The signal bar was the last bar of the day.
    NoEntryBar,
    /// Entry at or beyond the stop: zero or negative risk.
    DegenerateRisk,
    /// Breakout direction excluded by the strategy's direction filter.
    DirectionFiltered,
    /// Opening-range size outside the strategy's size filter.
    SizeFiltered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedTrade {
    pub trading_day: NaiveDate,
    pub strategy_id: StrategyId,
    pub direction: Direction,
    pub signal_timestamp: DateTime<Utc>,
    pub entry_timestamp: Option<DateTime<Utc>>,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub risk_points: f64,
    pub reward_points: f64,
    /// Round-trip friction in price points (commission + 2x spread + slippage).
    pub friction_points: f64,
    pub friction_dollars: f64,
    pub outcome: Outcome,
    pub exit_timestamp: Option<DateTime<Utc>>,
    pub realized_risk_dollars: f64,
    pub realized_reward_dollars: f64,
    /// Realized reward / realized risk. Present on WIN only.
    pub realized_rr: Option<f64>,
    /// Stop and target were both touched in the resolving bar.
    pub same_bar_tie: bool,
    pub no_trade_reason: Option<NoTradeReason>,
}

impl SimulatedTrade {
    /// Trade result in multiples of realized risk: `realized_rr` on WIN,
    /// -1 on LOSS, `None` for OPEN and NO_TRADE.
    pub fn r_multiple(&self) -> Option<f64> {
        match self.outcome {
            Outcome::Win => self.realized_rr,
            Outcome::Loss => Some(-1.0),
            Outcome::Open | Outcome::NoTrade => None,
        }
    }

    /// Gross (pre-friction) risk and reward in currency.
    pub fn gross_dollars(&self) -> (f64, f64) {
        match self.outcome {
            Outcome::NoTrade => (0.0, 0.0),
            _ => (
                self.realized_risk_dollars - self.friction_dollars,
                self.realized_reward_dollars + self.friction_dollars,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_trade(outcome: Outcome) -> SimulatedTrade {
        SimulatedTrade {
            trading_day: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            strategy_id: StrategyId::new("es_orb_15"),
            direction: Direction::Up,
            signal_timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 14, 45, 0).unwrap(),
            entry_timestamp: Some(Utc.with_ymd_and_hms(2024, 3, 4, 14, 46, 0).unwrap()),
            entry_price: 4502.0,
            stop_price: 4490.0,
            target_price: 4520.0,
            risk_points: 12.0,
            reward_points: 18.0,
            friction_points: 0.6,
            friction_dollars: 30.0,
            outcome,
            exit_timestamp: None,
            realized_risk_dollars: 630.0,
            realized_reward_dollars: 870.0,
            realized_rr: (outcome == Outcome::Win).then_some(870.0 / 630.0),
            same_bar_tie: false,
            no_trade_reason: None,
        }
    }

    #[test]
    fn r_multiple_per_outcome() {
        assert!((sample_trade(Outcome::Win).r_multiple().unwrap() - 870.0 / 630.0).abs() < 1e-12);
        assert_eq!(sample_trade(Outcome::Loss).r_multiple(), Some(-1.0));
        assert_eq!(sample_trade(Outcome::Open).r_multiple(), None);
        assert_eq!(sample_trade(Outcome::NoTrade).r_multiple(), None);
    }

    #[test]
    fn gross_dollars_strip_friction() {
        let (risk, reward) = sample_trade(Outcome::Win).gross_dollars();
        assert!((risk - 600.0).abs() < 1e-9);
        assert!((reward - 900.0).abs() < 1e-9);
    }

    #[test]
    fn only_win_and_loss_are_resolved() {
        assert!(Outcome::Win.is_resolved());
        assert!(Outcome::Loss.is_resolved());
        assert!(!Outcome::Open.is_resolved());
        assert!(!Outcome::NoTrade.is_resolved());
    }
}
