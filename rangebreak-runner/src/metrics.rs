//! Trade aggregation: win rate, expectancy, streaks, drawdown, cost stress.
//!
//! All R sums are accumulated as fixed-point integers (`R_QUANTUM` units) in a
//! [`TradeTally`]. Integer addition is associative and commutative, so any
//! grouping or ordering of the same trades yields identical statistics, which
//! is what lets days be simulated in parallel.

use serde::{Deserialize, Serialize};

use rangebreak_core::domain::{Outcome, SimulatedTrade};

/// Fixed-point resolution of accumulated R values.
pub const R_QUANTUM: f64 = 1e-9;

fn quantize(r: f64) -> i128 {
    (r / R_QUANTUM).round() as i128
}

fn dequantize(q: i128) -> f64 {
    q as f64 * R_QUANTUM
}

// ─── TradeTally ──────────────────────────────────────────────────────

/// Order-independent reduction of trades.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradeTally {
    pub wins: usize,
    pub losses: usize,
    pub open: usize,
    pub no_trade: usize,
    r_sum: i128,
    win_r_sum: i128,
}

impl TradeTally {
    pub fn from_trade(trade: &SimulatedTrade) -> Self {
        let mut tally = Self::default();
        tally.add(trade);
        tally
    }

    pub fn add(&mut self, trade: &SimulatedTrade) {
        match trade.outcome {
            Outcome::Win => {
                let r = quantize(trade.r_multiple().unwrap_or(0.0));
                self.wins += 1;
                self.r_sum += r;
                self.win_r_sum += r;
            }
            Outcome::Loss => {
                self.losses += 1;
                self.r_sum += quantize(-1.0);
            }
            Outcome::Open => self.open += 1,
            Outcome::NoTrade => self.no_trade += 1,
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            wins: self.wins + other.wins,
            losses: self.losses + other.losses,
            open: self.open + other.open,
            no_trade: self.no_trade + other.no_trade,
            r_sum: self.r_sum + other.r_sum,
            win_r_sum: self.win_r_sum + other.win_r_sum,
        }
    }

    /// WIN + LOSS.
    pub fn sample_size(&self) -> usize {
        self.wins + self.losses
    }

    pub fn total(&self) -> usize {
        self.sample_size() + self.open + self.no_trade
    }

    pub fn win_rate(&self) -> Option<f64> {
        let n = self.sample_size();
        (n > 0).then(|| self.wins as f64 / n as f64)
    }

    pub fn expected_r(&self) -> Option<f64> {
        let n = self.sample_size();
        (n > 0).then(|| dequantize(self.r_sum) / n as f64)
    }

    pub fn average_win_r(&self) -> Option<f64> {
        (self.wins > 0).then(|| dequantize(self.win_r_sum) / self.wins as f64)
    }
}

impl<'a> FromIterator<&'a SimulatedTrade> for TradeTally {
    fn from_iter<I: IntoIterator<Item = &'a SimulatedTrade>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), |mut tally, trade| {
            tally.add(trade);
            tally
        })
    }
}

// ─── Expectancy ──────────────────────────────────────────────────────

/// Expected R, or the reason it is withheld.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectancy {
    Reported { expected_r: f64 },
    InsufficientSample { n: usize, min: usize },
}

impl Expectancy {
    pub fn value(&self) -> Option<f64> {
        match self {
            Expectancy::Reported { expected_r } => Some(*expected_r),
            Expectancy::InsufficientSample { .. } => None,
        }
    }
}

/// Expectancy recomputed with friction scaled by `multiplier`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StressVariant {
    pub multiplier: f64,
    pub expectancy: Expectancy,
    pub average_win_r: Option<f64>,
}

// ─── TradeStats ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    /// Resolved trades (WIN + LOSS).
    pub sample_size: usize,
    pub wins: usize,
    pub losses: usize,
    pub open_count: usize,
    pub no_trade_count: usize,
    /// WIN / (WIN + LOSS).
    pub win_rate: Option<f64>,
    pub expectancy: Expectancy,
    pub average_win_r: Option<f64>,
    pub max_consecutive_losses: usize,
    /// Largest peak-to-trough decline of cumulative R.
    pub max_drawdown_r: f64,
    pub stress: Vec<StressVariant>,
}

impl TradeStats {
    pub fn from_trades(trades: &[SimulatedTrade], min_sample: usize) -> Self {
        let tally: TradeTally = trades.iter().collect();
        Self::from_tally(&tally, trades, min_sample)
    }

    /// Statistics plus one [`StressVariant`] per friction multiplier.
    pub fn with_stress(trades: &[SimulatedTrade], min_sample: usize, multipliers: &[f64]) -> Self {
        let mut stats = Self::from_trades(trades, min_sample);
        stats.stress = multipliers
            .iter()
            .map(|&m| stress_variant(trades, min_sample, m))
            .collect();
        stats
    }

    fn from_tally(tally: &TradeTally, trades: &[SimulatedTrade], min_sample: usize) -> Self {
        let (max_consecutive_losses, max_drawdown_r) = sequence_metrics(trades);
        Self {
            sample_size: tally.sample_size(),
            wins: tally.wins,
            losses: tally.losses,
            open_count: tally.open,
            no_trade_count: tally.no_trade,
            win_rate: tally.win_rate(),
            expectancy: expectancy(tally, min_sample),
            average_win_r: tally.average_win_r(),
            max_consecutive_losses,
            max_drawdown_r,
            stress: Vec::new(),
        }
    }

    pub fn expected_r(&self) -> Option<f64> {
        self.expectancy.value()
    }

    pub fn meets_sample(&self, min_sample: usize) -> bool {
        self.sample_size >= min_sample
    }
}

fn expectancy(tally: &TradeTally, min_sample: usize) -> Expectancy {
    let n = tally.sample_size();
    match tally.expected_r() {
        Some(expected_r) if n >= min_sample => Expectancy::Reported { expected_r },
        _ => Expectancy::InsufficientSample { n, min: min_sample },
    }
}

/// Streak and drawdown over trades in (day, signal time) order.
fn sequence_metrics(trades: &[SimulatedTrade]) -> (usize, f64) {
    let mut ordered: Vec<&SimulatedTrade> =
        trades.iter().filter(|t| t.outcome.is_resolved()).collect();
    ordered.sort_by_key(|t| (t.trading_day, t.signal_timestamp));

    let (mut streak, mut max_streak) = (0usize, 0usize);
    let (mut equity, mut peak, mut max_dd) = (0i128, 0i128, 0i128);
    for trade in ordered {
        if trade.outcome == Outcome::Loss {
            streak += 1;
            max_streak = max_streak.max(streak);
        } else {
            streak = 0;
        }
        equity += quantize(trade.r_multiple().unwrap_or(0.0));
        peak = peak.max(equity);
        max_dd = max_dd.max(peak - equity);
    }
    (max_streak, dequantize(max_dd))
}

/// WIN R with friction scaled by `k`: `(reward − k·f) / (risk + k·f)` on the
/// gross legs; LOSS stays at −1.
fn stressed_r(trade: &SimulatedTrade, k: f64) -> Option<f64> {
    match trade.outcome {
        Outcome::Win => {
            let (gross_risk, gross_reward) = trade.gross_dollars();
            let f = trade.friction_dollars * k;
            let risk = gross_risk + f;
            (risk > 0.0).then(|| (gross_reward - f) / risk)
        }
        Outcome::Loss => Some(-1.0),
        Outcome::Open | Outcome::NoTrade => None,
    }
}

fn stress_variant(trades: &[SimulatedTrade], min_sample: usize, multiplier: f64) -> StressVariant {
    let mut tally = TradeTally::default();
    for trade in trades {
        match (trade.outcome, stressed_r(trade, multiplier)) {
            (Outcome::Win, Some(r)) => {
                tally.wins += 1;
                tally.r_sum += quantize(r);
                tally.win_r_sum += quantize(r);
            }
            (Outcome::Loss, _) => {
                tally.losses += 1;
                tally.r_sum += quantize(-1.0);
            }
            _ => {}
        }
    }
    StressVariant {
        multiplier,
        expectancy: expectancy(&tally, min_sample),
        average_win_r: tally.average_win_r(),
    }
}
