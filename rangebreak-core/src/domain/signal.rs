//! Breakout direction and signal records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ids::WindowId;

/// Direction of the first close outside the opening range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Up,
    Down,
    None,
}

impl Direction {
    /// +1 for Up, -1 for Down, 0 for None.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
            Direction::None => 0.0,
        }
    }
}

/// Which breakout directions a strategy is allowed to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectionFilter {
    Both,
    UpOnly,
    DownOnly,
}

impl DirectionFilter {
    pub fn allows(self, direction: Direction) -> bool {
        match (self, direction) {
            (_, Direction::None) => false,
            (DirectionFilter::Both, _) => true,
            (DirectionFilter::UpOnly, Direction::Up) => true,
            (DirectionFilter::DownOnly, Direction::Down) => true,
            _ => false,
        }
    }
}

/// The first breakout of a trading day (or `Direction::None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutSignal {
    pub trading_day: NaiveDate,
    pub window_id: WindowId,
    pub direction: Direction,
    /// Open timestamp of the signal bar. `None` when no breakout occurred.
    pub signal_bar_timestamp: Option<DateTime<Utc>>,
    pub signal_close: Option<f64>,
}

impl BreakoutSignal {
    pub fn none(trading_day: NaiveDate, window_id: WindowId) -> Self {
        Self {
            trading_day,
            window_id,
            direction: Direction::None,
            signal_bar_timestamp: None,
            signal_close: None,
        }
    }

    pub fn is_breakout(&self) -> bool {
        self.direction != Direction::None
    }
}
