//! OpeningRange — the daily breakout reference.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::WindowId;

/// High/low of price during a fixed daily window.
///
/// One per (trading day, window). Built once by the range builder and
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningRange {
    pub trading_day: NaiveDate,
    pub window_id: WindowId,
    pub high: f64,
    pub low: f64,
    pub size: f64,
    /// Number of bars that fell inside the window.
    pub bar_count: usize,
}

impl OpeningRange {
    pub fn new(
        trading_day: NaiveDate,
        window_id: WindowId,
        high: f64,
        low: f64,
        bar_count: usize,
    ) -> Self {
        Self {
            trading_day,
            window_id,
            high,
            low,
            size: high - low,
            bar_count,
        }
    }

    pub fn midpoint(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// A zero-size range cannot be broken in a meaningful way.
    pub fn is_unbreakable(&self) -> bool {
        self.size <= 0.0
    }
}
