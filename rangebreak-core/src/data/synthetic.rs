//! Synthetic minute bars.
//!
//! Two generators:
//! - [`random_walk`]: seeded tick-rounded random walk over weekday sessions,
//!   for smoke runs and benchmarks.
//! - [`scripted_day`]: one day with a fixed opening-range geometry and a
//!   chosen outcome, for tests that need exact statistics.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::PriceBar;
use crate::session::SessionCalendar;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomWalkConfig {
    pub first_day: NaiveDate,
    /// Number of weekday sessions to generate.
    pub days: usize,
    pub bar_minutes: u32,
    pub start_price: f64,
    /// Maximum close-to-close move per bar, in points.
    pub max_step: f64,
    pub tick_size: f64,
    pub seed: u64,
}

/// Weekdays starting at `first`, `count` of them.
pub fn weekdays(first: NaiveDate, count: usize) -> Vec<NaiveDate> {
    first
        .iter_days()
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .take(count)
        .collect()
}

fn round_to_tick(price: f64, tick: f64) -> f64 {
    (price / tick).round() * tick
}

pub fn random_walk(calendar: &SessionCalendar, config: &RandomWalkConfig) -> Vec<PriceBar> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let tick = config.tick_size;
    let step = Duration::minutes(i64::from(config.bar_minutes.max(1)));
    let mut price = round_to_tick(config.start_price, tick);
    let mut bars = Vec::new();

    for date in weekdays(config.first_day, config.days) {
        let mut time = calendar.session_start;
        while time >= calendar.session_start && time < calendar.session_end {
            if let Some(timestamp) = calendar.to_utc(date, time) {
                let open = price;
                let step = rng.gen_range(-config.max_step..=config.max_step);
                let close = round_to_tick(open + step, tick).max(tick);
                let wick_up = round_to_tick(rng.gen_range(0.0..=config.max_step / 2.0), tick);
                let wick_down = round_to_tick(rng.gen_range(0.0..=config.max_step / 2.0), tick);
                let high = open.max(close) + wick_up;
                let low = (open.min(close) - wick_down).max(tick);
                bars.push(PriceBar::new(timestamp, open, high, low, close));
                price = close;
            }
            let (next, wrapped) = time.overflowing_add_signed(step);
            if wrapped != 0 {
                break;
            }
            time = next;
        }
    }
    bars
}

/// Outcome a scripted day produces for a long breakout with FULL stop and
/// reward:risk 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedOutcome {
    Win,
    Loss,
    Open,
    /// No close outside the range.
    Quiet,
}

/// Number of one-minute opening-range bars a scripted day contains.
pub const SCRIPTED_WINDOW_BARS: usize = 15;

/// One-minute bars for `date` starting at `window_start` local time.
///
/// Geometry:
/// - 15 window bars spanning the range 99.0–101.0
/// - signal bar closing at 101.5 (UP breakout)
/// - entry bar opening at 101.6 (risk 2.6 to the FULL stop at 99.0)
/// - a resolving bar: high 104.5 (WIN at ratio 1.0, target 104.2) or low
///   98.5 (LOSS), or neither (OPEN)
/// - flat bars around 102.0 through the 30th bar
pub fn scripted_day(
    calendar: &SessionCalendar,
    date: NaiveDate,
    window_start: NaiveTime,
    outcome: ScriptedOutcome,
) -> Vec<PriceBar> {
    let mut ohlc: Vec<(f64, f64, f64, f64)> = Vec::with_capacity(30);
    ohlc.push((100.0, 101.0, 99.0, 100.0));
    for _ in 1..SCRIPTED_WINDOW_BARS {
        ohlc.push((100.0, 100.5, 99.5, 100.0));
    }
    match outcome {
        ScriptedOutcome::Quiet => {
            for _ in 0..15 {
                ohlc.push((100.0, 100.8, 99.2, 100.2));
            }
        }
        _ => {
            ohlc.push((100.5, 101.6, 100.4, 101.5));
            ohlc.push((101.6, 101.8, 101.4, 101.7));
            ohlc.push(match outcome {
                ScriptedOutcome::Win => (101.7, 104.5, 101.0, 104.0),
                ScriptedOutcome::Loss => (101.5, 101.7, 98.5, 98.8),
                _ => (101.7, 102.3, 101.6, 102.0),
            });
            for _ in 0..12 {
                ohlc.push((102.0, 102.2, 101.8, 102.0));
            }
        }
    }

    ohlc.into_iter()
        .enumerate()
        .filter_map(|(i, (o, h, l, c))| {
            let time = window_start + Duration::minutes(i as i64);
            calendar
                .to_utc(date, time)
                .map(|ts| PriceBar::new(ts, o, h, l, c))
        })
        .collect()
}
