//! Breakout signal detection.
//!
//! The signal is the first bar after the window whose close lies strictly
//! outside the opening range. Intrabar wicks do not count. After the first
//! break the day is decided; later re-breaks are ignored.

use crate::domain::{BreakoutSignal, Direction, OpeningRange};
use crate::session::{SessionCalendar, TradingDay, WindowDefinition};

/// Scan post-window bars of `day` for the first close outside `range`.
///
/// Returns `Direction::None` for an unbreakable (zero-size) range or a day
/// that never closes outside it.
pub fn detect_breakout(
    day: &TradingDay,
    range: &OpeningRange,
    window: &WindowDefinition,
    calendar: &SessionCalendar,
) -> BreakoutSignal {
    if range.is_unbreakable() {
        return BreakoutSignal::none(day.date, range.window_id.clone());
    }

    let first_break = day
        .bars
        .iter()
        .filter(|bar| window.is_after(calendar.local_time(bar.timestamp)))
        .find_map(|bar| {
            if bar.close > range.high {
                Some((Direction::Up, bar))
            } else if bar.close < range.low {
                Some((Direction::Down, bar))
            } else {
                None
            }
        });

    match first_break {
        Some((direction, bar)) => BreakoutSignal {
            trading_day: day.date,
            window_id: range.window_id.clone(),
            direction,
            signal_bar_timestamp: Some(bar.timestamp),
            signal_close: Some(bar.close),
        },
        None => BreakoutSignal::none(day.date, range.window_id.clone()),
    }
}

/// Index of the signal bar within `day.bars`.
pub fn signal_bar_index(day: &TradingDay, signal: &BreakoutSignal) -> Option<usize> {
    let ts = signal.signal_bar_timestamp?;
    day.bars.iter().position(|bar| bar.timestamp == ts)
}
