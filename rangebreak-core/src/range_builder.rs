//! Range builder — high/low of the opening window for one trading day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{OpeningRange, WindowId};
use crate::session::{SessionCalendar, TradingDay, WindowDefinition};

/// A trading day whose window data cannot support a range.
///
/// Degrades only the affected day; never aborts a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum DataGapError {
    #[error("{day} window `{window}`: {found} of {expected} bars present (minimum {min})")]
    IncompleteWindow {
        day: NaiveDate,
        window: WindowId,
        found: usize,
        expected: usize,
        min: usize,
    },
    #[error("{day} window `{window}`: bar with non-finite price inside the window")]
    VoidBar { day: NaiveDate, window: WindowId },
}

impl DataGapError {
    pub fn day(&self) -> NaiveDate {
        match self {
            DataGapError::IncompleteWindow { day, .. } | DataGapError::VoidBar { day, .. } => *day,
        }
    }
}

/// Compute the opening range of `day` for `window`.
///
/// Bars in `[window.start, window.end)` local time are considered. A window
/// with fewer than `expected_bars - allowed_missing_bars` bars is
/// incomplete: partial sessions and holidays never yield a spurious range.
pub fn build_opening_range(
    day: &TradingDay,
    window: &WindowDefinition,
    calendar: &SessionCalendar,
) -> Result<OpeningRange, DataGapError> {
    let mut high = f64::NEG_INFINITY;
    let mut low = f64::INFINITY;
    let mut count = 0usize;

    for bar in &day.bars {
        let time = calendar.local_time(bar.timestamp);
        if !window.contains(time) {
            continue;
        }
        if bar.is_void() {
            return Err(DataGapError::VoidBar {
                day: day.date,
                window: window.id.clone(),
            });
        }
        high = high.max(bar.high);
        low = low.min(bar.low);
        count += 1;
    }

    let min = window.min_bars();
    if count == 0 || count < min {
        return Err(DataGapError::IncompleteWindow {
            day: day.date,
            window: window.id.clone(),
            found: count,
            expected: window.expected_bars(),
            min,
        });
    }

    Ok(OpeningRange::new(day.date, window.id.clone(), high, low, count))
}
