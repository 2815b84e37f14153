//! Canonicalization: sort, de-duplicate, and drop insane bars.
//!
//! Nothing is ever synthesized. A duplicate timestamp keeps the first bar
//! seen; a bar failing the OHLC sanity check is dropped and counted.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::PriceBar;

/// What canonicalization removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalReport {
    pub input: usize,
    pub duplicates_dropped: usize,
    pub insane_dropped: usize,
    pub output: usize,
}

impl CanonicalReport {
    pub fn is_clean(&self) -> bool {
        self.duplicates_dropped == 0 && self.insane_dropped == 0
    }
}

pub fn canonicalize(bars: Vec<PriceBar>) -> (Vec<PriceBar>, CanonicalReport) {
    let input = bars.len();
    // insane bars go first so they never shadow a sane duplicate
    let mut sane: Vec<PriceBar> = bars.into_iter().filter(PriceBar::is_sane).collect();
    let insane_dropped = input - sane.len();
    // stable: first occurrence of a timestamp stays first
    sane.sort_by_key(|b| b.timestamp);

    let mut out: Vec<PriceBar> = Vec::with_capacity(sane.len());
    let mut duplicates_dropped = 0;
    for bar in sane {
        if out.last().is_some_and(|last| last.timestamp == bar.timestamp) {
            duplicates_dropped += 1;
            continue;
        }
        out.push(bar);
    }

    let report = CanonicalReport {
        input,
        duplicates_dropped,
        insane_dropped,
        output: out.len(),
    };
    (out, report)
}

/// Canonicalize and log anything that was dropped.
pub(crate) fn canonicalize_logged(
    source: &str,
    instrument: &str,
    bars: Vec<PriceBar>,
) -> Vec<PriceBar> {
    let (bars, report) = canonicalize(bars);
    if !report.is_clean() {
        warn!(
            source,
            instrument,
            duplicates = report.duplicates_dropped,
            insane = report.insane_dropped,
            kept = report.output,
            "dropped bars during canonicalization"
        );
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(minute: i64, close: f64) -> PriceBar {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 8, 14, 30, 0).unwrap();
        PriceBar::new(t0 + Duration::minutes(minute), close, close + 0.5, close - 0.5, close)
    }

    #[test]
    fn sorts_by_timestamp() {
        let (bars, report) = canonicalize(vec![bar(2, 102.0), bar(0, 100.0), bar(1, 101.0)]);
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![100.0, 101.0, 102.0]);
        assert!(report.is_clean());
    }

    #[test]
    fn duplicate_keeps_first_seen() {
        let (bars, report) = canonicalize(vec![bar(0, 100.0), bar(1, 101.0), bar(0, 200.0)]);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 100.0);
        assert_eq!(report.duplicates_dropped, 1);
    }

    #[test]
    fn insane_bars_are_dropped_and_counted() {
        let mut broken = bar(1, 101.0);
        broken.high = 90.0;
        let mut void = bar(2, 102.0);
        void.close = f64::NAN;
        let (bars, report) = canonicalize(vec![bar(0, 100.0), broken, void, bar(3, 103.0)]);
        assert_eq!(bars.len(), 2);
        assert_eq!(report.insane_dropped, 2);
        assert_eq!(report.input, 4);
        assert_eq!(report.output, 2);
    }

    #[test]
    fn sane_duplicate_survives_an_insane_first_copy() {
        let mut broken = bar(1, 101.0);
        broken.high = 90.0;
        let (bars, report) = canonicalize(vec![bar(0, 100.0), broken, bar(1, 101.5)]);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].timestamp, bar(1, 0.0).timestamp);
        assert_eq!(bars[1].close, 101.5);
        assert_eq!(report.insane_dropped, 1);
        assert_eq!(report.duplicates_dropped, 0);
    }

    #[test]
    fn gaps_are_not_filled() {
        let (bars, _) = canonicalize(vec![bar(0, 100.0), bar(5, 101.0)]);
        assert_eq!(bars.len(), 2);
    }
}
