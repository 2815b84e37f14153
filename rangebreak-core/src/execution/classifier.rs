//! Outcome classifier — pure stop/target resolution over a bar path.
//!
//! Rules, in order:
//! - direction NONE or degenerate geometry ⇒ NO_TRADE
//! - first bar touching the target ⇒ WIN, first bar touching the stop ⇒ LOSS
//! - a bar touching both ⇒ LOSS (conservative tie-break)
//! - path exhausted ⇒ OPEN

use chrono::{DateTime, Utc};

use crate::domain::{Direction, Outcome, PriceBar};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub outcome: Outcome,
    /// Timestamp of the resolving bar (WIN/LOSS only).
    pub resolved_at: Option<DateTime<Utc>>,
    pub same_bar_tie: bool,
}

impl Classification {
    fn no_trade() -> Self {
        Self {
            outcome: Outcome::NoTrade,
            resolved_at: None,
            same_bar_tie: false,
        }
    }
}

/// Classify a trade entered at `entry` against the bars that follow the
/// entry bar. The entry bar itself must not be part of `bars`.
pub fn classify(
    bars: &[PriceBar],
    entry: f64,
    stop: f64,
    target: f64,
    direction: Direction,
) -> Classification {
    let sign = direction.sign();
    let geometry_valid = entry.is_finite()
        && stop.is_finite()
        && target.is_finite()
        && sign * (entry - stop) > 0.0
        && sign * (target - entry) > 0.0;
    if !geometry_valid {
        return Classification::no_trade();
    }

    for bar in bars {
        // direction is UP or DOWN past the geometry check
        let (hit_target, hit_stop) = if direction == Direction::Up {
            (bar.high >= target, bar.low <= stop)
        } else {
            (bar.low <= target, bar.high >= stop)
        };
        match (hit_target, hit_stop) {
            (_, true) => {
                return Classification {
                    outcome: Outcome::Loss,
                    resolved_at: Some(bar.timestamp),
                    same_bar_tie: hit_target,
                }
            }
            (true, false) => {
                return Classification {
                    outcome: Outcome::Win,
                    resolved_at: Some(bar.timestamp),
                    same_bar_tie: false,
                }
            }
            (false, false) => {}
        }
    }

    Classification {
        outcome: Outcome::Open,
        resolved_at: None,
        same_bar_tie: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn path(hl: &[(f64, f64)]) -> Vec<PriceBar> {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap();
        hl.iter()
            .enumerate()
            .map(|(i, &(h, l))| PriceBar::new(t0 + Duration::minutes(i as i64), l, h, l, h))
            .collect()
    }

    #[test]
    fn target_first_is_win() {
        let bars = path(&[(105.0, 99.0), (111.0, 101.0), (100.0, 80.0)]);
        let c = classify(&bars, 100.0, 95.0, 110.0, Direction::Up);
        assert_eq!(c.outcome, Outcome::Win);
        assert_eq!(c.resolved_at, Some(bars[1].timestamp));
        assert!(!c.same_bar_tie);
    }

    #[test]
    fn stop_first_is_loss() {
        let bars = path(&[(104.0, 94.0), (120.0, 101.0)]);
        assert_eq!(classify(&bars, 100.0, 95.0, 110.0, Direction::Up).outcome, Outcome::Loss);
    }

    #[test]
    fn both_in_one_bar_is_loss() {
        let bars = path(&[(112.0, 90.0)]);
        let c = classify(&bars, 100.0, 95.0, 110.0, Direction::Up);
        assert_eq!(c.outcome, Outcome::Loss);
        assert!(c.same_bar_tie);
    }

    #[test]
    fn unresolved_path_is_open() {
        let bars = path(&[(104.0, 96.0), (103.0, 97.0)]);
        assert_eq!(classify(&bars, 100.0, 95.0, 110.0, Direction::Up).outcome, Outcome::Open);
        assert_eq!(classify(&[], 100.0, 95.0, 110.0, Direction::Up).outcome, Outcome::Open);
    }

    #[test]
    fn short_side_is_mirrored() {
        let bars = path(&[(101.0, 89.0)]);
        assert_eq!(classify(&bars, 100.0, 105.0, 90.0, Direction::Down).outcome, Outcome::Win);
        let bars = path(&[(105.0, 95.0)]);
        assert_eq!(classify(&bars, 100.0, 105.0, 90.0, Direction::Down).outcome, Outcome::Loss);
    }

    #[test]
    fn touching_exactly_counts() {
        let bars = path(&[(110.0, 96.0)]);
        assert_eq!(classify(&bars, 100.0, 95.0, 110.0, Direction::Up).outcome, Outcome::Win);
    }

    #[test]
    fn degenerate_geometry_is_no_trade() {
        let bars = path(&[(200.0, 1.0)]);
        // zero risk
        assert_eq!(classify(&bars, 100.0, 100.0, 110.0, Direction::Up).outcome, Outcome::NoTrade);
        // stop on the wrong side
        assert_eq!(classify(&bars, 100.0, 101.0, 110.0, Direction::Up).outcome, Outcome::NoTrade);
        assert_eq!(classify(&bars, 100.0, 95.0, 110.0, Direction::None).outcome, Outcome::NoTrade);
    }
}
