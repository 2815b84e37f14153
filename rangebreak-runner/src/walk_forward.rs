//! Walk-forward calendar split — train | validation | test by trading-day count.
//!
//! Slices are chronological and disjoint. `embargo_days` trading days are
//! dropped between consecutive slices so that a trade resolving late on the
//! last train day cannot inform the first validation day.

use std::ops::Range;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rangebreak_core::TradingDay;

use crate::config::WalkForwardConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("{days} trading days leave the {slice} slice empty")]
    EmptySlice { days: usize, slice: &'static str },
}

/// Calendar bounds of one slice, for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceBounds {
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub trading_days: usize,
}

impl SliceBounds {
    pub fn of(days: &[TradingDay]) -> Option<Self> {
        Some(Self {
            first_day: days.first()?.date,
            last_day: days.last()?.date,
            trading_days: days.len(),
        })
    }
}

/// Index ranges into the sorted trading days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSplit {
    pub train: Range<usize>,
    pub validation: Range<usize>,
    pub test: Range<usize>,
}

impl CalendarSplit {
    pub fn new(total_days: usize, config: &WalkForwardConfig) -> Result<Self, SplitError> {
        let n = total_days as f64;
        let n_train = (n * config.train_fraction).round() as usize;
        let n_validation = (n * config.validation_fraction).round() as usize;
        let embargo = config.embargo_days;

        let train = 0..n_train.min(total_days);
        let validation_start = (train.end + embargo).min(total_days);
        let validation = validation_start..(validation_start + n_validation).min(total_days);
        let test_start = (validation.end + embargo).min(total_days);
        let test = test_start..total_days;

        for (slice, range) in [("train", &train), ("validation", &validation), ("test", &test)] {
            if range.is_empty() {
                return Err(SplitError::EmptySlice {
                    days: total_days,
                    slice,
                });
            }
        }
        Ok(Self {
            train,
            validation,
            test,
        })
    }

    pub fn train<'a>(&self, days: &'a [TradingDay]) -> &'a [TradingDay] {
        &days[self.train.clone()]
    }

    pub fn validation<'a>(&self, days: &'a [TradingDay]) -> &'a [TradingDay] {
        &days[self.validation.clone()]
    }

    pub fn test<'a>(&self, days: &'a [TradingDay]) -> &'a [TradingDay] {
        &days[self.test.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangebreak_core::data::weekdays;

    fn config(train: f64, validation: f64, embargo: usize) -> WalkForwardConfig {
        WalkForwardConfig {
            train_fraction: train,
            validation_fraction: validation,
            embargo_days: embargo,
            concept_min_expected_r: 0.0,
            test_min_expected_r: 0.0,
            max_degradation: 0.5,
            leakage_floor: -0.5,
            reject_on_suspected_leakage: false,
        }
    }

    fn days(n: usize) -> Vec<TradingDay> {
        weekdays(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), n)
            .into_iter()
            .map(|date| TradingDay { date, bars: Vec::new() })
            .collect()
    }

    #[test]
    fn thirds_without_embargo() {
        let split = CalendarSplit::new(120, &config(0.3333333333, 0.3333333333, 0)).unwrap();
        assert_eq!(split.train, 0..40);
        assert_eq!(split.validation, 40..80);
        assert_eq!(split.test, 80..120);
    }

    #[test]
    fn embargo_gaps_are_dropped() {
        let split = CalendarSplit::new(100, &config(0.5, 0.2, 3)).unwrap();
        assert_eq!(split.train, 0..50);
        assert_eq!(split.validation, 53..73);
        assert_eq!(split.test, 76..100);
    }

    #[test]
    fn slices_are_chronological_and_disjoint() {
        let all = days(60);
        let split = CalendarSplit::new(all.len(), &config(0.5, 0.25, 1)).unwrap();
        let (train, validation, test) =
            (split.train(&all), split.validation(&all), split.test(&all));
        assert!(train.last().unwrap().date < validation.first().unwrap().date);
        assert!(validation.last().unwrap().date < test.first().unwrap().date);
        assert_eq!(SliceBounds::of(test).unwrap().trading_days, test.len());
    }

    #[test]
    fn too_few_days_fail() {
        assert_eq!(
            CalendarSplit::new(3, &config(0.34, 0.33, 1)),
            Err(SplitError::EmptySlice { days: 3, slice: "test" })
        );
    }
}
