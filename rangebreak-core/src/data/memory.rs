//! In-memory bar source for fixtures, synthetic data, and benchmarks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::canonicalize::canonicalize_logged;
use super::provider::{clip, BarSource, DataError};
use crate::domain::PriceBar;

#[derive(Debug, Clone, Default)]
pub struct InMemoryBarSource {
    series: BTreeMap<String, Vec<PriceBar>>,
}

impl InMemoryBarSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bars for `instrument`, canonicalized once on insert.
    pub fn insert(&mut self, instrument: impl Into<String>, bars: Vec<PriceBar>) {
        let instrument = instrument.into();
        let bars = canonicalize_logged("memory", &instrument, bars);
        self.series.insert(instrument, bars);
    }

    pub fn with_series(mut self, instrument: impl Into<String>, bars: Vec<PriceBar>) -> Self {
        self.insert(instrument, bars);
        self
    }
}

impl BarSource for InMemoryBarSource {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(
        &self,
        instrument: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>, DataError> {
        let bars = self
            .series
            .get(instrument)
            .map(|bars| clip(bars.clone(), start, end))
            .unwrap_or_default();
        if bars.is_empty() {
            return Err(DataError::NoData {
                instrument: instrument.to_string(),
                start,
                end,
            });
        }
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn load_clips_to_half_open_range() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 8, 14, 30, 0).unwrap();
        let bars = (0..10)
            .map(|i| PriceBar::new(t0 + Duration::minutes(i), 100.0, 101.0, 99.0, 100.0))
            .collect();
        let source = InMemoryBarSource::new().with_series("ES", bars);
        let loaded = source
            .load("ES", t0 + Duration::minutes(2), t0 + Duration::minutes(5))
            .unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].timestamp, t0 + Duration::minutes(2));
    }

    #[test]
    fn unknown_instrument_is_no_data() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        let source = InMemoryBarSource::new();
        assert!(matches!(
            source.load("NQ", t0, t0 + Duration::days(1)),
            Err(DataError::NoData { .. })
        ));
    }
}
