//! StrategySpec — the validated, authoritative description of a candidate rule.
//!
//! The registry delivers a [`RawStrategySpec`] in which every field is
//! optional. [`StrategySpec::from_raw`] is the only way to obtain a
//! `StrategySpec`; it fails with a [`SpecError`] naming the first missing or
//! invalid field. No field ever falls back to a default value.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{StrategyId, WindowId};
use super::signal::DirectionFilter;

/// Where the protective stop is placed relative to the opening range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopMode {
    /// Opposite edge of the range.
    Full,
    /// Range midpoint.
    Half,
}

/// Optional bounds on the opening-range size, in price points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizeFilter {
    pub min_points: Option<f64>,
    pub max_points: Option<f64>,
}

impl SizeFilter {
    pub fn contains(&self, size: f64) -> bool {
        self.min_points.map_or(true, |min| size >= min)
            && self.max_points.map_or(true, |max| size <= max)
    }
}

/// Configuration errors. Always fatal for the strategy they belong to.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpecError {
    #[error("strategy '{strategy}': required field `{field}` is missing")]
    MissingField {
        strategy: String,
        field: &'static str,
    },
    #[error("strategy '{strategy}': field `{field}` is empty")]
    EmptyField {
        strategy: String,
        field: &'static str,
    },
    #[error("strategy '{strategy}': field `{field}` must be a positive finite number, got {value}")]
    NonPositive {
        strategy: String,
        field: &'static str,
        value: f64,
    },
    #[error("strategy '{strategy}': size filter min {min} exceeds max {max}")]
    InvertedSizeFilter { strategy: String, min: f64, max: f64 },
    #[error("strategy '{strategy}': size filter has neither bound set")]
    EmptySizeFilter { strategy: String },
    #[error("strategy '{strategy}': unknown window `{window}`")]
    UnknownWindow { strategy: String, window: String },
    #[error("strategy '{strategy}': unknown cost profile `{profile}`")]
    UnknownCostProfile { strategy: String, profile: String },
    #[error("strategy '{strategy}' trades {instrument} but `{profile}` costs {profile_instrument}")]
    CostProfileInstrumentMismatch {
        strategy: String,
        instrument: String,
        profile: String,
        profile_instrument: String,
    },
    #[error("strategy '{0}' not found in registry")]
    NotFound(String),
}

/// Strategy description exactly as supplied by the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStrategySpec {
    pub strategy_id: Option<String>,
    pub instrument: Option<String>,
    pub window_id: Option<String>,
    pub direction_filter: Option<DirectionFilter>,
    pub reward_risk_ratio: Option<f64>,
    pub stop_mode: Option<StopMode>,
    pub size_filter: Option<SizeFilter>,
    pub cost_profile: Option<String>,
}

/// A fully validated strategy specification.
///
/// Fields are private so that every instance has passed validation.
/// Deserialization goes through [`RawStrategySpec`] and the same checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStrategySpec", into = "RawStrategySpec")]
pub struct StrategySpec {
    strategy_id: StrategyId,
    instrument: String,
    window_id: WindowId,
    direction_filter: DirectionFilter,
    reward_risk_ratio: f64,
    stop_mode: StopMode,
    size_filter: Option<SizeFilter>,
    cost_profile: String,
}

impl StrategySpec {
    pub fn from_raw(raw: RawStrategySpec) -> Result<Self, SpecError> {
        let strategy = raw
            .strategy_id
            .clone()
            .unwrap_or_else(|| "<unnamed>".to_string());

        let strategy_id = required_str(&strategy, "strategy_id", raw.strategy_id)?;
        let instrument = required_str(&strategy, "instrument", raw.instrument)?;
        let window_id = required_str(&strategy, "window_id", raw.window_id)?;
        let cost_profile = required_str(&strategy, "cost_profile", raw.cost_profile)?;
        let direction_filter = raw.direction_filter.ok_or_else(|| SpecError::MissingField {
            strategy: strategy.clone(),
            field: "direction_filter",
        })?;
        let stop_mode = raw.stop_mode.ok_or_else(|| SpecError::MissingField {
            strategy: strategy.clone(),
            field: "stop_mode",
        })?;
        let reward_risk_ratio = raw
            .reward_risk_ratio
            .ok_or_else(|| SpecError::MissingField {
                strategy: strategy.clone(),
                field: "reward_risk_ratio",
            })?;
        positive(&strategy, "reward_risk_ratio", reward_risk_ratio)?;

        if let Some(filter) = &raw.size_filter {
            validate_size_filter(&strategy, filter)?;
        }

        Ok(Self {
            strategy_id: StrategyId::new(strategy_id),
            instrument,
            window_id: WindowId::new(window_id),
            direction_filter,
            reward_risk_ratio,
            stop_mode,
            size_filter: raw.size_filter,
            cost_profile,
        })
    }

    /// Derive a variant with different tunable parameters (used by the grid
    /// search). The variant is validated exactly like a registry spec.
    pub fn with_parameters(
        &self,
        reward_risk_ratio: f64,
        stop_mode: StopMode,
        size_filter: Option<SizeFilter>,
    ) -> Result<Self, SpecError> {
        let mut raw = self.to_raw();
        raw.reward_risk_ratio = Some(reward_risk_ratio);
        raw.stop_mode = Some(stop_mode);
        raw.size_filter = size_filter;
        Self::from_raw(raw)
    }

    pub fn to_raw(&self) -> RawStrategySpec {
        RawStrategySpec {
            strategy_id: Some(self.strategy_id.0.clone()),
            instrument: Some(self.instrument.clone()),
            window_id: Some(self.window_id.0.clone()),
            direction_filter: Some(self.direction_filter),
            reward_risk_ratio: Some(self.reward_risk_ratio),
            stop_mode: Some(self.stop_mode),
            size_filter: self.size_filter,
            cost_profile: Some(self.cost_profile.clone()),
        }
    }

    pub fn strategy_id(&self) -> &StrategyId {
        &self.strategy_id
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn window_id(&self) -> &WindowId {
        &self.window_id
    }

    pub fn direction_filter(&self) -> DirectionFilter {
        self.direction_filter
    }

    pub fn reward_risk_ratio(&self) -> f64 {
        self.reward_risk_ratio
    }

    pub fn stop_mode(&self) -> StopMode {
        self.stop_mode
    }

    pub fn size_filter(&self) -> Option<&SizeFilter> {
        self.size_filter.as_ref()
    }

    pub fn cost_profile(&self) -> &str {
        &self.cost_profile
    }
}

impl TryFrom<RawStrategySpec> for StrategySpec {
    type Error = SpecError;

    fn try_from(raw: RawStrategySpec) -> Result<Self, Self::Error> {
        Self::from_raw(raw)
    }
}

impl From<StrategySpec> for RawStrategySpec {
    fn from(spec: StrategySpec) -> Self {
        spec.to_raw()
    }
}

fn required_str(
    strategy: &str,
    field: &'static str,
    value: Option<String>,
) -> Result<String, SpecError> {
    match value {
        None => Err(SpecError::MissingField {
            strategy: strategy.to_string(),
            field,
        }),
        Some(v) if v.trim().is_empty() => Err(SpecError::EmptyField {
            strategy: strategy.to_string(),
            field,
        }),
        Some(v) => Ok(v),
    }
}

fn positive(strategy: &str, field: &'static str, value: f64) -> Result<(), SpecError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SpecError::NonPositive {
            strategy: strategy.to_string(),
            field,
            value,
        })
    }
}

fn validate_size_filter(strategy: &str, filter: &SizeFilter) -> Result<(), SpecError> {
    if filter.min_points.is_none() && filter.max_points.is_none() {
        return Err(SpecError::EmptySizeFilter {
            strategy: strategy.to_string(),
        });
    }
    if let Some(min) = filter.min_points {
        positive(strategy, "size_filter.min_points", min)?;
    }
    if let Some(max) = filter.max_points {
        positive(strategy, "size_filter.max_points", max)?;
    }
    if let (Some(min), Some(max)) = (filter.min_points, filter.max_points) {
        if min > max {
            return Err(SpecError::InvertedSizeFilter {
                strategy: strategy.to_string(),
                min,
                max,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_raw() -> RawStrategySpec {
        RawStrategySpec {
            strategy_id: Some("es_orb_15".into()),
            instrument: Some("ES".into()),
            window_id: Some("rth_15m".into()),
            direction_filter: Some(DirectionFilter::Both),
            reward_risk_ratio: Some(1.5),
            stop_mode: Some(StopMode::Full),
            size_filter: None,
            cost_profile: Some("ES".into()),
        }
    }

    #[test]
    fn complete_spec_validates() {
        let spec = StrategySpec::from_raw(complete_raw()).unwrap();
        assert_eq!(spec.strategy_id().as_str(), "es_orb_15");
        assert_eq!(spec.reward_risk_ratio(), 1.5);
        assert_eq!(spec.stop_mode(), StopMode::Full);
    }

    #[test]
    fn missing_ratio_is_reported_not_defaulted() {
        let mut raw = complete_raw();
        raw.reward_risk_ratio = None;
        let err = StrategySpec::from_raw(raw).unwrap_err();
        assert_eq!(
            err,
            SpecError::MissingField {
                strategy: "es_orb_15".into(),
                field: "reward_risk_ratio"
            }
        );
    }

    #[test]
    fn zero_ratio_is_rejected() {
        let mut raw = complete_raw();
        raw.reward_risk_ratio = Some(0.0);
        assert!(matches!(
            StrategySpec::from_raw(raw),
            Err(SpecError::NonPositive { field: "reward_risk_ratio", .. })
        ));
    }

    #[test]
    fn nan_ratio_is_rejected() {
        let mut raw = complete_raw();
        raw.reward_risk_ratio = Some(f64::NAN);
        assert!(StrategySpec::from_raw(raw).is_err());
    }

    #[test]
    fn missing_stop_mode_is_reported() {
        let mut raw = complete_raw();
        raw.stop_mode = None;
        assert!(matches!(
            StrategySpec::from_raw(raw),
            Err(SpecError::MissingField { field: "stop_mode", .. })
        ));
    }

    #[test]
    fn blank_cost_profile_is_rejected() {
        let mut raw = complete_raw();
        raw.cost_profile = Some("  ".into());
        assert!(matches!(
            StrategySpec::from_raw(raw),
            Err(SpecError::EmptyField { field: "cost_profile", .. })
        ));
    }

    #[test]
    fn inverted_size_filter_is_rejected() {
        let mut raw = complete_raw();
        raw.size_filter = Some(SizeFilter {
            min_points: Some(10.0),
            max_points: Some(5.0),
        });
        assert!(matches!(
            StrategySpec::from_raw(raw),
            Err(SpecError::InvertedSizeFilter { .. })
        ));
    }

    #[test]
    fn with_parameters_revalidates() {
        let spec = StrategySpec::from_raw(complete_raw()).unwrap();
        let variant = spec.with_parameters(2.0, StopMode::Half, None).unwrap();
        assert_eq!(variant.reward_risk_ratio(), 2.0);
        assert_eq!(variant.stop_mode(), StopMode::Half);
        assert_eq!(variant.strategy_id(), spec.strategy_id());

        assert!(spec.with_parameters(-1.0, StopMode::Full, None).is_err());
    }

    #[test]
    fn deserialization_goes_through_validation() {
        let json = r#"{
            "strategy_id": "x", "instrument": "ES", "window_id": "w",
            "direction_filter": "BOTH", "reward_risk_ratio": 0.0, "stop_mode": "FULL",
            "size_filter": null, "cost_profile": "ES"
        }"#;
        assert!(serde_json::from_str::<StrategySpec>(json).is_err());
    }

    #[test]
    fn size_filter_bounds_are_inclusive() {
        let filter = SizeFilter {
            min_points: Some(4.0),
            max_points: Some(12.0),
        };
        assert!(filter.contains(4.0));
        assert!(filter.contains(12.0));
        assert!(!filter.contains(3.99));
        assert!(!filter.contains(12.01));
    }
}
