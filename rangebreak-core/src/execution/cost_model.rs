//! Cost model — round-trip friction per instrument.
//!
//! Friction is a single round-trip figure in price points:
//! fixed commission (converted to points), the spread paid on both entry and
//! exit, and a conservative slippage constant. It is embedded into both legs
//! of the trade: it widens realized risk and shrinks realized reward.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CostError {
    #[error("cost profile `{0}` is not configured")]
    UnknownProfile(String),
    #[error("cost profile `{profile}`: `{field}` must be positive and finite, got {value}")]
    NonPositive {
        profile: String,
        field: &'static str,
        value: f64,
    },
    #[error("cost profile `{profile}`: `{field}` must be non-negative and finite, got {value}")]
    Negative {
        profile: String,
        field: &'static str,
        value: f64,
    },
    #[error("cost profile `{profile}`: round-trip friction must be positive, got {points} points")]
    ZeroFriction { profile: String, points: f64 },
}

/// Per-instrument friction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CostModel {
    pub instrument: String,
    /// Currency value of one full price point per contract.
    pub point_value: f64,
    pub tick_size: f64,
    /// Commission in currency for entry plus exit.
    pub commission_round_trip: f64,
    /// One-way spread in points; charged twice.
    pub spread_points: f64,
    pub slippage_points: f64,
}

/// Friction of one round trip, relative to a given risk distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Friction {
    pub points: f64,
    pub dollars: f64,
    /// Friction as a fraction of the theoretical risk.
    pub friction_r: f64,
}

/// Trade legs in currency with friction embedded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealizedLegs {
    pub friction: Friction,
    pub risk_dollars: f64,
    pub reward_dollars: f64,
}

impl RealizedLegs {
    /// Realized reward / realized risk: the R multiple of a win.
    pub fn realized_rr(&self) -> f64 {
        self.reward_dollars / self.risk_dollars
    }
}

impl CostModel {
    /// Zero-cost model; realized R equals the theoretical ratio. Never passes
    /// [`CostModel::validate`].
    #[cfg(test)]
    pub fn frictionless(instrument: impl Into<String>, point_value: f64, tick_size: f64) -> Self {
        Self {
            instrument: instrument.into(),
            point_value,
            tick_size,
            commission_round_trip: 0.0,
            spread_points: 0.0,
            slippage_points: 0.0,
        }
    }

    pub fn validate(&self, profile: &str) -> Result<(), CostError> {
        let positive = [("point_value", self.point_value), ("tick_size", self.tick_size)];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(CostError::NonPositive {
                    profile: profile.to_string(),
                    field,
                    value,
                });
            }
        }
        let non_negative = [
            ("commission_round_trip", self.commission_round_trip),
            ("spread_points", self.spread_points),
            ("slippage_points", self.slippage_points),
        ];
        for (field, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(CostError::Negative {
                    profile: profile.to_string(),
                    field,
                    value,
                });
            }
        }
        let points = self.friction_points();
        if !(points.is_finite() && points > 0.0) {
            return Err(CostError::ZeroFriction {
                profile: profile.to_string(),
                points,
            });
        }
        Ok(())
    }

    /// Round-trip friction in price points.
    pub fn friction_points(&self) -> f64 {
        2.0 * self.spread_points
            + self.slippage_points
            + self.commission_round_trip / self.point_value
    }

    pub fn dollarize(&self, points: f64) -> f64 {
        points * self.point_value
    }

    /// Friction for a trade with the given theoretical distances.
    ///
    /// Friction is the same for every trade on the instrument; the distances
    /// only determine how large it is relative to the risk.
    pub fn cost(&self, risk_points: f64, _reward_points: f64) -> Friction {
        let points = self.friction_points();
        Friction {
            points,
            dollars: self.dollarize(points),
            friction_r: if risk_points > 0.0 { points / risk_points } else { f64::INFINITY },
        }
    }

    /// Embed friction into both legs.
    pub fn realize(&self, risk_points: f64, reward_points: f64) -> RealizedLegs {
        let friction = self.cost(risk_points, reward_points);
        RealizedLegs {
            friction,
            risk_dollars: self.dollarize(risk_points) + friction.dollars,
            reward_dollars: self.dollarize(reward_points) - friction.dollars,
        }
    }

    /// Copy with every friction component scaled by `multiplier`.
    pub fn stressed(&self, multiplier: f64) -> Self {
        Self {
            commission_round_trip: self.commission_round_trip * multiplier,
            spread_points: self.spread_points * multiplier,
            slippage_points: self.slippage_points * multiplier,
            ..self.clone()
        }
    }
}

/// Immutable profile-keyed cost table, shared across workers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostTable {
    profiles: Arc<BTreeMap<String, CostModel>>,
}

impl CostTable {
    /// Build a table, validating every profile.
    pub fn new(profiles: BTreeMap<String, CostModel>) -> Result<Self, CostError> {
        for (name, model) in &profiles {
            model.validate(name)?;
        }
        Ok(Self {
            profiles: Arc::new(profiles),
        })
    }

    pub fn get(&self, profile: &str) -> Result<&CostModel, CostError> {
        self.profiles
            .get(profile)
            .ok_or_else(|| CostError::UnknownProfile(profile.to_string()))
    }

    pub fn contains(&self, profile: &str) -> bool {
        self.profiles.contains_key(profile)
    }

    /// `(cost_points, cost_dollars)` for a trade on `profile`.
    pub fn cost(
        &self,
        profile: &str,
        risk_points: f64,
        reward_points: f64,
    ) -> Result<(f64, f64), CostError> {
        let friction = self.get(profile)?.cost(risk_points, reward_points);
        Ok((friction.points, friction.dollars))
    }

    pub fn profiles(&self) -> impl Iterator<Item = (&String, &CostModel)> {
        self.profiles.iter()
    }
}
