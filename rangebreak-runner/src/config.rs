//! Run configuration — a single TOML file, parsed once and validated once.
//!
//! Every field is required. There are no defaults: a missing key is a parse
//! error and an out-of-range value is a [`ConfigError`], both raised before
//! any bar is read.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rangebreak_core::domain::{SizeFilter, StopMode, WindowId};
use rangebreak_core::execution::{CostError, CostModel, CostTable};
use rangebreak_core::{SessionCalendar, SessionError, WindowDefinition};

/// Errors from loading or validating a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse run config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Cost(#[from] CostError),
    #[error("window `{0}` is defined more than once")]
    DuplicateWindow(String),
    #[error("instrument {instrument} has more than one cost profile: `{first}` and `{second}`")]
    DuplicateInstrumentCosts {
        instrument: String,
        first: String,
        second: String,
    },
    #[error("`{field}` is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("failed to hash run config: {0}")]
    Hash(#[from] serde_json::Error),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

// ─── Sections ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalendarConfig {
    /// IANA timezone of the exchange, e.g. `America/New_York`.
    pub timezone: String,
    pub session_start: NaiveTime,
    pub session_end: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregationConfig {
    /// Resolved trades (WIN + LOSS) required before expectancy is reported.
    pub min_sample: usize,
    /// Friction multipliers for cost-stress variants, e.g. `[1.25, 1.5]`.
    pub stress_multipliers: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaselineConfig {
    pub draws_per_day: u32,
    /// Win rate the strategy must exceed the baseline by.
    pub win_rate_margin: f64,
    /// Expected R the strategy must exceed the baseline by.
    pub expected_r_margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WalkForwardConfig {
    pub train_fraction: f64,
    pub validation_fraction: f64,
    /// Trading days dropped between consecutive slices.
    pub embargo_days: usize,
    pub concept_min_expected_r: f64,
    pub test_min_expected_r: f64,
    /// Maximum tolerated `(train - test) / train`.
    pub max_degradation: f64,
    /// Degradation below this is suspiciously good.
    pub leakage_floor: f64,
    pub reject_on_suspected_leakage: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    pub reward_risk_ratios: Vec<f64>,
    pub stop_modes: Vec<StopMode>,
    /// Size filters to try. The unfiltered variant is tried first when
    /// `include_unfiltered` is set.
    pub size_filters: Vec<SizeFilter>,
    pub include_unfiltered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Rayon worker threads.
    pub workers: usize,
}

// ─── RunConfig ───────────────────────────────────────────────────────

/// The run file as written by a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub calendar: CalendarConfig,
    pub windows: Vec<WindowDefinition>,
    pub costs: BTreeMap<String, CostModel>,
    pub aggregation: AggregationConfig,
    pub baseline: BaselineConfig,
    pub walk_forward: WalkForwardConfig,
    pub grid: GridConfig,
    pub execution: ExecutionConfig,
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Stable BLAKE3 hash of the canonical JSON form.
    pub fn config_hash(&self) -> Result<String, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    /// Validate every section and build the immutable run settings.
    pub fn resolve(self) -> Result<ResolvedConfig, ConfigError> {
        let config_hash = self.config_hash()?;

        let timezone = SessionCalendar::parse_timezone(&self.calendar.timezone)?;
        let calendar = SessionCalendar::new(
            timezone,
            self.calendar.session_start,
            self.calendar.session_end,
        )?;

        let mut windows = BTreeMap::new();
        for window in self.windows {
            window.validate(&calendar)?;
            if windows.contains_key(&window.id) {
                return Err(ConfigError::DuplicateWindow(window.id.0));
            }
            windows.insert(window.id.clone(), window);
        }
        if windows.is_empty() {
            return Err(invalid("windows", "at least one window is required"));
        }

        let costs = CostTable::new(self.costs)?;
        if costs.profiles().next().is_none() {
            return Err(invalid("costs", "at least one cost profile is required"));
        }
        // friction is per instrument: one profile each
        let mut owners: BTreeMap<&str, &String> = BTreeMap::new();
        for (profile, model) in costs.profiles() {
            if let Some(first) = owners.insert(model.instrument.as_str(), profile) {
                return Err(ConfigError::DuplicateInstrumentCosts {
                    instrument: model.instrument.clone(),
                    first: first.clone(),
                    second: profile.clone(),
                });
            }
        }

        validate_aggregation(&self.aggregation)?;
        validate_baseline(&self.baseline)?;
        validate_walk_forward(&self.walk_forward)?;
        validate_grid(&self.grid)?;
        if self.execution.workers == 0 {
            return Err(invalid("execution.workers", "must be at least 1"));
        }

        Ok(ResolvedConfig {
            calendar,
            windows,
            costs,
            aggregation: self.aggregation,
            baseline: self.baseline,
            walk_forward: self.walk_forward,
            grid: self.grid,
            execution: self.execution,
            config_hash,
        })
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, format!("must be finite, got {value}")))
    }
}

fn validate_aggregation(c: &AggregationConfig) -> Result<(), ConfigError> {
    if c.min_sample == 0 {
        return Err(invalid("aggregation.min_sample", "must be at least 1"));
    }
    for &m in &c.stress_multipliers {
        if !(m.is_finite() && m > 0.0) {
            return Err(invalid(
                "aggregation.stress_multipliers",
                format!("multiplier {m} must be positive"),
            ));
        }
    }
    Ok(())
}

fn validate_baseline(c: &BaselineConfig) -> Result<(), ConfigError> {
    if c.draws_per_day == 0 {
        return Err(invalid("baseline.draws_per_day", "must be at least 1"));
    }
    finite("baseline.win_rate_margin", c.win_rate_margin)?;
    finite("baseline.expected_r_margin", c.expected_r_margin)
}

fn validate_walk_forward(c: &WalkForwardConfig) -> Result<(), ConfigError> {
    for (field, value) in [
        ("walk_forward.train_fraction", c.train_fraction),
        ("walk_forward.validation_fraction", c.validation_fraction),
    ] {
        if !(value.is_finite() && value > 0.0 && value < 1.0) {
            return Err(invalid(field, format!("must lie in (0, 1), got {value}")));
        }
    }
    if c.train_fraction + c.validation_fraction >= 1.0 {
        return Err(invalid(
            "walk_forward",
            "train_fraction + validation_fraction must leave a test slice",
        ));
    }
    finite("walk_forward.concept_min_expected_r", c.concept_min_expected_r)?;
    finite("walk_forward.test_min_expected_r", c.test_min_expected_r)?;
    finite("walk_forward.max_degradation", c.max_degradation)?;
    finite("walk_forward.leakage_floor", c.leakage_floor)?;
    if c.test_min_expected_r < c.concept_min_expected_r {
        return Err(invalid(
            "walk_forward.test_min_expected_r",
            format!(
                "{} is below concept_min_expected_r {}",
                c.test_min_expected_r, c.concept_min_expected_r
            ),
        ));
    }
    if c.leakage_floor > c.max_degradation {
        return Err(invalid(
            "walk_forward.leakage_floor",
            "must not exceed max_degradation",
        ));
    }
    Ok(())
}

fn validate_grid(c: &GridConfig) -> Result<(), ConfigError> {
    if c.reward_risk_ratios.is_empty() {
        return Err(invalid("grid.reward_risk_ratios", "must not be empty"));
    }
    for &rr in &c.reward_risk_ratios {
        if !(rr.is_finite() && rr > 0.0) {
            return Err(invalid(
                "grid.reward_risk_ratios",
                format!("ratio {rr} must be positive"),
            ));
        }
    }
    if c.stop_modes.is_empty() {
        return Err(invalid("grid.stop_modes", "must not be empty"));
    }
    if c.size_filters.is_empty() && !c.include_unfiltered {
        return Err(invalid(
            "grid.size_filters",
            "no size filters and the unfiltered variant is excluded",
        ));
    }
    Ok(())
}

// ─── ResolvedConfig ──────────────────────────────────────────────────

/// Validated run settings, constructed once per run and passed explicitly.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub calendar: SessionCalendar,
    pub windows: BTreeMap<WindowId, WindowDefinition>,
    pub costs: CostTable,
    pub aggregation: AggregationConfig,
    pub baseline: BaselineConfig,
    pub walk_forward: WalkForwardConfig,
    pub grid: GridConfig,
    pub execution: ExecutionConfig,
    pub config_hash: String,
}

impl ResolvedConfig {
    pub fn window(&self, id: &WindowId) -> Option<&WindowDefinition> {
        self.windows.get(id)
    }
}
