//! Strategy registry — lookup of human-authored strategy specs.
//!
//! The registry only delivers [`RawStrategySpec`]s. Turning one into a
//! runnable strategy goes through [`resolve_strategy`], which validates the
//! spec and checks that its window and cost profile exist in the run config.
//! Nothing here reads bars.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use rangebreak_core::domain::{RawStrategySpec, SpecError, StrategySpec};
use rangebreak_core::execution::CostModel;
use rangebreak_core::WindowDefinition;

use crate::config::ResolvedConfig;

/// Source of raw strategy specs, keyed by strategy id.
pub trait SpecSource: Send + Sync {
    fn lookup(&self, strategy_id: &str) -> Result<RawStrategySpec, SpecError>;
}

/// Errors from loading a registry file.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse registry: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("registry entry #{0} has no strategy_id")]
    MissingId(usize),
    #[error("strategy '{0}' is defined more than once")]
    Duplicate(String),
}

// ─── In-memory ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    specs: BTreeMap<String, RawStrategySpec>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `raw` under `strategy_id`, replacing any previous entry.
    pub fn insert(&mut self, strategy_id: impl Into<String>, raw: RawStrategySpec) {
        self.specs.insert(strategy_id.into(), raw);
    }

    pub fn with_spec(mut self, strategy_id: impl Into<String>, raw: RawStrategySpec) -> Self {
        self.insert(strategy_id, raw);
        self
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl SpecSource for InMemoryRegistry {
    fn lookup(&self, strategy_id: &str) -> Result<RawStrategySpec, SpecError> {
        self.specs
            .get(strategy_id)
            .cloned()
            .ok_or_else(|| SpecError::NotFound(strategy_id.to_string()))
    }
}

// ─── TOML file ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryFile {
    #[serde(default)]
    strategy: Vec<RawStrategySpec>,
}

/// Registry backed by a TOML file of `[[strategy]]` tables.
#[derive(Debug, Clone)]
pub struct TomlRegistry {
    inner: InMemoryRegistry,
}

impl TomlRegistry {
    pub fn from_toml_str(text: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = toml::from_str(text)?;
        let mut inner = InMemoryRegistry::new();
        for (index, raw) in file.strategy.into_iter().enumerate() {
            let id = match raw.strategy_id.as_deref() {
                Some(id) if !id.trim().is_empty() => id.to_string(),
                _ => return Err(RegistryError::MissingId(index)),
            };
            if inner.specs.contains_key(&id) {
                return Err(RegistryError::Duplicate(id));
            }
            inner.insert(id, raw);
        }
        Ok(Self { inner })
    }

    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn strategy_ids(&self) -> impl Iterator<Item = &str> {
        self.inner.specs.keys().map(String::as_str)
    }
}

impl SpecSource for TomlRegistry {
    fn lookup(&self, strategy_id: &str) -> Result<RawStrategySpec, SpecError> {
        self.inner.lookup(strategy_id)
    }
}

// ─── Resolution ──────────────────────────────────────────────────────

/// A validated spec together with the window and cost profile it names.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStrategy {
    pub spec: StrategySpec,
    pub window: WindowDefinition,
    pub costs: CostModel,
}

impl ResolvedStrategy {
    /// Same window and costs, different tunable parameters.
    pub fn with_spec(&self, spec: StrategySpec) -> Self {
        Self {
            spec,
            window: self.window.clone(),
            costs: self.costs.clone(),
        }
    }
}

/// Look up and fully validate a strategy against the run config.
pub fn resolve_strategy(
    source: &dyn SpecSource,
    strategy_id: &str,
    config: &ResolvedConfig,
) -> Result<ResolvedStrategy, SpecError> {
    let spec = StrategySpec::from_raw(source.lookup(strategy_id)?)?;
    let window = config
        .window(spec.window_id())
        .cloned()
        .ok_or_else(|| SpecError::UnknownWindow {
            strategy: spec.strategy_id().to_string(),
            window: spec.window_id().to_string(),
        })?;
    let costs = config
        .costs
        .get(spec.cost_profile())
        .cloned()
        .map_err(|_| SpecError::UnknownCostProfile {
            strategy: spec.strategy_id().to_string(),
            profile: spec.cost_profile().to_string(),
        })?;
    if costs.instrument != spec.instrument() {
        return Err(SpecError::CostProfileInstrumentMismatch {
            strategy: spec.strategy_id().to_string(),
            instrument: spec.instrument().to_string(),
            profile: spec.cost_profile().to_string(),
            profile_instrument: costs.instrument,
        });
    }
    Ok(ResolvedStrategy {
        spec,
        window,
        costs,
    })
}
