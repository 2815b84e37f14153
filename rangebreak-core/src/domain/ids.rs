use serde::{Deserialize, Serialize};
use std::fmt;

/// Registry identifier of a candidate rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StrategyId(pub String);

impl StrategyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a daily opening-range window definition (e.g. `"rth_15m"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WindowId(pub String);

impl WindowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic run ID (spec fingerprint + dataset hash + seed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId {
    pub spec_hash: String,
    pub dataset_hash: String,
    pub seed: u64,
}

impl RunId {
    pub fn new(spec_hash: impl Into<String>, dataset_hash: impl Into<String>, seed: u64) -> Self {
        Self {
            spec_hash: spec_hash.into(),
            dataset_hash: dataset_hash.into(),
            seed,
        }
    }

    /// Stable BLAKE3 hash of the canonical JSON form.
    pub fn hash(&self) -> String {
        let canonical = serde_json::json!({
            "dataset_hash": &self.dataset_hash,
            "seed": self.seed,
            "spec_hash": &self.spec_hash,
        });
        blake3::hash(canonical.to_string().as_bytes())
            .to_hex()
            .to_string()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.spec_hash, self.dataset_hash, self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_hash_is_deterministic() {
        let a = RunId::new("abc123", "def456", 42);
        let b = RunId::new("abc123", "def456", 42);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn run_id_hash_changes_with_seed() {
        let a = RunId::new("abc123", "def456", 42);
        let b = RunId::new("abc123", "def456", 43);
        assert_ne!(a.hash(), b.hash());
    }
}
