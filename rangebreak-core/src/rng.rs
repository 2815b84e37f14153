//! Deterministic RNG hierarchy.
//!
//! The master seed is derived from strategy identity. Sub-seeds for each
//! `(scope, trading day, draw)` tuple are derived via BLAKE3 hashing,
//! independently of scheduling order, so results are identical regardless of
//! thread count.

use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::domain::StrategyId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    /// Seed the hierarchy from a strategy id and its spec fingerprint.
    ///
    /// The same strategy tested with the same parameters always draws the
    /// same "random" entries.
    pub fn for_strategy(strategy_id: &StrategyId, spec_fingerprint: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(strategy_id.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(spec_fingerprint.as_bytes());
        Self::new(first_u64(hasher.finalize().as_bytes()))
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Sub-seed for one (scope, trading day, draw); order-independent.
    pub fn sub_seed(&self, scope: &str, day: NaiveDate, draw: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(scope.as_bytes());
        hasher.update(&day.num_days_from_ce().to_le_bytes());
        hasher.update(&draw.to_le_bytes());
        first_u64(hasher.finalize().as_bytes())
    }

    pub fn rng_for(&self, scope: &str, day: NaiveDate, draw: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(scope, day, draw))
    }
}

fn first_u64(bytes: &[u8; 32]) -> u64 {
    let mut head = [0u8; 8];
    head.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(head)
}
