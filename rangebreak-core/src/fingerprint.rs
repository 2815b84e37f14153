//! Fingerprints — deterministic BLAKE3 identities for specs and datasets.
//!
//! - `spec_fingerprint`: exact identity of a validated strategy spec.
//! - `dataset_hash`: identity of a canonical bar series.
//!
//! Both feed [`RunId`](crate::domain::RunId) and the control-baseline seed.

use crate::domain::{PriceBar, StrategySpec};

/// Hash of the spec's canonical JSON form.
///
/// `serde_json::Value` objects keep keys sorted, so field order in the
/// struct does not affect the result.
pub fn spec_fingerprint(spec: &StrategySpec) -> String {
    let canonical = serde_json::json!({
        "cost_profile": spec.cost_profile(),
        "direction_filter": spec.direction_filter(),
        "instrument": spec.instrument(),
        "reward_risk_ratio": spec.reward_risk_ratio(),
        "size_filter": spec.size_filter(),
        "stop_mode": spec.stop_mode(),
        "strategy_id": spec.strategy_id().as_str(),
        "window_id": spec.window_id().as_str(),
    });
    blake3::hash(canonical.to_string().as_bytes())
        .to_hex()
        .to_string()
}

/// Hash over every bar's timestamp and OHLC bit patterns.
pub fn dataset_hash(bars: &[PriceBar]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(bars.len() as u64).to_le_bytes());
    for bar in bars {
        hasher.update(&bar.timestamp.timestamp_millis().to_le_bytes());
        for value in [bar.open, bar.high, bar.low, bar.close] {
            hasher.update(&value.to_bits().to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}
