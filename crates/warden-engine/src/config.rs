//! Decision engine configuration.
//!
//! All knobs the embedding service can tune per tenant: risk signal
//! weights and the challenge threshold, cache bounds and TTLs, and the
//! audit queue capacity.
//!
//! # Example (TOML)
//!
//! ```toml
//! [risk]
//! challenge_threshold = 80.0
//!
//! [risk.weights]
//! network = 30.0
//! device = 25.0
//! geo = 25.0
//! time_of_day = 20.0
//!
//! [cache]
//! max_entries = 10000
//! decision_ttl = "5m"
//! risk_ttl = "10s"
//!
//! [audit]
//! queue_capacity = 4096
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root engine settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Risk scoring configuration.
    pub risk: RiskConfig,

    /// Decision cache configuration.
    pub cache: CacheConfig,

    /// Audit recorder configuration.
    pub audit: AuditConfig,
}

/// Risk scoring configuration.
///
/// Weights are configuration, not hard-coded, so tenants can tune which
/// signals dominate. Each weight is the maximum contribution of its
/// signal to the 0-100 score.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Signal weights.
    pub weights: RiskWeights,

    /// Risk score above which an allow is escalated to a challenge.
    pub challenge_threshold: f64,

    /// CIDR blocks considered untrusted network origins.
    pub untrusted_networks: Vec<String>,

    /// Kilometers from a usual location beyond which the geo signal
    /// contributes its full weight.
    pub geo_distance_km: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            challenge_threshold: 80.0,
            untrusted_networks: Vec::new(),
            geo_distance_km: 500.0,
        }
    }
}

/// Maximum contribution of each risk signal.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskWeights {
    /// Network/IP reputation signal.
    pub network: f64,

    /// Device trust signal.
    pub device: f64,

    /// Geographic distance signal.
    pub geo: f64,

    /// Time-of-day anomaly signal.
    pub time_of_day: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            network: 30.0,
            device: 25.0,
            geo: 25.0,
            time_of_day: 20.0,
        }
    }
}

impl RiskWeights {
    /// Sum of all weights; the score is normalized against this.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.network + self.device + self.geo + self.time_of_day
    }
}

/// Decision cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached decisions before LRU eviction.
    pub max_entries: usize,

    /// How long a cached base decision stays valid.
    /// Risk is re-checked on every hit regardless.
    #[serde(with = "humantime_serde")]
    pub decision_ttl: Duration,

    /// How long a cached risk score stays valid. Kept much shorter than
    /// the decision TTL because risk signals are volatile.
    #[serde(with = "humantime_serde")]
    pub risk_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            decision_ttl: Duration::from_secs(300), // 5 minutes
            risk_ttl: Duration::from_secs(10),
        }
    }
}

/// Audit recorder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Bounded queue capacity between the decision path and the
    /// background consumer. When full, new audit events are dropped and
    /// counted instead of blocking the caller.
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.risk.challenge_threshold, 80.0);
        assert_eq!(settings.cache.max_entries, 10_000);
        assert!(settings.cache.risk_ttl < settings.cache.decision_ttl);
        assert_eq!(settings.audit.queue_capacity, 4096);
    }

    #[test]
    fn test_deserialize_from_toml_style_json() {
        let json = serde_json::json!({
            "risk": {
                "challenge_threshold": 70.0,
                "weights": { "network": 40.0 }
            },
            "cache": { "max_entries": 100, "decision_ttl": "1m", "risk_ttl": "5s" }
        });
        let settings: EngineSettings = serde_json::from_value(json).unwrap();
        assert_eq!(settings.risk.challenge_threshold, 70.0);
        assert_eq!(settings.risk.weights.network, 40.0);
        // Unspecified weights keep their defaults.
        assert_eq!(settings.risk.weights.device, 25.0);
        assert_eq!(settings.cache.max_entries, 100);
        assert_eq!(settings.cache.decision_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_weight_total() {
        let weights = RiskWeights::default();
        assert_eq!(weights.total(), 100.0);
    }
}
