//! Contextual risk scoring.
//!
//! Computes a 0-100 risk score as a weighted sum over independent
//! signals: network origin, device trust, geographic distance from the
//! subject's usual locations, and time-of-day anomaly. Weights come from
//! configuration so tenants can tune which signals dominate.
//!
//! Risk can only make access harder, never easier: an ALLOW whose score
//! crosses the challenge threshold is escalated to CHALLENGE; a DENY is
//! never downgraded. Absent signals contribute zero to their term - the
//! scorer never raises on missing data.
//!
//! Scoring is deterministic for a fixed request: all time-based terms
//! read the request timestamp, not the wall clock.

use ipnetwork::IpNetwork;

use warden_core::{AccessRequest, DecisionType, GeoPoint};

use crate::config::RiskConfig;

/// Mean earth radius in kilometers, for the haversine distance.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Weighted-signal risk scorer.
pub struct RiskScorer {
    config: RiskConfig,
    untrusted: Vec<IpNetwork>,
}

impl RiskScorer {
    /// Create a scorer from configuration.
    ///
    /// Unparseable CIDR entries are skipped with a warning rather than
    /// failing construction.
    #[must_use]
    pub fn new(config: RiskConfig) -> Self {
        let untrusted = config
            .untrusted_networks
            .iter()
            .filter_map(|cidr| match cidr.parse::<IpNetwork>() {
                Ok(network) => Some(network),
                Err(e) => {
                    tracing::warn!(%cidr, error = %e, "Skipping unparseable untrusted network");
                    None
                }
            })
            .collect();
        Self { config, untrusted }
    }

    /// Compute the 0-100 risk score for a request.
    #[must_use]
    pub fn score(&self, request: &AccessRequest) -> f64 {
        let weights = &self.config.weights;
        let total = weights.total();
        if total <= 0.0 {
            return 0.0;
        }

        let raw = weights.network * self.network_factor(request)
            + weights.device * device_factor(request)
            + weights.geo * self.geo_factor(request)
            + weights.time_of_day * time_of_day_factor(request);

        (raw / total * 100.0).clamp(0.0, 100.0)
    }

    /// Apply risk post-processing to a raw decision.
    ///
    /// Returns the final decision and whether it was escalated.
    #[must_use]
    pub fn apply(&self, decision: DecisionType, score: f64) -> (DecisionType, bool) {
        if decision == DecisionType::Allow && score > self.config.challenge_threshold {
            (DecisionType::Challenge, true)
        } else {
            (decision, false)
        }
    }

    /// The configured escalation threshold.
    #[must_use]
    pub fn challenge_threshold(&self) -> f64 {
        self.config.challenge_threshold
    }

    fn network_factor(&self, request: &AccessRequest) -> f64 {
        match request.network.ip {
            Some(ip) if self.untrusted.iter().any(|n| n.contains(ip)) => 1.0,
            _ => 0.0,
        }
    }

    fn geo_factor(&self, request: &AccessRequest) -> f64 {
        let Some(here) = request.network.geo else {
            return 0.0;
        };
        let usual = &request.subject.usual_locations;
        if usual.is_empty() {
            return 0.0;
        }
        let nearest = usual
            .iter()
            .map(|p| haversine_km(here, *p))
            .fold(f64::INFINITY, f64::min);
        (nearest / self.config.geo_distance_km).clamp(0.0, 1.0)
    }
}

fn device_factor(request: &AccessRequest) -> f64 {
    match request.network.device_id {
        Some(_) if !request.network.trusted_device => 1.0,
        _ => 0.0,
    }
}

fn time_of_day_factor(request: &AccessRequest) -> f64 {
    let Some((start, end)) = request.subject.usual_hours else {
        return 0.0;
    };
    let hour = request.timestamp.hour();
    let inside = if start <= end {
        hour >= start && hour < end
    } else {
        // Window wraps midnight, e.g. (22, 6).
        hour >= start || hour < end
    };
    if inside { 0.0 } else { 1.0 }
}

/// Great-circle distance between two points in kilometers.
fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}
