//! Engine metrics.
//!
//! Rolling usage and accuracy counters per engine and per rule, read by
//! whatever observability layer embeds the engine. The counters are not
//! updated on the decision hot path: the audit consumer folds each
//! audited decision in while draining the queue, so the decision path
//! only pays for the queue send. Per-rule counts live in a concurrent
//! map so hot rules can be identified without locking evaluation.

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use time::OffsetDateTime;

use warden_core::DecisionType;

/// Counters for a single engine instance.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    decisions_total: AtomicU64,
    allows: AtomicU64,
    denies: AtomicU64,
    challenges: AtomicU64,
    errors: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    risk_escalations: AtomicU64,
    evaluation_micros_total: AtomicU64,
    /// Unix timestamp of the last successful rule index rebuild.
    /// Zero until the first build completes.
    last_refreshed_at: AtomicI64,
    rule_counters: DashMap<String, RuleCounter>,
}

#[derive(Debug, Default)]
struct RuleCounter {
    matches: AtomicU64,
    denies: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl EngineMetrics {
    /// Fold one audited decision into the counters.
    ///
    /// Allows and challenges count as successes, errors as failures;
    /// denials are tracked on their own and stay out of the accuracy
    /// ratio. Called from the audit consumer, off the decision path.
    pub fn record_outcome(
        &self,
        decision: DecisionType,
        evaluation_micros: u64,
        matched_rule_id: Option<&str>,
    ) {
        self.decisions_total.fetch_add(1, Ordering::Relaxed);
        self.evaluation_micros_total
            .fetch_add(evaluation_micros, Ordering::Relaxed);
        let counter = match decision {
            DecisionType::Allow => &self.allows,
            DecisionType::Deny => &self.denies,
            DecisionType::Challenge => &self.challenges,
            DecisionType::Error => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        match decision {
            DecisionType::Allow | DecisionType::Challenge => {
                self.successes.fetch_add(1, Ordering::Relaxed);
            }
            DecisionType::Error => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
            DecisionType::Deny => {}
        }

        if let Some(rule_id) = matched_rule_id {
            let counter = self.rule_counters.entry(rule_id.to_string()).or_default();
            counter.matches.fetch_add(1, Ordering::Relaxed);
            match decision {
                DecisionType::Allow | DecisionType::Challenge => {
                    counter.successes.fetch_add(1, Ordering::Relaxed);
                }
                DecisionType::Error => {
                    counter.failures.fetch_add(1, Ordering::Relaxed);
                }
                DecisionType::Deny => {
                    counter.denies.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Record that risk scoring escalated an allow to a challenge.
    pub fn record_escalation(&self) {
        self.risk_escalations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful rule index rebuild.
    pub fn record_refresh(&self, at: OffsetDateTime) {
        self.last_refreshed_at
            .store(at.unix_timestamp(), Ordering::Relaxed);
    }

    /// Seconds since the last successful rebuild, or `None` before the
    /// first build. Used to surface stale rule data.
    #[must_use]
    pub fn staleness_seconds(&self, now: OffsetDateTime) -> Option<i64> {
        let last = self.last_refreshed_at.load(Ordering::Relaxed);
        if last == 0 {
            None
        } else {
            Some((now.unix_timestamp() - last).max(0))
        }
    }

    /// Per-rule match statistics, unordered.
    #[must_use]
    pub fn rule_stats(&self) -> Vec<RuleStats> {
        self.rule_counters
            .iter()
            .map(|entry| {
                let successes = entry.successes.load(Ordering::Relaxed);
                let failures = entry.failures.load(Ordering::Relaxed);
                RuleStats {
                    rule_id: entry.key().clone(),
                    matches: entry.matches.load(Ordering::Relaxed),
                    denies: entry.denies.load(Ordering::Relaxed),
                    successes,
                    failures,
                    accuracy: accuracy(successes, failures),
                }
            })
            .collect()
    }

    /// Point-in-time snapshot of the aggregate counters.
    #[must_use]
    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        let decisions_total = self.decisions_total.load(Ordering::Relaxed);
        let evaluation_micros_total = self.evaluation_micros_total.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        EngineMetricsSnapshot {
            decisions_total,
            allows: self.allows.load(Ordering::Relaxed),
            denies: self.denies.load(Ordering::Relaxed),
            challenges: self.challenges.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            successes,
            failures,
            accuracy: accuracy(successes, failures),
            risk_escalations: self.risk_escalations.load(Ordering::Relaxed),
            evaluation_micros_total,
            avg_evaluation_micros: if decisions_total == 0 {
                0.0
            } else {
                evaluation_micros_total as f64 / decisions_total as f64
            },
            last_refreshed_at: self.last_refreshed_at.load(Ordering::Relaxed),
        }
    }
}

/// Share of successful outcomes; `1.0` while nothing has failed.
fn accuracy(successes: u64, failures: u64) -> f64 {
    let total = successes + failures;
    if total == 0 {
        1.0
    } else {
        successes as f64 / total as f64
    }
}

/// Match statistics for one rule.
#[derive(Debug, Clone)]
pub struct RuleStats {
    pub rule_id: String,
    pub matches: u64,
    pub denies: u64,
    pub successes: u64,
    pub failures: u64,
    pub accuracy: f64,
}

/// Point-in-time engine counters.
#[derive(Debug, Clone)]
pub struct EngineMetricsSnapshot {
    pub decisions_total: u64,
    pub allows: u64,
    pub denies: u64,
    pub challenges: u64,
    pub errors: u64,
    pub successes: u64,
    pub failures: u64,
    pub accuracy: f64,
    pub risk_escalations: u64,
    pub evaluation_micros_total: u64,
    pub avg_evaluation_micros: f64,
    /// Unix timestamp of the last rebuild, zero before the first.
    pub last_refreshed_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_counters() {
        let metrics = EngineMetrics::default();
        metrics.record_outcome(DecisionType::Allow, 120, Some("r-1"));
        metrics.record_outcome(DecisionType::Allow, 80, Some("r-1"));
        metrics.record_outcome(DecisionType::Deny, 40, Some("r-2"));
        metrics.record_outcome(DecisionType::Challenge, 100, None);
        metrics.record_outcome(DecisionType::Error, 10, None);

        let snap = metrics.snapshot();
        assert_eq!(snap.decisions_total, 5);
        assert_eq!(snap.allows, 2);
        assert_eq!(snap.denies, 1);
        assert_eq!(snap.challenges, 1);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.successes, 3);
        assert_eq!(snap.failures, 1);
        assert!((snap.accuracy - 0.75).abs() < 1e-9);
        assert_eq!(snap.evaluation_micros_total, 350);
        assert!((snap.avg_evaluation_micros - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_rule_counters() {
        let metrics = EngineMetrics::default();
        metrics.record_outcome(DecisionType::Allow, 10, Some("r-1"));
        metrics.record_outcome(DecisionType::Deny, 10, Some("r-1"));
        metrics.record_outcome(DecisionType::Allow, 10, Some("r-2"));

        let mut stats = metrics.rule_stats();
        stats.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].matches, 2);
        assert_eq!(stats[0].denies, 1);
        assert_eq!(stats[0].successes, 1);
        assert_eq!(stats[1].matches, 1);
        assert_eq!(stats[1].denies, 0);
    }

    #[test]
    fn test_accuracy_starts_at_one() {
        let metrics = EngineMetrics::default();
        assert!((metrics.snapshot().accuracy - 1.0).abs() < 1e-9);

        // Denials alone do not move the ratio.
        metrics.record_outcome(DecisionType::Deny, 10, None);
        assert!((metrics.snapshot().accuracy - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_staleness() {
        let metrics = EngineMetrics::default();
        let now = OffsetDateTime::now_utc();
        assert!(metrics.staleness_seconds(now).is_none());

        metrics.record_refresh(now - time::Duration::seconds(42));
        assert_eq!(metrics.staleness_seconds(now), Some(42));
    }
}
