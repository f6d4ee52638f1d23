//! Per-tenant engine registry.
//!
//! The registry is the embedding surface: it owns one or more
//! [`DecisionEngine`]s per tenant, routes requests to them and merges
//! their outcomes. A tenant with several active engines gets the most
//! restrictive combined answer; a tenant with no engine at all gets a
//! fail-closed deny, never an implicit allow.
//!
//! All engines share one audit recorder so the trail is a single ordered
//! stream regardless of which engine produced a decision.

use dashmap::DashMap;
use std::sync::Arc;

use warden_core::{AccessRequest, Decision, DecisionReason, DecisionType};

use crate::audit::{AuditEvent, AuditRecord, AuditRecorder, AuditSink};
use crate::config::EngineSettings;
use crate::engine::DecisionEngine;
use crate::error::EngineResult;
use crate::metrics::EngineMetricsSnapshot;
use crate::store::PolicyStore;

/// Routes access requests to per-tenant decision engines.
pub struct EngineRegistry {
    store: Arc<dyn PolicyStore>,
    settings: EngineSettings,
    recorder: Arc<AuditRecorder>,
    engines: DashMap<String, Vec<Arc<DecisionEngine>>>,
}

impl EngineRegistry {
    /// Create an empty registry. Tenants are brought online with
    /// [`load_tenant`](Self::load_tenant).
    ///
    /// Must be called from within a tokio runtime; the shared audit
    /// consumer is spawned here.
    #[must_use]
    pub fn new(
        store: Arc<dyn PolicyStore>,
        settings: EngineSettings,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        let recorder = Arc::new(AuditRecorder::new(sink, &settings.audit));
        Self {
            store,
            settings,
            recorder,
            engines: DashMap::new(),
        }
    }

    /// Load (or fully reload) the engine configuration for a tenant.
    ///
    /// Fetches the tenant's active engine records, builds a fresh engine
    /// with a freshly compiled rule index for each, and swaps the set in
    /// atomically. Returns the number of engines now serving the tenant.
    ///
    /// On any store failure the tenant's previous engines, if any, stay
    /// in service.
    pub async fn load_tenant(&self, tenant: &str) -> EngineResult<usize> {
        let records = self.store.list_active_engines(tenant).await?;

        let mut engines = Vec::with_capacity(records.len());
        for record in records.into_iter().filter(|r| r.active) {
            let engine = DecisionEngine::new(
                record,
                Arc::clone(&self.store),
                &self.settings,
                Arc::clone(&self.recorder),
            );
            engine.rebuild_index().await?;
            engines.push(Arc::new(engine));
        }

        let count = engines.len();
        tracing::info!(%tenant, engines = count, "Loaded tenant engines");
        self.engines.insert(tenant.to_string(), engines);
        Ok(count)
    }

    /// Remove a tenant's engines. Subsequent requests fail closed.
    pub fn unload_tenant(&self, tenant: &str) {
        self.engines.remove(tenant);
    }

    /// Rebuild the rule indexes of a tenant's existing engines in place,
    /// keeping their metrics and engine configuration.
    ///
    /// Use after policy or rule changes; use
    /// [`load_tenant`](Self::load_tenant) after engine-level changes.
    pub async fn reload_rules(&self, tenant: &str) -> EngineResult<()> {
        let engines = self
            .engines
            .get(tenant)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        for engine in engines {
            engine.rebuild_index().await?;
        }
        Ok(())
    }

    /// Evaluate a request against every engine serving its tenant.
    ///
    /// With several engines the most restrictive outcome wins and the
    /// merged risk score is the maximum across engines. An unknown tenant
    /// gets a fail-closed deny.
    pub fn decide(&self, request: &AccessRequest) -> Decision {
        let engines = self
            .engines
            .get(&request.tenant)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        if engines.is_empty() {
            return self.deny_unknown_tenant(request);
        }

        let mut decisions = engines.iter().map(|engine| engine.decide(request));
        // At least one engine exists, so the first decision always does.
        let first = match decisions.next() {
            Some(decision) => decision,
            None => return self.deny_unknown_tenant(request),
        };

        decisions.fold(first, |merged, next| {
            let max_risk = merged.risk_score.max(next.risk_score);
            let mut winner =
                if next.decision.restrictiveness() > merged.decision.restrictiveness() {
                    next
                } else {
                    merged
                };
            winner.risk_score = max_risk;
            winner
        })
    }

    /// Metrics snapshots for a tenant's engines, keyed by engine id.
    #[must_use]
    pub fn engine_metrics(&self, tenant: &str) -> Vec<(String, EngineMetricsSnapshot)> {
        self.engines
            .get(tenant)
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .map(|engine| (engine.record().id.clone(), engine.metrics().snapshot()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Records dropped by the shared audit queue.
    #[must_use]
    pub fn audit_dropped(&self) -> u64 {
        self.recorder.dropped()
    }

    /// Drain the audit queue and stop the consumer.
    pub async fn shutdown(&self) {
        self.recorder.shutdown().await;
    }

    fn deny_unknown_tenant(&self, request: &AccessRequest) -> Decision {
        let mut decision = Decision::new(
            &request.tenant,
            DecisionType::Deny,
            DecisionReason::unknown_tenant(&request.tenant),
            &request.resource,
            &request.operation,
        );
        decision.confidence = 0.0;

        tracing::warn!(tenant = %request.tenant, "Request for tenant with no engines, denying");
        // No engine produced this decision, so there are no counters to
        // fold in; the event carries the record alone.
        self.recorder
            .record(AuditEvent::new(AuditRecord::from_decision(
                request, &decision, false,
            )));
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{
        CombiningMode, EngineFlavor, EngineRecord, RuleContext, RuleEffect, RuleRecord, Subject,
    };

    use crate::audit::MemoryAuditSink;
    use crate::store::MemoryPolicyStore;

    fn engine_record(id: &str, default_decision: DecisionType) -> EngineRecord {
        EngineRecord {
            id: id.to_string(),
            tenant: "acme".to_string(),
            name: id.to_string(),
            flavor: EngineFlavor::Rbac,
            active: true,
            default_decision,
            combining_mode: CombiningMode::DenyOverrides,
            baseline: Vec::new(),
        }
    }

    fn policy(id: &str) -> warden_core::PolicyRecord {
        warden_core::PolicyRecord {
            id: id.to_string(),
            tenant: "acme".to_string(),
            name: id.to_string(),
            active: true,
            priority: 10,
            effective_from: None,
            expires_at: None,
            security_level: 0,
            subjects: None,
            operations: None,
        }
    }

    fn rule(id: &str, policy_id: &str, effect: RuleEffect) -> RuleRecord {
        RuleRecord {
            id: id.to_string(),
            policy_id: policy_id.to_string(),
            effect,
            priority: 0,
            context: RuleContext::Data,
            resource: "invoice/*".to_string(),
            operation: "read".to_string(),
            subject: None,
            condition: None,
            security_level: 0,
            risk_hint: None,
            created_at: time::OffsetDateTime::now_utc(),
        }
    }

    fn registry(store: Arc<MemoryPolicyStore>) -> EngineRegistry {
        EngineRegistry::new(
            store,
            EngineSettings::default(),
            Arc::new(MemoryAuditSink::new()),
        )
    }

    fn request(resource: &str) -> AccessRequest {
        AccessRequest::new("acme", Subject::new("u-1"), resource, "read")
    }

    #[tokio::test]
    async fn test_unknown_tenant_fails_closed() {
        let registry = registry(Arc::new(MemoryPolicyStore::new()));

        let decision = registry.decide(&request("invoice/1"));
        assert_eq!(decision.decision, DecisionType::Deny);
        assert_eq!(decision.reason.code, "unknown-tenant");
        assert_eq!(decision.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_single_engine_routing() {
        let store = Arc::new(MemoryPolicyStore::new());
        store
            .add_engine(engine_record("eng-1", DecisionType::Deny))
            .await;
        store.add_policy(policy("p1")).await;
        store.add_rule(rule("r1", "p1", RuleEffect::Allow)).await;

        let registry = registry(store);
        assert_eq!(registry.load_tenant("acme").await.unwrap(), 1);

        let decision = registry.decide(&request("invoice/1"));
        assert_eq!(decision.decision, DecisionType::Allow);
    }

    #[tokio::test]
    async fn test_most_restrictive_engine_wins() {
        let store = Arc::new(MemoryPolicyStore::new());
        // Two engines over the same rule set: one defaults open, one
        // defaults closed. No rule matches, so the defaults disagree.
        store
            .add_engine(engine_record("eng-open", DecisionType::Allow))
            .await;
        store
            .add_engine(engine_record("eng-closed", DecisionType::Deny))
            .await;

        let registry = registry(store);
        assert_eq!(registry.load_tenant("acme").await.unwrap(), 2);

        let decision = registry.decide(&request("invoice/1"));
        assert_eq!(decision.decision, DecisionType::Deny);
    }

    #[tokio::test]
    async fn test_inactive_engines_are_skipped() {
        let store = Arc::new(MemoryPolicyStore::new());
        let mut record = engine_record("eng-1", DecisionType::Allow);
        record.active = false;
        store.add_engine(record).await;

        let registry = registry(store);
        assert_eq!(registry.load_tenant("acme").await.unwrap(), 0);

        // No active engine means fail closed, not the inactive default.
        let decision = registry.decide(&request("invoice/1"));
        assert_eq!(decision.decision, DecisionType::Deny);
    }

    #[tokio::test]
    async fn test_reload_rules_picks_up_changes() {
        let store = Arc::new(MemoryPolicyStore::new());
        store
            .add_engine(engine_record("eng-1", DecisionType::Deny))
            .await;
        store.add_policy(policy("p1")).await;
        store.add_rule(rule("r1", "p1", RuleEffect::Allow)).await;

        let registry = registry(store.clone());
        registry.load_tenant("acme").await.unwrap();
        assert_eq!(registry.decide(&request("invoice/1")).decision, DecisionType::Allow);

        store.clear_rules("p1").await;
        store.add_rule(rule("r2", "p1", RuleEffect::Deny)).await;
        registry.reload_rules("acme").await.unwrap();

        assert_eq!(registry.decide(&request("invoice/1")).decision, DecisionType::Deny);

        // Metrics survive a rule reload. Drain the audit queue first so
        // the consumer has folded both decisions in.
        registry.shutdown().await;
        let metrics = registry.engine_metrics("acme");
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].1.decisions_total, 2);
        assert_eq!(metrics[0].1.successes, 1);
        assert!((metrics[0].1.accuracy - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unload_tenant() {
        let store = Arc::new(MemoryPolicyStore::new());
        store
            .add_engine(engine_record("eng-1", DecisionType::Allow))
            .await;

        let registry = registry(store);
        registry.load_tenant("acme").await.unwrap();
        registry.unload_tenant("acme");

        assert_eq!(registry.decide(&request("invoice/1")).decision, DecisionType::Deny);
    }

    #[tokio::test]
    async fn test_audit_trail_covers_unknown_tenant() {
        let store = Arc::new(MemoryPolicyStore::new());
        let sink = Arc::new(MemoryAuditSink::new());
        let registry =
            EngineRegistry::new(store, EngineSettings::default(), sink.clone());

        let _ = registry.decide(&request("invoice/1"));
        registry.shutdown().await;

        let records = sink.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reason_code, "unknown-tenant");
    }
}
