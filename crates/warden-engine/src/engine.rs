//! The decision engine.
//!
//! One [`DecisionEngine`] serves one engine configuration for one tenant.
//! It holds an immutable rule index snapshot behind an atomic pointer,
//! so evaluation never takes a lock and a rebuild never disturbs
//! in-flight requests. The decision path is:
//!
//! 1. Deadline check (expired requests fail closed to `ERROR`)
//! 2. Decision cache lookup
//! 3. Candidate lookup in the current index snapshot
//! 4. Conflict resolution under the configured combining mode
//! 5. Risk scoring and possible escalation to `CHALLENGE`
//! 6. Non-blocking audit; the audit consumer folds usage counters in
//!    as it drains the queue
//!
//! `decide` is infallible: anything that goes wrong becomes a fail-closed
//! decision rather than an error the caller could misread as permission.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

use warden_core::{
    AccessRequest, Decision, DecisionReason, DecisionType, EngineRecord, PolicyRecord, RuleEffect,
    RuleRecord,
};

use crate::audit::{AuditEvent, AuditRecord, AuditRecorder};
use crate::cache::{CacheStats, DecisionCache};
use crate::config::EngineSettings;
use crate::error::EngineResult;
use crate::index::{RuleIndex, RuleIndexBuilder};
use crate::metrics::EngineMetrics;
use crate::resolver::{Resolution, resolve};
use crate::risk::RiskScorer;
use crate::store::PolicyStore;

/// An access decision engine bound to one tenant.
pub struct DecisionEngine {
    record: EngineRecord,
    store: Arc<dyn PolicyStore>,
    builder: RuleIndexBuilder,
    index: ArcSwap<RuleIndex>,
    cache: DecisionCache,
    scorer: RiskScorer,
    recorder: Arc<AuditRecorder>,
    metrics: Arc<EngineMetrics>,
}

impl DecisionEngine {
    /// Create an engine serving an empty index. Call
    /// [`rebuild_index`](Self::rebuild_index) to load rules before the
    /// first decision; until then every request falls through to the
    /// engine default.
    #[must_use]
    pub fn new(
        record: EngineRecord,
        store: Arc<dyn PolicyStore>,
        settings: &EngineSettings,
        recorder: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            record,
            store,
            builder: RuleIndexBuilder::new(),
            index: ArcSwap::from_pointee(RuleIndex::empty()),
            cache: DecisionCache::new(settings.cache.clone()),
            scorer: RiskScorer::new(settings.risk.clone()),
            recorder,
            metrics: Arc::new(EngineMetrics::default()),
        }
    }

    /// The engine's configuration record.
    #[must_use]
    pub fn record(&self) -> &EngineRecord {
        &self.record
    }

    /// The tenant this engine serves.
    #[must_use]
    pub fn tenant(&self) -> &str {
        &self.record.tenant
    }

    /// Engine counters.
    #[must_use]
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Decision cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Version of the index snapshot currently being served.
    #[must_use]
    pub fn index_version(&self) -> u64 {
        self.index.load().version()
    }

    // =========================================================================
    // Index lifecycle
    // =========================================================================

    /// Reload policies and rules from the store and swap in a fresh index
    /// snapshot.
    ///
    /// On store failure the previous snapshot stays in service and the
    /// error is returned to the refresh trigger. On success the decision
    /// cache is cleared so no cached decision outlives the rules it came
    /// from.
    pub async fn rebuild_index(&self) -> EngineResult<()> {
        let mut policies = self.store.list_active_policies(&self.record.tenant).await?;

        let mut rules = Vec::new();
        for policy in &policies {
            rules.extend(self.store.list_active_rules(&policy.id).await?);
        }

        if !self.record.baseline.is_empty() {
            let (policy, mut baseline_rules) = self.baseline_policy();
            policies.push(policy);
            rules.append(&mut baseline_rules);
        }

        let snapshot = self.builder.build(&policies, &rules, OffsetDateTime::now_utc());
        self.index.store(Arc::new(snapshot));
        self.cache.clear();
        self.metrics.record_refresh(OffsetDateTime::now_utc());
        Ok(())
    }

    /// Fold the engine's baseline grants into a synthetic policy at the
    /// lowest possible priority, so any real rule outranks them while the
    /// grants still flow through the ordinary resolver path.
    fn baseline_policy(&self) -> (PolicyRecord, Vec<RuleRecord>) {
        let policy_id = format!("{}-baseline", self.record.id);
        let policy = PolicyRecord {
            id: policy_id.clone(),
            tenant: self.record.tenant.clone(),
            name: format!("{} baseline grants", self.record.name),
            active: true,
            priority: i32::MIN,
            effective_from: None,
            expires_at: None,
            security_level: 0,
            subjects: None,
            operations: None,
        };

        let rules = self
            .record
            .baseline
            .iter()
            .enumerate()
            .map(|(i, grant)| RuleRecord {
                id: format!("{policy_id}-{i}"),
                policy_id: policy_id.clone(),
                effect: RuleEffect::Allow,
                priority: 0,
                context: warden_core::RuleContext::default(),
                resource: grant.resource.clone(),
                operation: grant.operation.clone(),
                subject: Some(warden_core::SubjectMatcher {
                    roles: Some(vec![grant.role.clone()]),
                    ..Default::default()
                }),
                condition: None,
                security_level: 0,
                risk_hint: None,
                created_at: OffsetDateTime::UNIX_EPOCH,
            })
            .collect();

        (policy, rules)
    }

    // =========================================================================
    // Decide
    // =========================================================================

    /// Evaluate one access request.
    ///
    /// Never returns an error and never blocks on audit: failures on the
    /// way surface as fail-closed decisions.
    pub fn decide(&self, request: &AccessRequest) -> Decision {
        let started = Instant::now();
        let now = OffsetDateTime::now_utc();

        if request.deadline_exceeded(now) {
            let decision = self.deadline_decision(request, started);
            self.finish(request, decision, false)
        } else if let Some(hit) = self.cache.get(request) {
            let decision = self.serve_cached(request, hit, started);
            self.finish(request, decision, true)
        } else {
            let decision = self.evaluate(request, started);
            self.finish(request, decision, false)
        }
    }

    /// Full evaluation against the current index snapshot.
    fn evaluate(&self, request: &AccessRequest, started: Instant) -> Decision {
        let snapshot = self.index.load();
        let candidates = snapshot.candidates(
            request.resource_context,
            &request.resource,
            &request.operation,
        );
        let resolution = resolve(
            &candidates,
            request,
            self.record.default_decision,
            self.record.combining_mode,
        );

        // Condition evaluation and risk scoring take time too; a deadline
        // that lapsed mid-flight must not produce a cacheable result.
        if request.deadline_exceeded(OffsetDateTime::now_utc()) {
            return self.deadline_decision(request, started);
        }

        let risk_floor = resolution
            .matched
            .as_ref()
            .and_then(|rule| rule.risk_hint)
            .map_or(0.0, f64::from);
        let score = self.scorer.score(request).max(risk_floor);

        let base = self.build_base(request, &resolution, score);
        self.cache.insert(request, base.clone(), risk_floor);

        let mut decision = self.escalate(base, score);
        decision.evaluation_micros = elapsed_micros(started);
        decision
    }

    fn deadline_decision(&self, request: &AccessRequest, started: Instant) -> Decision {
        let mut decision = Decision::new(
            &self.record.tenant,
            DecisionType::Error,
            DecisionReason::deadline_exceeded(),
            &request.resource,
            &request.operation,
        );
        decision.confidence = 0.0;
        decision.evaluation_micros = elapsed_micros(started);
        decision
    }

    /// Serve a cache hit, re-scoring risk if the cached score is stale.
    fn serve_cached(
        &self,
        request: &AccessRequest,
        hit: crate::cache::CachedDecision,
        started: Instant,
    ) -> Decision {
        let mut base = hit.decision;
        if hit.risk_stale {
            base.risk_score = self.scorer.score(request).max(hit.risk_floor);
        }
        let score = base.risk_score;
        let mut decision = self.escalate(base, score);
        decision.evaluation_micros = elapsed_micros(started);
        decision
    }

    fn build_base(
        &self,
        request: &AccessRequest,
        resolution: &Resolution,
        score: f64,
    ) -> Decision {
        let mut decision = Decision::new(
            &self.record.tenant,
            resolution.decision,
            resolution.reason.clone(),
            &request.resource,
            &request.operation,
        );
        decision.confidence = resolution.confidence;
        decision.risk_score = score;
        if let Some(rule) = &resolution.matched {
            decision.matched_policy_id = Some(rule.policy_id.clone());
            decision.matched_rule_id = Some(rule.rule_id.clone());
        }
        decision
    }

    /// Apply risk escalation to a base decision. Only hardens: an allow
    /// above the threshold becomes a challenge, nothing is ever relaxed.
    fn escalate(&self, mut decision: Decision, score: f64) -> Decision {
        let (kind, escalated) = self.scorer.apply(decision.decision, score);
        if escalated {
            decision.decision = kind;
            decision.reason =
                DecisionReason::risk_escalated(score, self.scorer.challenge_threshold());
            self.metrics.record_escalation();
        }
        decision
    }

    fn finish(&self, request: &AccessRequest, decision: Decision, cached: bool) -> Decision {
        self.recorder.record(AuditEvent::with_metrics(
            AuditRecord::from_decision(request, &decision, cached),
            Arc::clone(&self.metrics),
        ));

        tracing::debug!(
            tenant = %decision.tenant,
            decision = %decision.decision,
            reason = %decision.reason.code,
            resource = %decision.resource,
            operation = %decision.operation,
            risk_score = decision.risk_score,
            cached,
            "Access decision"
        );
        decision
    }
}

fn elapsed_micros(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}
