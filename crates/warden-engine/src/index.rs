//! Immutable rule index snapshots.
//!
//! The index builder compiles the current set of active policies and
//! rules into an immutable, queryable snapshot. Rules with exact resource
//! patterns and concrete operations live in hash buckets keyed by
//! `(context, resource, operation)`; wildcard rules go to a per-context
//! fallback bucket tried after the exact lookup.
//!
//! Callers hold the snapshot behind an `Arc`, so a rebuild never blocks
//! or invalidates in-flight evaluations - it only affects requests issued
//! after the swap. A malformed rule (bad pattern, unparseable condition,
//! operation outside its policy's scope) is excluded with a logged
//! warning instead of aborting the build: partial availability over
//! total failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;

use warden_core::{PolicyRecord, RuleContext, RuleEffect, RuleRecord, SubjectMatcher};

use crate::condition::ConditionExpr;
use crate::pattern::ResourcePattern;

// =============================================================================
// Indexed Rule
// =============================================================================

/// A rule compiled for evaluation: pattern and condition pre-built,
/// priorities resolved against the owning policy.
#[derive(Debug)]
pub struct IndexedRule {
    /// The rule's identifier.
    pub rule_id: String,

    /// The owning policy's identifier.
    pub policy_id: String,

    /// Effect when the rule matches.
    pub effect: RuleEffect,

    /// Resolved priority: `(policy.priority, rule.priority)`, compared
    /// lexicographically, higher wins.
    pub priority: (i32, i32),

    /// Layer the rule governs.
    pub context: RuleContext,

    /// Compiled resource pattern.
    pub pattern: ResourcePattern,

    /// Operation the rule covers, `*` for any.
    pub operation: String,

    /// Policy scope subject criteria, checked in addition to the rule's.
    pub scope_subjects: Option<SubjectMatcher>,

    /// The rule's own subject criteria.
    pub subject: Option<SubjectMatcher>,

    /// Parsed condition tree, if any.
    pub condition: Option<ConditionExpr>,

    /// Effective security level: the stricter of the rule's own level
    /// and the policy floor.
    pub security_level: u8,

    /// Risk floor applied when this rule wins.
    pub risk_hint: Option<u8>,

    /// Rule creation time, final determinism tie-break.
    pub created_at: OffsetDateTime,
}

impl IndexedRule {
    /// Returns `true` if this rule covers the operation.
    #[must_use]
    pub fn covers_operation(&self, operation: &str) -> bool {
        self.operation == "*" || self.operation == operation
    }
}

// =============================================================================
// Rule Index
// =============================================================================

/// An immutable snapshot of the compiled rule set.
pub struct RuleIndex {
    /// Exact buckets: `(context, resource, operation)` for rules with an
    /// exact pattern and a concrete operation.
    exact: HashMap<(RuleContext, String, String), Vec<Arc<IndexedRule>>>,

    /// Fallback buckets per context: wildcard patterns and `*` operations.
    fallback: HashMap<RuleContext, Vec<Arc<IndexedRule>>>,

    /// Snapshot version, incremented on each build.
    version: u64,

    /// When the snapshot was built.
    built_at: OffsetDateTime,

    /// Number of rules in the snapshot.
    rule_count: usize,

    /// Number of rules excluded as malformed.
    skipped_count: usize,
}

impl RuleIndex {
    /// An empty index, served until the first successful build.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            exact: HashMap::new(),
            fallback: HashMap::new(),
            version: 0,
            built_at: OffsetDateTime::UNIX_EPOCH,
            rule_count: 0,
            skipped_count: 0,
        }
    }

    /// Candidate rules for a request, exact bucket first, then the
    /// wildcard fallback filtered by pattern and operation.
    ///
    /// The result is unordered; the resolver imposes the deterministic
    /// total order.
    #[must_use]
    pub fn candidates(
        &self,
        context: RuleContext,
        resource: &str,
        operation: &str,
    ) -> Vec<&Arc<IndexedRule>> {
        let mut out: Vec<&Arc<IndexedRule>> = Vec::new();

        let key = (context, resource.to_string(), operation.to_string());
        if let Some(bucket) = self.exact.get(&key) {
            out.extend(bucket.iter());
        }

        if let Some(bucket) = self.fallback.get(&context) {
            out.extend(
                bucket
                    .iter()
                    .filter(|r| r.covers_operation(operation) && r.pattern.matches(resource)),
            );
        }

        out
    }

    /// Snapshot version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// When the snapshot was built. Staleness is observable through the
    /// engine metrics when the store cannot refresh.
    #[must_use]
    pub fn built_at(&self) -> OffsetDateTime {
        self.built_at
    }

    /// Number of rules in the snapshot.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    /// Number of rules excluded as malformed during the build.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.skipped_count
    }
}

// =============================================================================
// Rule Index Builder
// =============================================================================

/// Builds immutable [`RuleIndex`] snapshots from stored records.
///
/// The builder carries only the monotonically increasing snapshot
/// version; each call to [`RuleIndexBuilder::build`] is otherwise pure.
#[derive(Default)]
pub struct RuleIndexBuilder {
    version: AtomicU64,
}

impl RuleIndexBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile policies and rules into a new snapshot.
    ///
    /// Policies outside their effective window or marked inactive are
    /// dropped along with their rules. Malformed rules are excluded
    /// individually with a warning.
    pub fn build(
        &self,
        policies: &[PolicyRecord],
        rules: &[RuleRecord],
        now: OffsetDateTime,
    ) -> RuleIndex {
        let effective: HashMap<&str, &PolicyRecord> = policies
            .iter()
            .filter(|p| p.is_effective_at(now))
            .map(|p| (p.id.as_str(), p))
            .collect();

        let mut exact: HashMap<(RuleContext, String, String), Vec<Arc<IndexedRule>>> =
            HashMap::new();
        let mut fallback: HashMap<RuleContext, Vec<Arc<IndexedRule>>> = HashMap::new();
        let mut rule_count = 0usize;
        let mut skipped_count = 0usize;

        for rule in rules {
            let Some(policy) = effective.get(rule.policy_id.as_str()) else {
                // Policy inactive or out of window; not an error.
                continue;
            };

            let indexed = match Self::compile_rule(rule, policy) {
                Ok(indexed) => Arc::new(indexed),
                Err(reason) => {
                    skipped_count += 1;
                    tracing::warn!(
                        rule_id = %rule.id,
                        policy_id = %rule.policy_id,
                        %reason,
                        "Excluding malformed rule from index"
                    );
                    continue;
                }
            };

            rule_count += 1;
            if !indexed.pattern.is_wildcard() && indexed.operation != "*" {
                let key = (
                    indexed.context,
                    indexed.pattern.as_str().to_string(),
                    indexed.operation.clone(),
                );
                exact.entry(key).or_default().push(indexed);
            } else {
                fallback.entry(indexed.context).or_default().push(indexed);
            }
        }

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            version,
            rules = rule_count,
            skipped = skipped_count,
            exact_buckets = exact.len(),
            "Rule index built"
        );

        RuleIndex {
            exact,
            fallback,
            version,
            built_at: now,
            rule_count,
            skipped_count,
        }
    }

    fn compile_rule(rule: &RuleRecord, policy: &PolicyRecord) -> Result<IndexedRule, String> {
        if let Some(ref allowed_ops) = policy.operations {
            let in_scope = rule.operation != "*" && allowed_ops.contains(&rule.operation);
            if !in_scope {
                return Err(format!(
                    "operation '{}' outside policy scope",
                    rule.operation
                ));
            }
        }

        let pattern =
            ResourcePattern::compile(&rule.resource).map_err(|e| e.to_string())?;
        let condition = rule
            .condition
            .as_ref()
            .map(|c| ConditionExpr::parse(c))
            .transpose()
            .map_err(|e| e.to_string())?;

        Ok(IndexedRule {
            rule_id: rule.id.clone(),
            policy_id: policy.id.clone(),
            effect: rule.effect,
            priority: (policy.priority, rule.priority),
            context: rule.context,
            pattern,
            operation: rule.operation.clone(),
            scope_subjects: policy.subjects.clone(),
            subject: rule.subject.clone(),
            condition,
            // The stricter of policy floor and rule level applies.
            security_level: policy.security_level.max(rule.security_level),
            risk_hint: rule.risk_hint,
            created_at: rule.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn policy(id: &str, priority: i32) -> PolicyRecord {
        PolicyRecord {
            id: id.to_string(),
            tenant: "acme".to_string(),
            name: format!("Policy {id}"),
            active: true,
            priority,
            effective_from: None,
            expires_at: None,
            security_level: 0,
            subjects: None,
            operations: None,
        }
    }

    fn rule(id: &str, policy_id: &str, resource: &str, operation: &str) -> RuleRecord {
        RuleRecord {
            id: id.to_string(),
            policy_id: policy_id.to_string(),
            effect: RuleEffect::Allow,
            priority: 0,
            context: RuleContext::Data,
            resource: resource.to_string(),
            operation: operation.to_string(),
            subject: None,
            condition: None,
            security_level: 0,
            risk_hint: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn test_exact_and_fallback_buckets() {
        let builder = RuleIndexBuilder::new();
        let policies = vec![policy("p1", 0)];
        let rules = vec![
            rule("exact", "p1", "invoice/42", "read"),
            rule("glob", "p1", "invoice/*", "read"),
            rule("any-op", "p1", "invoice/42", "*"),
        ];
        let index = builder.build(&policies, &rules, OffsetDateTime::now_utc());

        assert_eq!(index.rule_count(), 3);
        let candidates = index.candidates(RuleContext::Data, "invoice/42", "read");
        let ids: Vec<&str> = candidates.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(candidates.len(), 3);
        assert!(ids.contains(&"exact"));
        assert!(ids.contains(&"glob"));
        assert!(ids.contains(&"any-op"));

        // A different resource only reaches the glob.
        let candidates = index.candidates(RuleContext::Data, "invoice/7", "read");
        let ids: Vec<&str> = candidates.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["glob"]);
    }

    #[test]
    fn test_context_separation() {
        let builder = RuleIndexBuilder::new();
        let policies = vec![policy("p1", 0)];
        let mut api_rule = rule("api", "p1", "invoice/*", "read");
        api_rule.context = RuleContext::Api;
        let rules = vec![rule("data", "p1", "invoice/*", "read"), api_rule];
        let index = builder.build(&policies, &rules, OffsetDateTime::now_utc());

        let candidates = index.candidates(RuleContext::Api, "invoice/42", "read");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].rule_id, "api");
    }

    #[test]
    fn test_expired_policy_drops_rules() {
        let builder = RuleIndexBuilder::new();
        let now = OffsetDateTime::now_utc();
        let mut expired = policy("p1", 0);
        expired.expires_at = Some(now - Duration::hours(1));
        let rules = vec![rule("r1", "p1", "invoice/*", "read")];
        let index = builder.build(&[expired], &rules, now);

        assert_eq!(index.rule_count(), 0);
        assert!(index.candidates(RuleContext::Data, "invoice/1", "read").is_empty());
    }

    #[test]
    fn test_malformed_rule_excluded_not_fatal() {
        let builder = RuleIndexBuilder::new();
        let policies = vec![policy("p1", 0)];
        let mut bad = rule("bad", "p1", "invoice/*", "read");
        bad.condition = Some(serde_json::json!({ "path": "x", "op": "like", "value": 1 }));
        let rules = vec![bad, rule("good", "p1", "invoice/*", "read")];
        let index = builder.build(&policies, &rules, OffsetDateTime::now_utc());

        assert_eq!(index.rule_count(), 1);
        assert_eq!(index.skipped_count(), 1);
        let candidates = index.candidates(RuleContext::Data, "invoice/1", "read");
        assert_eq!(candidates[0].rule_id, "good");
    }

    #[test]
    fn test_operation_outside_policy_scope_excluded() {
        let builder = RuleIndexBuilder::new();
        let mut scoped = policy("p1", 0);
        scoped.operations = Some(vec!["read".to_string()]);
        let rules = vec![
            rule("ok", "p1", "invoice/*", "read"),
            rule("out", "p1", "invoice/*", "delete"),
        ];
        let index = builder.build(&[scoped], &rules, OffsetDateTime::now_utc());

        assert_eq!(index.rule_count(), 1);
        assert_eq!(index.skipped_count(), 1);
    }

    #[test]
    fn test_security_level_stricter_of_two() {
        let builder = RuleIndexBuilder::new();
        let mut p = policy("p1", 0);
        p.security_level = 3;
        let mut low = rule("low", "p1", "invoice/*", "read");
        low.security_level = 1;
        let mut high = rule("high", "p1", "invoice/*", "read");
        high.security_level = 5;
        let index = builder.build(&[p], &[low, high], OffsetDateTime::now_utc());

        let candidates = index.candidates(RuleContext::Data, "invoice/1", "read");
        for c in candidates {
            match c.rule_id.as_str() {
                "low" => assert_eq!(c.security_level, 3),
                "high" => assert_eq!(c.security_level, 5),
                other => panic!("unexpected rule {other}"),
            }
        }
    }

    #[test]
    fn test_version_increments() {
        let builder = RuleIndexBuilder::new();
        let i1 = builder.build(&[], &[], OffsetDateTime::now_utc());
        let i2 = builder.build(&[], &[], OffsetDateTime::now_utc());
        assert_eq!(i1.version(), 1);
        assert_eq!(i2.version(), 2);
    }
}
