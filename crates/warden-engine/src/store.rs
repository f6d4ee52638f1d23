//! Policy store adapter.
//!
//! Defines the interface through which the engine reads engine, policy,
//! and rule records from external storage. Implementations are provided
//! by storage backends; [`MemoryPolicyStore`] ships for embedding and
//! tests.
//!
//! The store is only consulted by the index builder on a refresh trigger,
//! never on the decision hot path. If the store becomes unavailable the
//! engine keeps serving the last good index snapshot.

use async_trait::async_trait;
use tokio::sync::RwLock;

use warden_core::{EngineRecord, PolicyRecord, RuleRecord};

use crate::error::EngineResult;

// =============================================================================
// Policy Store Trait
// =============================================================================

/// Read access to the durable policy configuration.
///
/// All methods return plain data with no engine-specific behavior
/// attached; the rule index builder compiles them into the queryable
/// form.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// List the active engines configured for a tenant.
    async fn list_active_engines(&self, tenant: &str) -> EngineResult<Vec<EngineRecord>>;

    /// List the active policies for a tenant.
    async fn list_active_policies(&self, tenant: &str) -> EngineResult<Vec<PolicyRecord>>;

    /// List the active rules belonging to a policy.
    async fn list_active_rules(&self, policy_id: &str) -> EngineResult<Vec<RuleRecord>>;
}

// =============================================================================
// Memory Policy Store
// =============================================================================

/// In-memory policy store for embedding and tests.
#[derive(Default)]
pub struct MemoryPolicyStore {
    engines: RwLock<Vec<EngineRecord>>,
    policies: RwLock<Vec<PolicyRecord>>,
    rules: RwLock<Vec<RuleRecord>>,
}

impl MemoryPolicyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an engine record by id.
    pub async fn add_engine(&self, engine: EngineRecord) {
        let mut engines = self.engines.write().await;
        engines.retain(|e| e.id != engine.id);
        engines.push(engine);
    }

    /// Add or replace a policy record by id.
    pub async fn add_policy(&self, policy: PolicyRecord) {
        let mut policies = self.policies.write().await;
        policies.retain(|p| p.id != policy.id);
        policies.push(policy);
    }

    /// Add or replace a rule record by id.
    pub async fn add_rule(&self, rule: RuleRecord) {
        let mut rules = self.rules.write().await;
        rules.retain(|r| r.id != rule.id);
        rules.push(rule);
    }

    /// Remove all rules of a policy, e.g. before re-adding changed ones.
    pub async fn clear_rules(&self, policy_id: &str) {
        self.rules.write().await.retain(|r| r.policy_id != policy_id);
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn list_active_engines(&self, tenant: &str) -> EngineResult<Vec<EngineRecord>> {
        Ok(self
            .engines
            .read()
            .await
            .iter()
            .filter(|e| e.tenant == tenant && e.active)
            .cloned()
            .collect())
    }

    async fn list_active_policies(&self, tenant: &str) -> EngineResult<Vec<PolicyRecord>> {
        Ok(self
            .policies
            .read()
            .await
            .iter()
            .filter(|p| p.tenant == tenant && p.active)
            .cloned()
            .collect())
    }

    async fn list_active_rules(&self, policy_id: &str) -> EngineResult<Vec<RuleRecord>> {
        Ok(self
            .rules
            .read()
            .await
            .iter()
            .filter(|r| r.policy_id == policy_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use warden_core::{CombiningMode, DecisionType, EngineFlavor, RuleContext, RuleEffect};

    fn engine(tenant: &str) -> EngineRecord {
        EngineRecord {
            id: format!("{tenant}-engine"),
            tenant: tenant.to_string(),
            name: "Test engine".to_string(),
            flavor: EngineFlavor::Rbac,
            active: true,
            default_decision: DecisionType::Deny,
            combining_mode: CombiningMode::DenyOverrides,
            baseline: Vec::new(),
        }
    }

    fn policy(id: &str, tenant: &str) -> PolicyRecord {
        PolicyRecord {
            id: id.to_string(),
            tenant: tenant.to_string(),
            name: format!("Policy {id}"),
            active: true,
            priority: 0,
            effective_from: None,
            expires_at: None,
            security_level: 0,
            subjects: None,
            operations: None,
        }
    }

    fn rule(id: &str, policy_id: &str) -> RuleRecord {
        RuleRecord {
            id: id.to_string(),
            policy_id: policy_id.to_string(),
            effect: RuleEffect::Allow,
            priority: 0,
            context: RuleContext::Data,
            resource: "*".to_string(),
            operation: "*".to_string(),
            subject: None,
            condition: None,
            security_level: 0,
            risk_hint: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let store = MemoryPolicyStore::new();
        store.add_engine(engine("acme")).await;
        store.add_engine(engine("globex")).await;
        store.add_policy(policy("p1", "acme")).await;

        let engines = store.list_active_engines("acme").await.unwrap();
        assert_eq!(engines.len(), 1);
        assert_eq!(engines[0].tenant, "acme");

        assert!(store.list_active_policies("globex").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rules_scoped_to_policy() {
        let store = MemoryPolicyStore::new();
        store.add_rule(rule("r1", "p1")).await;
        store.add_rule(rule("r2", "p1")).await;
        store.add_rule(rule("r3", "p2")).await;

        assert_eq!(store.list_active_rules("p1").await.unwrap().len(), 2);
        assert_eq!(store.list_active_rules("p2").await.unwrap().len(), 1);

        store.clear_rules("p1").await;
        assert!(store.list_active_rules("p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_engine_filtered() {
        let store = MemoryPolicyStore::new();
        let mut e = engine("acme");
        e.active = false;
        store.add_engine(e).await;

        assert!(store.list_active_engines("acme").await.unwrap().is_empty());
    }
}
