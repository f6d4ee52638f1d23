//! Storage-facing policy model.
//!
//! These are the plain records the policy store adapter hands to the
//! engine: no behavior beyond validation helpers, serde-friendly, owned
//! by durable storage. The rule index compiles them into an immutable
//! queryable snapshot; nothing in the decision path reads them directly.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::decision::DecisionType;

// =============================================================================
// Enumerations
// =============================================================================

/// Access control strategy an engine is configured for.
///
/// The flavor is configuration, not a separate code path: matching always
/// flows through the same rule/policy model. The security clearance floor
/// applies whenever a rule carries a nonzero security level, whatever the
/// flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EngineFlavor {
    /// Role-based access control.
    Rbac,
    /// Attribute-based access control.
    Abac,
    /// Discretionary access control.
    Dac,
    /// Mandatory access control.
    Mac,
}

/// How an engine combines multiple matching rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CombiningMode {
    /// Any matching deny rule wins regardless of priority.
    DenyOverrides,
    /// The highest-ranked matching rule wins.
    FirstApplicable,
    /// Any matching allow rule wins regardless of priority.
    AllowOverrides,
}

/// The effect a rule asks for when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleEffect {
    Allow,
    Deny,
    Challenge,
    /// Grants access but requires step-up verification; resolves to
    /// challenge, never to a plain allow.
    Conditional,
}

impl RuleEffect {
    /// The decision type this effect resolves to.
    #[must_use]
    pub fn decision_type(self) -> DecisionType {
        match self {
            Self::Allow => DecisionType::Allow,
            Self::Deny => DecisionType::Deny,
            Self::Challenge | Self::Conditional => DecisionType::Challenge,
        }
    }
}

/// Which layer of the system a rule governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleContext {
    Module,
    Feature,
    Data,
    Api,
    System,
}

impl Default for RuleContext {
    fn default() -> Self {
        Self::Data
    }
}

// =============================================================================
// Subject Matcher
// =============================================================================

/// Criteria a subject must meet for a rule (or policy scope) to apply.
///
/// All specified fields must match (AND logic); a field set to `None`
/// matches any subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMatcher {
    /// Match by subject id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,

    /// Match by role (any listed role matches).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    /// Match by department.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departments: Option<Vec<String>>,

    /// Match by exact attribute values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<std::collections::HashMap<String, serde_json::Value>>,
}

impl SubjectMatcher {
    /// Returns `true` if no criteria are specified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_none()
            && self.roles.is_none()
            && self.departments.is_none()
            && self.attributes.is_none()
    }
}

// =============================================================================
// Engine Record
// =============================================================================

/// A role-based fallback grant baked into an engine.
///
/// Grants are folded into a synthetic lowest-priority policy at load
/// time so the defaults go through the same resolver path as every
/// other rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineGrant {
    /// Role the grant applies to.
    pub role: String,
    /// Resource pattern the grant covers.
    pub resource: String,
    /// Operation the grant covers.
    pub operation: String,
}

/// A configured decision engine as read from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineRecord {
    /// Unique engine identifier.
    pub id: String,

    /// Tenant the engine serves.
    pub tenant: String,

    /// Human-readable name.
    pub name: String,

    /// Access control strategy.
    pub flavor: EngineFlavor,

    /// Whether the engine participates in decisions.
    #[serde(default = "default_active")]
    pub active: bool,

    /// Decision when no rule matches.
    pub default_decision: DecisionType,

    /// How multiple matching rules are combined.
    pub combining_mode: CombiningMode,

    /// Role-based fallback grants, folded into a synthetic
    /// lowest-priority policy at load time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub baseline: Vec<BaselineGrant>,
}

// =============================================================================
// Policy Record
// =============================================================================

/// A named, prioritized bundle of rules as read from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRecord {
    /// Unique policy identifier.
    pub id: String,

    /// Tenant the policy belongs to.
    pub tenant: String,

    /// Human-readable name.
    pub name: String,

    /// Whether the policy is active.
    #[serde(default = "default_active")]
    pub active: bool,

    /// Policy priority; combined with rule priority into one total
    /// order (higher wins ties).
    #[serde(default)]
    pub priority: i32,

    /// Start of the effective window.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub effective_from: Option<OffsetDateTime>,

    /// End of the effective window.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,

    /// Security level floor. The stricter of this and a rule's own level
    /// applies.
    #[serde(default)]
    pub security_level: u8,

    /// Subjects this policy is scoped to. Applied on top of each rule's
    /// own matcher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjects: Option<SubjectMatcher>,

    /// Operations this policy is scoped to. A rule targeting an
    /// operation outside this list is a configuration error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operations: Option<Vec<String>>,
}

impl PolicyRecord {
    /// Returns `true` if the policy is active and inside its date window
    /// at `now`.
    #[must_use]
    pub fn is_effective_at(&self, now: OffsetDateTime) -> bool {
        self.active
            && self.effective_from.is_none_or(|from| now >= from)
            && self.expires_at.is_none_or(|until| now < until)
    }
}

// =============================================================================
// Rule Record
// =============================================================================

/// A single access rule as read from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    /// Unique rule identifier.
    pub id: String,

    /// The policy this rule belongs to.
    pub policy_id: String,

    /// The effect when the rule matches.
    pub effect: RuleEffect,

    /// Rule priority within the policy (higher wins ties).
    #[serde(default)]
    pub priority: i32,

    /// Which layer the rule governs.
    #[serde(default)]
    pub context: RuleContext,

    /// Resource pattern: exact identifier or wildcard segments
    /// (e.g. `invoice/*`).
    pub resource: String,

    /// Operation the rule covers, or `*` for any.
    pub operation: String,

    /// Subject criteria; `None` matches any subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<SubjectMatcher>,

    /// Condition expression tree as stored JSON. Parsed once at index
    /// build time; a malformed tree excludes the rule from the index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<serde_json::Value>,

    /// Rule security level. The stricter of this and the policy floor
    /// applies.
    #[serde(default)]
    pub security_level: u8,

    /// Risk hint: a floor applied to the computed risk score when this
    /// rule wins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_hint: Option<u8>,

    /// Creation time, used as the final determinism tie-break.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

fn default_active() -> bool {
    true
}
