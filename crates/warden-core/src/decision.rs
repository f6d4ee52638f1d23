//! Decision outcomes for access control requests.
//!
//! A [`Decision`] is the immutable record of the outcome for one request.
//! It is created once per request and never mutated; the audit recorder
//! derives append-only audit records from it.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Decision Type
// =============================================================================

/// The outcome of an access control decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionType {
    /// Access is granted.
    Allow,
    /// Access is denied.
    Deny,
    /// Access requires a secondary verification step before it can be granted.
    Challenge,
    /// The engine could not complete evaluation. Callers must treat this
    /// identically to [`DecisionType::Deny`].
    Error,
}

impl DecisionType {
    /// Restrictiveness rank used when merging outcomes across engines.
    ///
    /// Higher means more restrictive: allow < challenge < deny < error.
    /// Error ranks above deny so a mid-pipeline failure is never shadowed
    /// by a permissive outcome from another engine.
    #[must_use]
    pub fn restrictiveness(self) -> u8 {
        match self {
            Self::Allow => 0,
            Self::Challenge => 1,
            Self::Deny => 2,
            Self::Error => 3,
        }
    }

    /// Returns `true` if access was granted.
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Returns `true` if access was refused (deny or error).
    #[must_use]
    pub fn is_denied(self) -> bool {
        matches!(self, Self::Deny | Self::Error)
    }

    /// Returns `true` if step-up verification is required.
    #[must_use]
    pub fn is_challenge(self) -> bool {
        matches!(self, Self::Challenge)
    }

    /// The more restrictive of two decision types.
    #[must_use]
    pub fn most_restrictive(self, other: Self) -> Self {
        if other.restrictiveness() > self.restrictiveness() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Challenge => "challenge",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Decision Reason
// =============================================================================

/// Explanation attached to a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionReason {
    /// Error code for programmatic handling.
    pub code: String,

    /// Human-readable message.
    pub message: String,

    /// Additional details about the decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl DecisionReason {
    /// Create a reason for a rule-driven outcome.
    #[must_use]
    pub fn rule_matched(rule_id: &str, effect: &str) -> Self {
        Self {
            code: "rule-matched".to_string(),
            message: format!("Rule '{rule_id}' resolved to {effect}"),
            details: None,
        }
    }

    /// Create a reason for the engine default applying.
    #[must_use]
    pub fn no_matching_rule() -> Self {
        Self {
            code: "no-matching-rule".to_string(),
            message: "No rule matched the request; engine default applied".to_string(),
            details: None,
        }
    }

    /// Create a reason for a risk-driven escalation to challenge.
    #[must_use]
    pub fn risk_escalated(score: f64, threshold: f64) -> Self {
        Self {
            code: "risk-escalated".to_string(),
            message: format!("Risk score {score:.1} exceeded threshold {threshold:.1}"),
            details: Some(serde_json::json!({ "score": score, "threshold": threshold })),
        }
    }

    /// Create a reason for a deadline overrun.
    #[must_use]
    pub fn deadline_exceeded() -> Self {
        Self {
            code: "deadline-exceeded".to_string(),
            message: "Decision deadline exceeded; failing closed".to_string(),
            details: None,
        }
    }

    /// Create a reason for an internal evaluation failure.
    #[must_use]
    pub fn engine_error(message: impl Into<String>) -> Self {
        Self {
            code: "engine-error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    /// Create a reason for a tenant with no configured engine.
    #[must_use]
    pub fn unknown_tenant(tenant: &str) -> Self {
        Self {
            code: "unknown-tenant".to_string(),
            message: format!("No decision engine configured for tenant '{tenant}'"),
            details: None,
        }
    }
}

// =============================================================================
// Decision
// =============================================================================

/// Immutable record of the outcome for one access request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Unique decision id, carried into the audit trail.
    pub id: Uuid,

    /// Tenant the request belonged to.
    pub tenant: String,

    /// The outcome.
    pub decision: DecisionType,

    /// Why the outcome was reached.
    pub reason: DecisionReason,

    /// The policy that produced the winning rule, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_policy_id: Option<String>,

    /// The winning rule, if any. `None` when the engine default applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule_id: Option<String>,

    /// Computed contextual risk score, 0-100.
    pub risk_score: f64,

    /// Confidence in the decision, 0-1. Lowered when the default decision
    /// applied or when evaluation was cut short.
    pub confidence: f64,

    /// Resource the request targeted.
    pub resource: String,

    /// Operation the request asked for.
    pub operation: String,

    /// When the decision was made.
    #[serde(with = "time::serde::rfc3339")]
    pub decided_at: OffsetDateTime,

    /// Time spent evaluating, in microseconds.
    pub evaluation_micros: u64,
}

impl Decision {
    /// Create a decision with a fresh id, full confidence and zero risk.
    /// Callers fill in the matched rule, risk score and timing afterwards.
    #[must_use]
    pub fn new(
        tenant: impl Into<String>,
        decision: DecisionType,
        reason: DecisionReason,
        resource: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant: tenant.into(),
            decision,
            reason,
            matched_policy_id: None,
            matched_rule_id: None,
            risk_score: 0.0,
            confidence: 1.0,
            resource: resource.into(),
            operation: operation.into(),
            decided_at: OffsetDateTime::now_utc(),
            evaluation_micros: 0,
        }
    }

    /// Returns `true` if the caller may proceed without further checks.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.decision.is_allowed()
    }

    /// Returns `true` if access was refused (deny or error).
    #[must_use]
    pub fn is_denied(&self) -> bool {
        self.decision.is_denied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restrictiveness_order() {
        assert!(DecisionType::Allow.restrictiveness() < DecisionType::Challenge.restrictiveness());
        assert!(DecisionType::Challenge.restrictiveness() < DecisionType::Deny.restrictiveness());
        assert!(DecisionType::Deny.restrictiveness() < DecisionType::Error.restrictiveness());
    }

    #[test]
    fn test_most_restrictive() {
        assert_eq!(
            DecisionType::Allow.most_restrictive(DecisionType::Deny),
            DecisionType::Deny
        );
        assert_eq!(
            DecisionType::Challenge.most_restrictive(DecisionType::Allow),
            DecisionType::Challenge
        );
        assert_eq!(
            DecisionType::Deny.most_restrictive(DecisionType::Deny),
            DecisionType::Deny
        );
    }

    #[test]
    fn test_error_treated_as_denied() {
        assert!(DecisionType::Error.is_denied());
        assert!(!DecisionType::Error.is_allowed());
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(DecisionReason::no_matching_rule().code, "no-matching-rule");
        assert_eq!(
            DecisionReason::risk_escalated(95.0, 80.0).code,
            "risk-escalated"
        );
        assert!(DecisionReason::risk_escalated(95.0, 80.0).details.is_some());
        assert_eq!(
            DecisionReason::deadline_exceeded().code,
            "deadline-exceeded"
        );
    }
}
