//! Decision resolution.
//!
//! Given the indexed candidate rules for a request, applies ordering and
//! combination semantics to produce a raw decision plus the winning
//! rule's explanation. This is the crux of the engine: the outcome must
//! be deterministic and independent of iteration order over the rule
//! set, so ties are broken all the way down to the rule id.

use std::sync::Arc;

use warden_core::{
    AccessRequest, CombiningMode, DecisionReason, DecisionType, RuleEffect,
};

use crate::index::IndexedRule;

// =============================================================================
// Resolution
// =============================================================================

/// Outcome of resolving candidate rules for one request.
#[derive(Debug)]
pub struct Resolution {
    /// The raw decision, before risk adjustment.
    pub decision: DecisionType,

    /// The winning rule, `None` when the engine default applied.
    pub matched: Option<Arc<IndexedRule>>,

    /// Explanation for the outcome.
    pub reason: DecisionReason,

    /// Confidence in the outcome: 1.0 for a rule-driven decision,
    /// lower when the default applied.
    pub confidence: f64,
}

// =============================================================================
// Resolve
// =============================================================================

/// Resolve candidate rules into a raw decision.
///
/// 1. Filter candidates whose subject criteria and condition hold.
///    An allow-ish rule whose effective security level exceeds the
///    subject's clearance is dropped; deny rules are never dropped
///    this way (restrictions cannot be waived by low clearance).
/// 2. If none remain, return the engine default with no matched rule.
/// 3. Order by resolved priority descending, then pattern specificity,
///    then creation time (earlier wins), then rule id.
/// 4. Apply the combining mode.
pub fn resolve(
    candidates: &[&Arc<IndexedRule>],
    request: &AccessRequest,
    default_decision: DecisionType,
    mode: CombiningMode,
) -> Resolution {
    let mut surviving: Vec<&Arc<IndexedRule>> = candidates
        .iter()
        .copied()
        .filter(|rule| applies(rule, request))
        .collect();

    if surviving.is_empty() {
        return Resolution {
            decision: default_decision,
            matched: None,
            reason: DecisionReason::no_matching_rule(),
            confidence: 0.5,
        };
    }

    surviving.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.pattern.specificity().cmp(&a.pattern.specificity()))
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });

    let winner = match mode {
        CombiningMode::DenyOverrides => surviving
            .iter()
            .copied()
            .find(|r| r.effect == RuleEffect::Deny)
            .unwrap_or(surviving[0]),
        CombiningMode::AllowOverrides => surviving
            .iter()
            .copied()
            .find(|r| r.effect == RuleEffect::Allow)
            .unwrap_or(surviving[0]),
        CombiningMode::FirstApplicable => surviving[0],
    };

    let decision = winner.effect.decision_type();
    tracing::debug!(
        rule_id = %winner.rule_id,
        policy_id = %winner.policy_id,
        effect = ?winner.effect,
        %decision,
        "Rule resolved"
    );

    Resolution {
        decision,
        reason: DecisionReason::rule_matched(&winner.rule_id, &decision.to_string()),
        matched: Some(Arc::clone(winner)),
        confidence: 1.0,
    }
}

/// Check whether a candidate rule applies to the request.
fn applies(rule: &IndexedRule, request: &AccessRequest) -> bool {
    let subject_ok = crate::matcher::matches_both(
        rule.scope_subjects.as_ref(),
        rule.subject.as_ref(),
        &request.subject,
    );
    if !subject_ok {
        return false;
    }

    if let Some(ref condition) = rule.condition
        && !condition.evaluate(request)
    {
        return false;
    }

    // Clearance floor: an under-cleared subject cannot be granted by the
    // rule, but can still be denied by it.
    if rule.effect != RuleEffect::Deny && rule.security_level > request.subject.clearance {
        return false;
    }

    true
}
