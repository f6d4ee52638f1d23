//! Condition expression trees.
//!
//! Rules carry an optional condition: a boolean combination of leaf
//! predicates comparing a context attribute against a literal or set.
//! Conditions are stored as JSON and parsed once at index build time -
//! never re-parsed per request. A malformed tree or unknown operator is
//! a parse error, which excludes the owning rule from the index.
//!
//! Evaluation is pure, side-effect-free, and fail-closed: a missing
//! attribute makes its leaf `false`, never an error, so a single absent
//! field cannot crash or open up evaluation.
//!
//! # Stored format
//!
//! ```json
//! { "all": [
//!     { "path": "subject.department", "op": "eq", "value": "finance" },
//!     { "not": { "path": "subject.grade", "op": "lt", "value": 5 } }
//! ] }
//! ```

use regex::Regex;

use warden_core::{AccessRequest, CoreError, Result};

// =============================================================================
// Condition Expression
// =============================================================================

/// A parsed condition expression tree.
#[derive(Debug, Clone)]
pub enum ConditionExpr {
    /// All children must hold. An empty list holds vacuously.
    All(Vec<ConditionExpr>),
    /// At least one child must hold. An empty list never holds.
    Any(Vec<ConditionExpr>),
    /// The child must not hold.
    Not(Box<ConditionExpr>),
    /// Leaf predicate over one context attribute.
    Compare {
        /// Dotted attribute path (e.g. `subject.department`).
        path: String,
        /// Comparison operator.
        op: ConditionOp,
        /// Literal or set to compare against.
        value: serde_json::Value,
    },
}

/// Comparison operators supported in leaf predicates.
#[derive(Debug, Clone)]
pub enum ConditionOp {
    Eq,
    Neq,
    /// Membership in an array literal.
    In,
    Gt,
    Lt,
    Gte,
    Lte,
    /// Regex match; the pattern compiles at parse time.
    Matches(Regex),
}

impl ConditionExpr {
    /// Parse a stored JSON condition tree.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidCondition` for malformed trees and
    /// `CoreError::UnknownOperator` for unsupported operators. Both
    /// exclude the owning rule from the index.
    pub fn parse(value: &serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| CoreError::invalid_condition("condition node must be an object"))?;

        if let Some(children) = obj.get("all") {
            return Ok(Self::All(Self::parse_children(children)?));
        }
        if let Some(children) = obj.get("any") {
            return Ok(Self::Any(Self::parse_children(children)?));
        }
        if let Some(child) = obj.get("not") {
            return Ok(Self::Not(Box::new(Self::parse(child)?)));
        }

        // Leaf predicate.
        let path = obj
            .get("path")
            .and_then(|p| p.as_str())
            .ok_or_else(|| CoreError::invalid_condition("leaf predicate missing 'path'"))?;
        let op_name = obj
            .get("op")
            .and_then(|o| o.as_str())
            .ok_or_else(|| CoreError::invalid_condition("leaf predicate missing 'op'"))?;
        let literal = obj
            .get("value")
            .cloned()
            .ok_or_else(|| CoreError::invalid_condition("leaf predicate missing 'value'"))?;

        let op = match op_name {
            "eq" => ConditionOp::Eq,
            "neq" => ConditionOp::Neq,
            "in" => {
                if !literal.is_array() {
                    return Err(CoreError::invalid_condition(
                        "'in' operator requires an array value",
                    ));
                }
                ConditionOp::In
            }
            "gt" => ConditionOp::Gt,
            "lt" => ConditionOp::Lt,
            "gte" => ConditionOp::Gte,
            "lte" => ConditionOp::Lte,
            "matches" => {
                let pattern = literal.as_str().ok_or_else(|| {
                    CoreError::invalid_condition("'matches' operator requires a string value")
                })?;
                let regex = Regex::new(pattern)
                    .map_err(|e| CoreError::invalid_condition(format!("bad regex: {e}")))?;
                ConditionOp::Matches(regex)
            }
            other => return Err(CoreError::unknown_operator(other)),
        };

        Ok(Self::Compare {
            path: path.to_string(),
            op,
            value: literal,
        })
    }

    fn parse_children(value: &serde_json::Value) -> Result<Vec<Self>> {
        let items = value
            .as_array()
            .ok_or_else(|| CoreError::invalid_condition("'all'/'any' must hold an array"))?;
        items.iter().map(Self::parse).collect()
    }

    /// Evaluate the tree against a request context.
    ///
    /// Pure and fail-closed: missing attributes make their leaf `false`.
    #[must_use]
    pub fn evaluate(&self, request: &AccessRequest) -> bool {
        match self {
            Self::All(children) => children.iter().all(|c| c.evaluate(request)),
            Self::Any(children) => children.iter().any(|c| c.evaluate(request)),
            Self::Not(child) => !child.evaluate(request),
            Self::Compare { path, op, value } => {
                let Some(actual) = request.attribute(path) else {
                    return false;
                };
                compare(&actual, op, value)
            }
        }
    }
}

fn compare(actual: &serde_json::Value, op: &ConditionOp, expected: &serde_json::Value) -> bool {
    match op {
        ConditionOp::Eq => json_eq(actual, expected),
        ConditionOp::Neq => !json_eq(actual, expected),
        ConditionOp::In => expected
            .as_array()
            .is_some_and(|items| items.iter().any(|i| json_eq(actual, i))),
        ConditionOp::Gt => json_cmp(actual, expected).is_some_and(|o| o.is_gt()),
        ConditionOp::Lt => json_cmp(actual, expected).is_some_and(|o| o.is_lt()),
        ConditionOp::Gte => json_cmp(actual, expected).is_some_and(|o| o.is_ge()),
        ConditionOp::Lte => json_cmp(actual, expected).is_some_and(|o| o.is_le()),
        ConditionOp::Matches(regex) => actual.as_str().is_some_and(|s| regex.is_match(s)),
    }
}

/// Equality with numeric coercion so `7` and `7.0` compare equal.
fn json_eq(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Ordering for numbers and strings; incomparable kinds yield `None`,
/// which fails the predicate closed.
fn json_cmp(a: &serde_json::Value, b: &serde_json::Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return Some(x.cmp(y));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::Subject;

    fn request() -> AccessRequest {
        let mut subject = Subject::new("u-1");
        subject.department = Some("finance".to_string());
        subject.roles = vec!["accountant".to_string()];
        subject
            .attributes
            .insert("grade".to_string(), serde_json::json!(7));
        AccessRequest::new("acme", subject, "invoice/42", "read")
    }

    fn parse(json: serde_json::Value) -> ConditionExpr {
        ConditionExpr::parse(&json).unwrap()
    }

    #[test]
    fn test_leaf_eq() {
        let c = parse(serde_json::json!({
            "path": "subject.department", "op": "eq", "value": "finance"
        }));
        assert!(c.evaluate(&request()));

        let c = parse(serde_json::json!({
            "path": "subject.department", "op": "eq", "value": "hr"
        }));
        assert!(!c.evaluate(&request()));
    }

    #[test]
    fn test_missing_attribute_fails_closed() {
        let c = parse(serde_json::json!({
            "path": "subject.badge", "op": "eq", "value": "any"
        }));
        assert!(!c.evaluate(&request()));

        // Even neq fails closed on a missing attribute.
        let c = parse(serde_json::json!({
            "path": "subject.badge", "op": "neq", "value": "any"
        }));
        assert!(!c.evaluate(&request()));
    }

    #[test]
    fn test_numeric_comparisons() {
        let req = request();
        let gt = parse(serde_json::json!({ "path": "subject.grade", "op": "gt", "value": 5 }));
        assert!(gt.evaluate(&req));
        let lte = parse(serde_json::json!({ "path": "subject.grade", "op": "lte", "value": 7 }));
        assert!(lte.evaluate(&req));
        let lt = parse(serde_json::json!({ "path": "subject.grade", "op": "lt", "value": 7 }));
        assert!(!lt.evaluate(&req));
        // Integer attribute against float literal.
        let eq = parse(serde_json::json!({ "path": "subject.grade", "op": "eq", "value": 7.0 }));
        assert!(eq.evaluate(&req));
    }

    #[test]
    fn test_in_operator() {
        let c = parse(serde_json::json!({
            "path": "operation", "op": "in", "value": ["read", "list"]
        }));
        assert!(c.evaluate(&request()));

        let c = parse(serde_json::json!({
            "path": "operation", "op": "in", "value": ["delete"]
        }));
        assert!(!c.evaluate(&request()));
    }

    #[test]
    fn test_matches_operator() {
        let c = parse(serde_json::json!({
            "path": "resource", "op": "matches", "value": "^invoice/\\d+$"
        }));
        assert!(c.evaluate(&request()));
    }

    #[test]
    fn test_boolean_combinations() {
        let c = parse(serde_json::json!({
            "all": [
                { "path": "subject.department", "op": "eq", "value": "finance" },
                { "any": [
                    { "path": "operation", "op": "eq", "value": "read" },
                    { "path": "operation", "op": "eq", "value": "list" }
                ]},
                { "not": { "path": "subject.grade", "op": "lt", "value": 5 } }
            ]
        }));
        assert!(c.evaluate(&request()));
    }

    #[test]
    fn test_empty_all_and_any() {
        assert!(parse(serde_json::json!({ "all": [] })).evaluate(&request()));
        assert!(!parse(serde_json::json!({ "any": [] })).evaluate(&request()));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = ConditionExpr::parse(&serde_json::json!({
            "path": "operation", "op": "like", "value": "re%"
        }))
        .unwrap_err();
        assert!(matches!(err, CoreError::UnknownOperator(_)));
    }

    #[test]
    fn test_malformed_trees_rejected() {
        assert!(ConditionExpr::parse(&serde_json::json!("just a string")).is_err());
        assert!(ConditionExpr::parse(&serde_json::json!({ "all": "not-an-array" })).is_err());
        assert!(ConditionExpr::parse(&serde_json::json!({ "op": "eq", "value": 1 })).is_err());
        assert!(
            ConditionExpr::parse(&serde_json::json!({
                "path": "x", "op": "in", "value": "not-an-array"
            }))
            .is_err()
        );
        assert!(
            ConditionExpr::parse(&serde_json::json!({
                "path": "x", "op": "matches", "value": "(unclosed"
            }))
            .is_err()
        );
    }

    #[test]
    fn test_incomparable_types_fail_closed() {
        // Comparing a string attribute with a number yields false, not an error.
        let c = parse(serde_json::json!({
            "path": "subject.department", "op": "gt", "value": 5
        }));
        assert!(!c.evaluate(&request()));
    }
}
