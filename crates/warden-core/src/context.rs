//! Per-request access context.
//!
//! An [`AccessRequest`] carries everything the engine needs to decide one
//! request: the already-authenticated subject, the target resource and
//! operation, and the network environment. It is ephemeral - built by the
//! embedding service for one decision and dropped afterwards.
//!
//! Condition expressions address the context through dotted attribute
//! paths (e.g. `subject.department`, `network.ip`); [`AccessRequest::attribute`]
//! resolves those paths.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::model::RuleContext;

// =============================================================================
// Subject
// =============================================================================

/// The already-authenticated subject of a request.
///
/// Authentication is an upstream concern; the engine receives the subject
/// as established fact and only matches against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// Stable subject identifier.
    pub id: String,

    /// Assigned roles.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Department the subject belongs to, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    /// Security clearance level. Rules with a higher effective security
    /// level cannot grant this subject access.
    #[serde(default)]
    pub clearance: u8,

    /// Free-form attributes from the identity provider or user record.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,

    /// Locations the subject usually connects from, for geo risk scoring.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usual_locations: Vec<GeoPoint>,

    /// Hour-of-day window (UTC, inclusive start, exclusive end) the subject
    /// usually works in, for time-of-day risk scoring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usual_hours: Option<(u8, u8)>,
}

impl Subject {
    /// Create a subject with just an id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
            department: None,
            clearance: 0,
            attributes: HashMap::new(),
            usual_locations: Vec::new(),
            usual_hours: None,
        }
    }

    /// Returns `true` if the subject has a specific role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

// =============================================================================
// Network Context
// =============================================================================

/// Network environment the request arrived from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkContext {
    /// Source IP address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,

    /// Device identifier reported by the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Whether the device is enrolled/trusted.
    #[serde(default)]
    pub trusted_device: bool,

    /// Reported geolocation of the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoPoint>,
}

/// A geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

// =============================================================================
// Access Request
// =============================================================================

/// Complete context for one access control decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    /// Tenant the request belongs to.
    pub tenant: String,

    /// The authenticated subject.
    pub subject: Subject,

    /// Resource identifier being accessed (e.g. `invoice/secret`).
    pub resource: String,

    /// Operation being performed (e.g. `read`, `approve`).
    pub operation: String,

    /// Which layer the resource belongs to; selects the rule buckets
    /// consulted by the index.
    #[serde(default)]
    pub resource_context: RuleContext,

    /// Network environment.
    #[serde(default)]
    pub network: NetworkContext,

    /// When the request was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,

    /// Hard deadline for the decision. Past this instant the engine fails
    /// closed rather than keep the caller waiting.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deadline: Option<OffsetDateTime>,
}

impl AccessRequest {
    /// Create a request with the minimum required fields.
    #[must_use]
    pub fn new(
        tenant: impl Into<String>,
        subject: Subject,
        resource: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            subject,
            resource: resource.into(),
            operation: operation.into(),
            resource_context: RuleContext::default(),
            network: NetworkContext::default(),
            timestamp: OffsetDateTime::now_utc(),
            deadline: None,
        }
    }

    /// Set the network context.
    #[must_use]
    pub fn with_network(mut self, network: NetworkContext) -> Self {
        self.network = network;
        self
    }

    /// Set the resource context layer.
    #[must_use]
    pub fn with_resource_context(mut self, context: RuleContext) -> Self {
        self.resource_context = context;
        self
    }

    /// Set the decision deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: OffsetDateTime) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Returns `true` if the deadline has passed at `now`.
    #[must_use]
    pub fn deadline_exceeded(&self, now: OffsetDateTime) -> bool {
        self.deadline.is_some_and(|d| now > d)
    }

    /// Resolve a dotted attribute path against this context.
    ///
    /// Supported roots: `subject`, `resource`, `operation`, `network`,
    /// `tenant`. Custom subject attributes are reachable under
    /// `subject.<key>` and nest further via their JSON structure.
    ///
    /// Returns `None` for unknown paths - the condition evaluator turns
    /// that into a failed (false) predicate rather than an error.
    #[must_use]
    pub fn attribute(&self, path: &str) -> Option<serde_json::Value> {
        let mut parts = path.split('.');
        let root = parts.next()?;
        match root {
            "tenant" => leaf_only(parts, serde_json::Value::String(self.tenant.clone())),
            "resource" => leaf_only(parts, serde_json::Value::String(self.resource.clone())),
            "operation" => leaf_only(parts, serde_json::Value::String(self.operation.clone())),
            "subject" => self.subject_attribute(parts),
            "network" => self.network_attribute(parts),
            _ => None,
        }
    }

    fn subject_attribute<'a>(
        &self,
        mut parts: impl Iterator<Item = &'a str>,
    ) -> Option<serde_json::Value> {
        let field = parts.next()?;
        match field {
            "id" => leaf_only(parts, serde_json::Value::String(self.subject.id.clone())),
            "roles" => leaf_only(parts, serde_json::json!(self.subject.roles)),
            "department" => {
                let dept = self.subject.department.clone()?;
                leaf_only(parts, serde_json::Value::String(dept))
            }
            "clearance" => leaf_only(parts, serde_json::json!(self.subject.clearance)),
            key => {
                let mut value = self.subject.attributes.get(key)?;
                for part in parts {
                    value = value.get(part)?;
                }
                Some(value.clone())
            }
        }
    }

    fn network_attribute<'a>(
        &self,
        mut parts: impl Iterator<Item = &'a str>,
    ) -> Option<serde_json::Value> {
        let field = parts.next()?;
        match field {
            "ip" => {
                let ip = self.network.ip?;
                leaf_only(parts, serde_json::Value::String(ip.to_string()))
            }
            "device" => {
                let device = self.network.device_id.clone()?;
                leaf_only(parts, serde_json::Value::String(device))
            }
            "trusted_device" => leaf_only(parts, serde_json::json!(self.network.trusted_device)),
            _ => None,
        }
    }
}

/// Accept `value` only if the path is exhausted.
fn leaf_only<'a>(
    mut rest: impl Iterator<Item = &'a str>,
    value: serde_json::Value,
) -> Option<serde_json::Value> {
    if rest.next().is_some() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AccessRequest {
        let mut subject = Subject::new("u-1");
        subject.roles = vec!["accountant".to_string()];
        subject.department = Some("finance".to_string());
        subject.attributes.insert(
            "employment".to_string(),
            serde_json::json!({ "grade": 7, "contract": "permanent" }),
        );
        AccessRequest::new("acme", subject, "invoice/42", "read")
    }

    #[test]
    fn test_builtin_paths() {
        let req = request();
        assert_eq!(req.attribute("tenant"), Some(serde_json::json!("acme")));
        assert_eq!(
            req.attribute("resource"),
            Some(serde_json::json!("invoice/42"))
        );
        assert_eq!(req.attribute("operation"), Some(serde_json::json!("read")));
        assert_eq!(req.attribute("subject.id"), Some(serde_json::json!("u-1")));
        assert_eq!(
            req.attribute("subject.department"),
            Some(serde_json::json!("finance"))
        );
    }

    #[test]
    fn test_nested_custom_attribute() {
        let req = request();
        assert_eq!(
            req.attribute("subject.employment.grade"),
            Some(serde_json::json!(7))
        );
        assert_eq!(
            req.attribute("subject.employment.contract"),
            Some(serde_json::json!("permanent"))
        );
    }

    #[test]
    fn test_missing_paths_are_none() {
        let req = request();
        assert_eq!(req.attribute("subject.badge"), None);
        assert_eq!(req.attribute("network.ip"), None);
        assert_eq!(req.attribute("nonsense"), None);
        // A path past a leaf is not a match.
        assert_eq!(req.attribute("subject.id.extra"), None);
    }

    #[test]
    fn test_deadline() {
        let now = OffsetDateTime::now_utc();
        let req = request().with_deadline(now - time::Duration::seconds(1));
        assert!(req.deadline_exceeded(now));
        let req = request().with_deadline(now + time::Duration::seconds(30));
        assert!(!req.deadline_exceeded(now));
    }
}
