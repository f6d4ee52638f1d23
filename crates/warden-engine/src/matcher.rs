//! Subject matching.
//!
//! Determines whether a rule's (or a policy scope's) subject criteria
//! apply to the authenticated subject. All specified criteria must match
//! (AND logic); a criterion set to `None` matches any subject.

use warden_core::{Subject, SubjectMatcher};

/// Check a subject against a matcher.
///
/// Returns `true` if ALL specified criteria match. A matcher with no
/// criteria matches every subject.
#[must_use]
pub fn matches_subject(matcher: &SubjectMatcher, subject: &Subject) -> bool {
    matches_users(matcher, subject)
        && matches_roles(matcher, subject)
        && matches_departments(matcher, subject)
        && matches_attributes(matcher, subject)
}

fn matches_users(matcher: &SubjectMatcher, subject: &Subject) -> bool {
    matcher
        .users
        .as_ref()
        .is_none_or(|users| users.iter().any(|u| u == &subject.id))
}

fn matches_roles(matcher: &SubjectMatcher, subject: &Subject) -> bool {
    matcher
        .roles
        .as_ref()
        .is_none_or(|roles| roles.iter().any(|r| subject.has_role(r)))
}

fn matches_departments(matcher: &SubjectMatcher, subject: &Subject) -> bool {
    let Some(ref departments) = matcher.departments else {
        return true;
    };
    subject
        .department
        .as_ref()
        .is_some_and(|d| departments.contains(d))
}

fn matches_attributes(matcher: &SubjectMatcher, subject: &Subject) -> bool {
    matcher.attributes.as_ref().is_none_or(|attrs| {
        attrs
            .iter()
            .all(|(key, expected)| subject.attributes.get(key) == Some(expected))
    })
}

/// Check a subject against a policy-scope matcher and a rule matcher.
///
/// Both must match; either being `None` imposes no constraint.
#[must_use]
pub fn matches_both(
    scope: Option<&SubjectMatcher>,
    rule: Option<&SubjectMatcher>,
    subject: &Subject,
) -> bool {
    scope.is_none_or(|m| matches_subject(m, subject))
        && rule.is_none_or(|m| matches_subject(m, subject))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> Subject {
        let mut s = Subject::new("u-1");
        s.roles = vec!["accountant".to_string(), "viewer".to_string()];
        s.department = Some("finance".to_string());
        s.attributes
            .insert("region".to_string(), serde_json::json!("emea"));
        s
    }

    #[test]
    fn test_empty_matcher_matches_everyone() {
        let m = SubjectMatcher::default();
        assert!(m.is_empty());
        assert!(matches_subject(&m, &subject()));
    }

    #[test]
    fn test_role_match_any() {
        let m = SubjectMatcher {
            roles: Some(vec!["admin".to_string(), "viewer".to_string()]),
            ..Default::default()
        };
        assert!(matches_subject(&m, &subject()));

        let m = SubjectMatcher {
            roles: Some(vec!["admin".to_string()]),
            ..Default::default()
        };
        assert!(!matches_subject(&m, &subject()));
    }

    #[test]
    fn test_all_criteria_required() {
        let m = SubjectMatcher {
            roles: Some(vec!["accountant".to_string()]),
            departments: Some(vec!["engineering".to_string()]),
            ..Default::default()
        };
        // Role matches, department does not.
        assert!(!matches_subject(&m, &subject()));
    }

    #[test]
    fn test_attribute_equality() {
        let mut attrs = std::collections::HashMap::new();
        attrs.insert("region".to_string(), serde_json::json!("emea"));
        let m = SubjectMatcher {
            attributes: Some(attrs.clone()),
            ..Default::default()
        };
        assert!(matches_subject(&m, &subject()));

        attrs.insert("region".to_string(), serde_json::json!("apac"));
        let m = SubjectMatcher {
            attributes: Some(attrs),
            ..Default::default()
        };
        assert!(!matches_subject(&m, &subject()));
    }

    #[test]
    fn test_missing_department_fails_department_criterion() {
        let mut s = subject();
        s.department = None;
        let m = SubjectMatcher {
            departments: Some(vec!["finance".to_string()]),
            ..Default::default()
        };
        assert!(!matches_subject(&m, &s));
    }

    #[test]
    fn test_scope_and_rule_both_required() {
        let scope = SubjectMatcher {
            departments: Some(vec!["finance".to_string()]),
            ..Default::default()
        };
        let rule = SubjectMatcher {
            roles: Some(vec!["accountant".to_string()]),
            ..Default::default()
        };
        assert!(matches_both(Some(&scope), Some(&rule), &subject()));

        let narrow_scope = SubjectMatcher {
            departments: Some(vec!["hr".to_string()]),
            ..Default::default()
        };
        assert!(!matches_both(Some(&narrow_scope), Some(&rule), &subject()));
        assert!(matches_both(None, None, &subject()));
    }
}
