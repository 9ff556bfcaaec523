// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Policy rules, typed attributes and the evaluation context.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::User;
use crate::rbac::{PermissionSet, WILDCARD};

// =============================================================================
// Effect
// =============================================================================

/// What a matching policy decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Grants access.
    Allow,
    /// Refuses access, overriding any allow.
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => f.write_str("allow"),
            Effect::Deny => f.write_str("deny"),
        }
    }
}

// =============================================================================
// Attribute
// =============================================================================

/// A closed set of attribute sources a condition can read.
///
/// Serialized as its dot path, e.g. `user.id` or `context.ip`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Attribute {
    /// `user.id`
    UserId,
    /// `user.username`
    Username,
    /// `user.email`
    UserEmail,
    /// `user.roles`
    UserRoles,
    /// `user.permissions`
    UserPermissions,
    /// `resource`
    Resource,
    /// `action`
    Action,
    /// `context.<key>`, supplied by the caller.
    Context(String),
}

impl Attribute {
    /// Parses a dot path.
    pub fn parse(path: &str) -> Option<Self> {
        match path {
            "user.id" => Some(Attribute::UserId),
            "user.username" => Some(Attribute::Username),
            "user.email" => Some(Attribute::UserEmail),
            "user.roles" => Some(Attribute::UserRoles),
            "user.permissions" => Some(Attribute::UserPermissions),
            "resource" => Some(Attribute::Resource),
            "action" => Some(Attribute::Action),
            other => other
                .strip_prefix("context.")
                .filter(|key| !key.is_empty())
                .map(|key| Attribute::Context(key.to_string())),
        }
    }

    /// Returns the dot path.
    pub fn path(&self) -> String {
        match self {
            Attribute::UserId => "user.id".into(),
            Attribute::Username => "user.username".into(),
            Attribute::UserEmail => "user.email".into(),
            Attribute::UserRoles => "user.roles".into(),
            Attribute::UserPermissions => "user.permissions".into(),
            Attribute::Resource => "resource".into(),
            Attribute::Action => "action".into(),
            Attribute::Context(key) => format!("context.{}", key),
        }
    }
}

impl TryFrom<String> for Attribute {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Attribute::parse(&value).ok_or_else(|| format!("unknown attribute: {}", value))
    }
}

impl From<Attribute> for String {
    fn from(value: Attribute) -> Self {
        value.path()
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

// =============================================================================
// AttributeValue
// =============================================================================

/// A value read from the context or compared against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean.
    Bool(bool),
    /// Number.
    Number(f64),
    /// String.
    Text(String),
    /// List of values.
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(value as f64)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(value: Vec<T>) -> Self {
        AttributeValue::List(value.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// Operator & Condition
// =============================================================================

/// Comparison applied by a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    /// Values are equal.
    Equals,
    /// Text contains the substring, or the list contains the element.
    Contains,
    /// Text starts with the value.
    StartsWith,
    /// Text ends with the value.
    EndsWith,
    /// Number is greater than the value.
    Gt,
    /// Number is less than the value.
    Lt,
    /// Actual value is one of the listed values.
    In,
}

impl Operator {
    /// Applies the operator. Mismatched types never match.
    pub fn apply(&self, actual: &AttributeValue, expected: &AttributeValue) -> bool {
        match self {
            Operator::Equals => actual == expected,
            Operator::Contains => match (actual, expected) {
                (AttributeValue::Text(a), AttributeValue::Text(e)) => a.contains(e.as_str()),
                (AttributeValue::List(items), e) => items.contains(e),
                _ => false,
            },
            Operator::StartsWith => match (actual.as_text(), expected.as_text()) {
                (Some(a), Some(e)) => a.starts_with(e),
                _ => false,
            },
            Operator::EndsWith => match (actual.as_text(), expected.as_text()) {
                (Some(a), Some(e)) => a.ends_with(e),
                _ => false,
            },
            Operator::Gt => match (actual.as_number(), expected.as_number()) {
                (Some(a), Some(e)) => a > e,
                _ => false,
            },
            Operator::Lt => match (actual.as_number(), expected.as_number()) {
                (Some(a), Some(e)) => a < e,
                _ => false,
            },
            Operator::In => match expected {
                AttributeValue::List(options) => options.contains(actual),
                _ => false,
            },
        }
    }
}

/// A single predicate over the evaluation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyCondition {
    /// Attribute to read.
    pub attribute: Attribute,
    /// Comparison.
    pub operator: Operator,
    /// Value compared against.
    pub value: AttributeValue,
}

impl PolicyCondition {
    /// Creates a condition.
    pub fn new(attribute: Attribute, operator: Operator, value: impl Into<AttributeValue>) -> Self {
        Self {
            attribute,
            operator,
            value: value.into(),
        }
    }

    /// Returns `true` if the condition holds. A missing attribute never holds.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> bool {
        match ctx.resolve(&self.attribute) {
            Some(actual) => self.operator.apply(&actual, &self.value),
            None => false,
        }
    }
}

// =============================================================================
// Policy
// =============================================================================

/// An attribute-based access rule.
///
/// A policy applies when a resource pattern matches, an action matches, and
/// every condition holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Unique ID.
    pub id: String,
    /// Human-readable name, reported as the decision reason.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Decision when the policy applies.
    pub effect: Effect,
    /// Actions covered; `*` covers all.
    pub actions: BTreeSet<String>,
    /// Resource patterns: `*`, an exact path, or `prefix/*`.
    pub resources: Vec<String>,
    /// Conditions, all of which must hold.
    #[serde(default)]
    pub conditions: Vec<PolicyCondition>,
}

impl Policy {
    /// Creates a policy with no actions, resources or conditions.
    pub fn new(id: impl Into<String>, name: impl Into<String>, effect: Effect) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            effect,
            actions: BTreeSet::new(),
            resources: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Shorthand for an allow policy.
    pub fn allow(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, Effect::Allow)
    }

    /// Shorthand for a deny policy.
    pub fn deny(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, Effect::Deny)
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a covered action.
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions.insert(action.into());
        self
    }

    /// Adds a resource pattern.
    pub fn resource(mut self, pattern: impl Into<String>) -> Self {
        self.resources.push(pattern.into());
        self
    }

    /// Adds a condition.
    pub fn condition(mut self, condition: PolicyCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Returns `true` if any resource pattern matches `path`.
    pub fn matches_resource(&self, path: &str) -> bool {
        self.resources.iter().any(|pattern| pattern_matches(pattern, path))
    }

    /// Returns `true` if `action` is covered.
    pub fn matches_action(&self, action: &str) -> bool {
        self.actions.contains(WILDCARD) || self.actions.contains(action)
    }

    /// Returns `true` if the policy applies to `ctx`.
    pub fn applies_to(&self, ctx: &EvaluationContext) -> bool {
        self.matches_resource(&ctx.resource)
            && self.matches_action(&ctx.action)
            && self.conditions.iter().all(|c| c.evaluate(ctx))
    }
}

/// Matches `*`, an exact path, or `prefix/*` (which also covers `prefix`).
///
/// `prefix/*` stops at segment boundaries: `/ai/*` does not cover `/aircraft`.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    if pattern == WILDCARD {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(prefix) => path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/')),
        None => pattern == path,
    }
}

// =============================================================================
// EvaluationContext
// =============================================================================

/// The attributes a policy is evaluated against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationContext {
    /// Acting user ID.
    pub user_id: String,
    /// Acting username.
    pub username: String,
    /// Acting user's email.
    pub email: String,
    /// Role names.
    pub roles: Vec<String>,
    /// Effective permission IDs.
    pub permissions: Vec<String>,
    /// Normalized resource path.
    pub resource: String,
    /// Requested action.
    pub action: String,
    /// Caller-supplied `context.*` attributes.
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl EvaluationContext {
    /// Builds a context for `user` acting on `resource`.
    ///
    /// `permissions` should be the user's effective set, not only explicit grants.
    pub fn new(user: &User, permissions: &PermissionSet, resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            user_id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            roles: user.role_names(),
            permissions: permissions.to_vec(),
            resource: resource.into(),
            action: action.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds a `context.<key>` attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds several `context.*` attributes.
    pub fn with_attributes(mut self, attributes: BTreeMap<String, AttributeValue>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Reads an attribute. Context keys that were not supplied resolve to `None`.
    pub fn resolve(&self, attribute: &Attribute) -> Option<AttributeValue> {
        let text = |s: &str| Some(AttributeValue::Text(s.to_string()));
        let list = |items: &[String]| Some(AttributeValue::List(items.iter().map(|s| AttributeValue::Text(s.clone())).collect()));

        match attribute {
            Attribute::UserId => text(&self.user_id),
            Attribute::Username => text(&self.username),
            Attribute::UserEmail => text(&self.email),
            Attribute::UserRoles => list(&self.roles),
            Attribute::UserPermissions => list(&self.permissions),
            Attribute::Resource => text(&self.resource),
            Attribute::Action => text(&self.action),
            Attribute::Context(key) => self.attributes.get(key).cloned(),
        }
    }
}

// =============================================================================
// PolicyDecision
// =============================================================================

/// Identifies the policy that decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyMatch {
    /// Policy ID.
    pub id: String,
    /// Policy name.
    pub name: String,
}

impl PolicyMatch {
    pub(crate) fn of(policy: &Policy) -> Self {
        Self {
            id: policy.id.clone(),
            name: policy.name.clone(),
        }
    }
}

/// Outcome of evaluating all policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// At least one allow policy applied and no deny did.
    Allow(PolicyMatch),
    /// A deny policy applied.
    Deny(PolicyMatch),
    /// No policy applied.
    NotApplicable,
}

impl PolicyDecision {
    /// Returns `true` for [`PolicyDecision::Allow`].
    pub fn is_allow(&self) -> bool {
        matches!(self, PolicyDecision::Allow(_))
    }

    /// Returns `true` for [`PolicyDecision::Deny`].
    pub fn is_deny(&self) -> bool {
        matches!(self, PolicyDecision::Deny(_))
    }

    /// Returns the deciding policy, if any.
    pub fn policy(&self) -> Option<&PolicyMatch> {
        match self {
            PolicyDecision::Allow(m) | PolicyDecision::Deny(m) => Some(m),
            PolicyDecision::NotApplicable => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::Role;

    fn ctx(resource: &str, action: &str) -> EvaluationContext {
        let user = User::new("dev", "dev@example.com", [Role::Developer]);
        EvaluationContext::new(&user, &PermissionSet::new(), resource, action)
    }

    #[test]
    fn test_pattern_matching() {
        assert!(pattern_matches("*", "/anything"));
        assert!(pattern_matches("/ai", "/ai"));
        assert!(!pattern_matches("/ai", "/ai/chat"));
        assert!(pattern_matches("/ai/*", "/ai/chat"));
        assert!(pattern_matches("/ai/*", "/ai"));
        assert!(!pattern_matches("/ai/*", "/aim"));
    }

    #[test]
    fn test_attribute_paths() {
        assert_eq!(Attribute::parse("user.id"), Some(Attribute::UserId));
        assert_eq!(Attribute::parse("context.ip"), Some(Attribute::Context("ip".into())));
        assert_eq!(Attribute::parse("context."), None);
        assert_eq!(Attribute::parse("user.password"), None);
        assert_eq!(Attribute::Context("ip".into()).to_string(), "context.ip");
    }

    #[test]
    fn test_operators() {
        let text = AttributeValue::from("developer@example.com");
        assert!(Operator::EndsWith.apply(&text, &"@example.com".into()));
        assert!(Operator::StartsWith.apply(&text, &"dev".into()));
        assert!(Operator::Contains.apply(&text, &"@".into()));
        assert!(!Operator::Gt.apply(&text, &1.0.into()));

        assert!(Operator::Gt.apply(&5.0.into(), &3.0.into()));
        assert!(Operator::Lt.apply(&2i64.into(), &3i64.into()));

        let roles = AttributeValue::from(vec!["admin", "developer"]);
        assert!(Operator::Contains.apply(&roles, &"developer".into()));
        assert!(Operator::In.apply(&"admin".into(), &roles));
        assert!(!Operator::In.apply(&"admin".into(), &"admin".into()));
    }

    #[test]
    fn test_missing_context_attribute_fails_closed() {
        let condition = PolicyCondition::new(Attribute::Context("office".into()), Operator::Equals, "hq");
        assert!(!condition.evaluate(&ctx("/ai", "execute")));
        assert!(condition.evaluate(&ctx("/ai", "execute").with_attribute("office", "hq")));
    }

    #[test]
    fn test_policy_applies() {
        let policy = Policy::deny("p1", "No AI")
            .action("execute")
            .resource("/ai/*")
            .condition(PolicyCondition::new(Attribute::UserRoles, Operator::Contains, "developer"));

        assert!(policy.applies_to(&ctx("/ai", "execute")));
        assert!(policy.applies_to(&ctx("/ai/chat", "execute")));
        assert!(!policy.applies_to(&ctx("/ai", "read")));
        assert!(!policy.applies_to(&ctx("/memory", "execute")));
    }

    #[test]
    fn test_policy_serde_shape() {
        let policy = Policy::allow("p1", "Office hours")
            .action("*")
            .resource("*")
            .condition(PolicyCondition::new(Attribute::Context("hour".into()), Operator::Lt, 18i64));

        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["effect"], "allow");
        assert_eq!(json["conditions"][0]["attribute"], "context.hour");
        assert_eq!(json["conditions"][0]["operator"], "lt");

        let back: Policy = serde_json::from_value(json).unwrap();
        assert_eq!(back, policy);
    }
}
