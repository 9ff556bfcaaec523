// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Authorization: RBAC combined with ABAC policies.
//!
//! An applicable ABAC deny always wins. Otherwise access is granted when
//! either the user's role permissions or an ABAC allow policy covers the
//! request.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use warden_audit::{AuditEvent, AuditLogEntry, AuditOutcome, AuditTrail};

use crate::error::{AuthzError, AuthzResult, StoreResult};
use crate::model::User;
use crate::policy::{deny_actions, AttributeValue, EvaluationContext, PolicyDecision, PolicyEngine};
use crate::rbac::PermissionCatalog;

/// Action assumed by callers that do not name one.
pub const DEFAULT_ACTION: &str = "execute";

/// Resource paths checked by [`AuthorizationService::allowed_resources`].
pub const KNOWN_RESOURCES: &[&str] = &[
    "/ai",
    "/memory",
    "/projects",
    "/analytics",
    "/config",
    "/users",
    "/audit",
    "/system",
];

const REASON_RBAC: &str = "RBAC permission granted";
const REASON_NONE: &str = "no matching permissions or policy";

/// Normalizes a resource path: one leading slash, no empty segments, no
/// trailing slash. An empty path becomes `/`.
pub fn normalize_resource(path: &str) -> String {
    let segments: Vec<&str> = path.trim().split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

// =============================================================================
// AccessDecision
// =============================================================================

/// A decision together with its justification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    /// Whether access is granted.
    pub allowed: bool,
    /// Human-readable justification.
    pub reason: String,
    /// Normalized resource path.
    pub resource: String,
    /// Requested action.
    pub action: String,
    /// RBAC verdict alone.
    pub rbac_allowed: bool,
    /// ABAC verdict alone.
    pub policy: PolicyDecision,
}

// =============================================================================
// AuthorizationService
// =============================================================================

/// Combines the permission catalog and the policy engine into one decision.
pub struct AuthorizationService {
    catalog: Arc<PermissionCatalog>,
    policies: Arc<PolicyEngine>,
    audit: Arc<AuditTrail>,
}

impl AuthorizationService {
    /// Creates the service.
    pub fn new(catalog: Arc<PermissionCatalog>, policies: Arc<PolicyEngine>, audit: Arc<AuditTrail>) -> Self {
        Self {
            catalog,
            policies,
            audit,
        }
    }

    /// Returns the permission catalog.
    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    /// Returns the policy engine.
    pub fn policies(&self) -> &PolicyEngine {
        &self.policies
    }

    /// Returns `true` if `user` may perform `action` on `resource`.
    ///
    /// Every call is audited. An empty action is never allowed.
    pub fn authorize(&self, user: &User, resource: &str, action: &str) -> bool {
        self.validate_access(user, resource, action).allowed
    }

    /// Like [`AuthorizationService::authorize`], with caller-supplied
    /// `context.*` attributes for policy conditions.
    pub fn authorize_with_context(
        &self,
        user: &User,
        resource: &str,
        action: &str,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> bool {
        let decision = self.decide(user, resource, action, attributes);
        self.record_decision(user, &decision);
        decision.allowed
    }

    /// Decides and explains. Audited like [`AuthorizationService::authorize`].
    pub fn validate_access(&self, user: &User, resource: &str, action: &str) -> AccessDecision {
        let decision = self.decide(user, resource, action, BTreeMap::new());
        self.record_decision(user, &decision);
        decision
    }

    /// Fails with [`AuthzError::AccessDenied`] unless access is granted.
    pub fn require_authorization(&self, user: &User, resource: &str, action: &str) -> AuthzResult<()> {
        if action.trim().is_empty() {
            return Err(AuthzError::invalid_request("action must not be empty"));
        }
        let decision = self.validate_access(user, resource, action);
        if decision.allowed {
            Ok(())
        } else {
            Err(AuthzError::access_denied(decision.resource, decision.action))
        }
    }

    /// Fails with [`AuthzError::PermissionDenied`] unless `user` holds
    /// `permission` (a `resource:action` ID).
    pub fn require_permission(&self, user: &User, permission: &str) -> AuthzResult<()> {
        if permission.trim().is_empty() {
            return Err(AuthzError::invalid_request("permission must not be empty"));
        }

        let granted = self.catalog.has_permission(user, permission);
        self.audit.record(
            AuditLogEntry::new(AuditEvent::PermissionCheck, AuditOutcome::from_allowed(granted))
                .with_user(&user.id, &user.username)
                .with_details(json!({ "permission": permission })),
        );

        if granted {
            Ok(())
        } else {
            tracing::warn!(user_id = %user.id, permission, "Permission denied");
            Err(AuthzError::permission_denied(permission))
        }
    }

    /// Returns the known resources `user` may access with `action`.
    ///
    /// Checks [`KNOWN_RESOURCES`] only. Not audited.
    pub fn allowed_resources(&self, user: &User, action: &str) -> Vec<String> {
        KNOWN_RESOURCES
            .iter()
            .filter(|resource| self.decide(user, resource, action, BTreeMap::new()).allowed)
            .map(|resource| resource.to_string())
            .collect()
    }

    /// Installs a per-user deny on `resource` and records the change.
    ///
    /// With no actions every action is denied.
    pub fn deny_user_access(&self, user_id: &str, resource: &str, actions: &[&str]) -> StoreResult<String> {
        let resource = normalize_resource(resource);
        let id = self.policies.deny_user_access(user_id, &resource, actions)?;
        self.audit.record(
            AuditLogEntry::success(AuditEvent::PolicyChanged)
                .with_target(&resource, deny_actions(actions).join(","))
                .with_details(json!({ "policy_id": id, "change": "deny", "subject": user_id })),
        );
        Ok(id)
    }

    /// Removes a per-user deny and records the change.
    pub fn allow_user_access(&self, user_id: &str, resource: &str) -> StoreResult<bool> {
        let resource = normalize_resource(resource);
        let removed = self.policies.allow_user_access(user_id, &resource)?;
        if removed {
            self.audit.record(
                AuditLogEntry::success(AuditEvent::PolicyChanged)
                    .with_details(json!({ "resource": resource, "change": "allow", "subject": user_id })),
            );
        }
        Ok(removed)
    }

    fn decide(
        &self,
        user: &User,
        resource: &str,
        action: &str,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> AccessDecision {
        let resource = normalize_resource(resource);
        let action = action.trim().to_string();

        if action.is_empty() {
            return AccessDecision {
                allowed: false,
                reason: "empty action".into(),
                resource,
                action,
                rbac_allowed: false,
                policy: PolicyDecision::NotApplicable,
            };
        }

        let permissions = self.catalog.user_permissions(user);
        let rbac_allowed = self.catalog.has_resource_access(user, &resource, &action);

        let ctx = EvaluationContext::new(user, &permissions, &resource, &action).with_attributes(attributes);
        let policy = self.policies.evaluate(&ctx);

        let (allowed, reason) = match &policy {
            PolicyDecision::Deny(m) => (false, m.name.clone()),
            _ if rbac_allowed => (true, REASON_RBAC.to_string()),
            PolicyDecision::Allow(m) => (true, m.name.clone()),
            PolicyDecision::NotApplicable => (false, REASON_NONE.to_string()),
        };

        AccessDecision {
            allowed,
            reason,
            resource,
            action,
            rbac_allowed,
            policy,
        }
    }

    fn record_decision(&self, user: &User, decision: &AccessDecision) {
        let mut entry = AuditLogEntry::new(AuditEvent::AccessDecision, AuditOutcome::from_allowed(decision.allowed))
            .with_user(&user.id, &user.username)
            .with_target(&decision.resource, &decision.action)
            .with_details(json!({
                "rbac": decision.rbac_allowed,
                "policy": decision.policy.policy().map(|m| m.id.clone()),
                "reason": decision.reason,
            }));
        if !decision.allowed {
            entry = entry.with_error(&decision.reason);
            tracing::warn!(
                user_id = %user.id,
                resource = %decision.resource,
                action = %decision.action,
                reason = %decision.reason,
                "Access denied"
            );
        } else {
            tracing::debug!(
                user_id = %user.id,
                resource = %decision.resource,
                action = %decision.action,
                "Access granted"
            );
        }
        self.audit.record(entry);
    }
}

impl std::fmt::Debug for AuthorizationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationService")
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Attribute, Operator, Policy, PolicyCondition};
    use crate::rbac::Role;
    use crate::store::MemoryStore;
    use warden_audit::InMemoryAuditSink;

    struct Fixture {
        authz: AuthorizationService,
        sink: Arc<InMemoryAuditSink>,
        audit: Arc<AuditTrail>,
    }

    fn fixture() -> Fixture {
        let sink = Arc::new(InMemoryAuditSink::new());
        let audit = Arc::new(AuditTrail::new(sink.clone()));
        let authz = AuthorizationService::new(
            Arc::new(PermissionCatalog::new()),
            Arc::new(PolicyEngine::new(Arc::new(MemoryStore::new()))),
            audit.clone(),
        );
        Fixture { authz, sink, audit }
    }

    #[test]
    fn test_normalize_resource() {
        assert_eq!(normalize_resource("ai"), "/ai");
        assert_eq!(normalize_resource(" /ai/ "), "/ai");
        assert_eq!(normalize_resource("//projects//alpha/"), "/projects/alpha");
        assert_eq!(normalize_resource(""), "/");
        assert_eq!(normalize_resource("/"), "/");
    }

    #[tokio::test]
    async fn test_developer_scenario() {
        let f = fixture();
        let dev = User::new("dev", "", [Role::Developer]);

        assert!(f.authz.authorize(&dev, "/ai", "execute"));
        assert!(f.authz.authorize(&dev, "ai/", "execute"));
        assert!(!f.authz.authorize(&dev, "/users", "create"));
    }

    #[tokio::test]
    async fn test_user_deny_override() {
        let f = fixture();
        let dev = User::new("dev", "", [Role::Developer]);

        f.authz.deny_user_access(&dev.id, "/ai", &["execute"]).unwrap();
        let decision = f.authz.validate_access(&dev, "/ai", "execute");
        assert!(!decision.allowed);
        assert!(decision.rbac_allowed);
        assert!(decision.policy.is_deny());

        assert!(f.authz.allow_user_access(&dev.id, "/ai").unwrap());
        assert!(f.authz.authorize(&dev, "/ai", "execute"));
    }

    #[tokio::test]
    async fn test_abac_allow_extends_rbac() {
        let f = fixture();
        let analyst = User::new("ana", "", [Role::Analyst]);
        assert!(!f.authz.authorize(&analyst, "/projects", "write"));

        f.authz
            .policies()
            .add_policy(
                Policy::allow("analyst-projects", "Analysts may edit projects")
                    .action("write")
                    .resource("/projects/*")
                    .condition(PolicyCondition::new(Attribute::UserRoles, Operator::Contains, "analyst")),
            )
            .unwrap();

        let decision = f.authz.validate_access(&analyst, "/projects/alpha", "write");
        assert!(decision.allowed);
        assert_eq!(decision.reason, "Analysts may edit projects");
    }

    #[tokio::test]
    async fn test_reasons() {
        let f = fixture();
        let dev = User::new("dev", "", [Role::Developer]);
        assert_eq!(f.authz.validate_access(&dev, "/ai", "execute").reason, REASON_RBAC);
        assert_eq!(f.authz.validate_access(&dev, "/users", "create").reason, REASON_NONE);
    }

    #[tokio::test]
    async fn test_context_attributes_feed_policies() {
        let f = fixture();
        let dev = User::new("dev", "", [Role::Developer]);
        f.authz
            .policies()
            .add_policy(
                Policy::deny("offsite", "No AI off-site")
                    .action("*")
                    .resource("/ai")
                    .condition(PolicyCondition::new(
                        Attribute::Context("network".into()),
                        Operator::Equals,
                        "external",
                    )),
            )
            .unwrap();

        assert!(f.authz.authorize(&dev, "/ai", "execute"));
        let attrs = BTreeMap::from([("network".to_string(), AttributeValue::from("external"))]);
        assert!(!f.authz.authorize_with_context(&dev, "/ai", "execute", attrs));
    }

    #[tokio::test]
    async fn test_require_variants() {
        let f = fixture();
        let reader = User::new("reader", "", [Role::Readonly]);

        assert!(f.authz.require_authorization(&reader, "/memory", "read").is_ok());
        assert!(matches!(
            f.authz.require_authorization(&reader, "/memory", "write"),
            Err(AuthzError::AccessDenied { .. })
        ));
        assert!(matches!(
            f.authz.require_authorization(&reader, "/memory", " "),
            Err(AuthzError::InvalidRequest { .. })
        ));

        assert!(f.authz.require_permission(&reader, "memory:read").is_ok());
        assert!(matches!(
            f.authz.require_permission(&reader, "memory:delete"),
            Err(AuthzError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_allowed_resources() {
        let f = fixture();
        let admin = User::new("admin", "", [Role::Admin]);
        let reader = User::new("reader", "", [Role::Readonly]);

        assert_eq!(f.authz.allowed_resources(&admin, "read").len(), KNOWN_RESOURCES.len());
        assert_eq!(
            f.authz.allowed_resources(&reader, "read"),
            vec!["/ai", "/memory", "/projects", "/config"]
        );

        f.audit.flush().await.unwrap();
        assert!(f.sink.entries_for(AuditEvent::AccessDecision).is_empty());
    }

    #[tokio::test]
    async fn test_every_decision_is_audited_and_idempotent() {
        let f = fixture();
        let dev = User::new("dev", "", [Role::Developer]);

        let first = f.authz.authorize(&dev, "/config", "write");
        for _ in 0..3 {
            assert_eq!(f.authz.authorize(&dev, "/config", "write"), first);
        }

        f.audit.flush().await.unwrap();
        let entries = f.sink.entries_for(AuditEvent::AccessDecision);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].resource.as_deref(), Some("/config"));
    }
}
