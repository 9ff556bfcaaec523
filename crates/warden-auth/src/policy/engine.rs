// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Policy storage and deny-overrides evaluation.

use std::sync::Arc;

use super::types::{
    Attribute, EvaluationContext, Operator, Policy, PolicyCondition, PolicyDecision, PolicyMatch,
};
use crate::error::StoreResult;
use crate::rbac::WILDCARD;
use crate::store::Store;

/// Prefix of the IDs of per-user deny overrides.
pub const USER_DENY_PREFIX: &str = "user-deny";

/// Mutable policy store with a deny-overrides evaluator.
pub struct PolicyEngine {
    store: Arc<dyn Store<Policy>>,
}

impl PolicyEngine {
    /// Creates an engine over `store`.
    pub fn new(store: Arc<dyn Store<Policy>>) -> Self {
        Self { store }
    }

    /// Adds or replaces a policy.
    pub fn add_policy(&self, policy: Policy) -> StoreResult<()> {
        tracing::debug!(policy_id = %policy.id, effect = %policy.effect, "Policy added");
        self.store.set(&policy.id.clone(), policy)
    }

    /// Removes a policy. Returns `true` if it existed.
    pub fn remove_policy(&self, id: &str) -> StoreResult<bool> {
        let removed = self.store.delete(id)?;
        if removed {
            tracing::debug!(policy_id = %id, "Policy removed");
        }
        Ok(removed)
    }

    /// Looks up a policy by ID.
    pub fn get_policy(&self, id: &str) -> StoreResult<Option<Policy>> {
        self.store.get(id)
    }

    /// Lists all policies ordered by ID.
    pub fn list_policies(&self) -> StoreResult<Vec<Policy>> {
        let mut policies: Vec<Policy> = self.store.list()?.into_iter().map(|(_, p)| p).collect();
        policies.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(policies)
    }

    /// Removes every policy.
    pub fn clear(&self) -> StoreResult<()> {
        self.store.clear()
    }

    /// Evaluates all policies against `ctx`.
    ///
    /// Any applicable deny wins. Otherwise the first applicable allow (by ID)
    /// decides. An unreadable store yields a deny.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> PolicyDecision {
        let policies = match self.list_policies() {
            Ok(policies) => policies,
            Err(e) => {
                tracing::error!(error = %e, "Policy store unavailable, denying");
                return PolicyDecision::Deny(PolicyMatch {
                    id: "policy-store".into(),
                    name: "policy store unavailable".into(),
                });
            }
        };

        let mut allow = None;
        for policy in policies.iter().filter(|p| p.applies_to(ctx)) {
            match policy.effect {
                super::Effect::Deny => {
                    tracing::debug!(
                        policy_id = %policy.id,
                        resource = %ctx.resource,
                        action = %ctx.action,
                        "Deny policy matched"
                    );
                    return PolicyDecision::Deny(PolicyMatch::of(policy));
                }
                super::Effect::Allow => {
                    allow.get_or_insert_with(|| PolicyMatch::of(policy));
                }
            }
        }

        allow.map_or(PolicyDecision::NotApplicable, PolicyDecision::Allow)
    }

    /// Installs a per-user deny on `resource` and everything beneath it.
    ///
    /// An empty (or all-blank) `actions` list denies every action. Returns
    /// the ID of the synthesized policy. Calling again replaces it.
    pub fn deny_user_access(&self, user_id: &str, resource: &str, actions: &[&str]) -> StoreResult<String> {
        let id = user_deny_id(user_id, resource);
        let mut policy = Policy::deny(&id, format!("Deny {} for user {}", resource, user_id))
            .resource(resource)
            .resource(format!("{}/*", resource.trim_end_matches('/')))
            .condition(PolicyCondition::new(Attribute::UserId, Operator::Equals, user_id));
        for action in deny_actions(actions) {
            policy = policy.action(action);
        }

        self.add_policy(policy)?;
        Ok(id)
    }

    /// Removes the per-user deny installed by [`PolicyEngine::deny_user_access`].
    pub fn allow_user_access(&self, user_id: &str, resource: &str) -> StoreResult<bool> {
        self.remove_policy(&user_deny_id(user_id, resource))
    }
}

/// Trimmed, non-blank actions of a per-user deny, or `*` when none remain.
pub(crate) fn deny_actions(actions: &[&str]) -> Vec<String> {
    let actions: Vec<String> = actions
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();
    if actions.is_empty() {
        vec![WILDCARD.to_string()]
    } else {
        actions
    }
}

fn user_deny_id(user_id: &str, resource: &str) -> String {
    format!("{}:{}:{}", USER_DENY_PREFIX, user_id, resource)
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("policies", &self.store.len().unwrap_or(0))
            .finish()
    }
}
