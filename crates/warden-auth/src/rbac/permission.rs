// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Permission definitions for RBAC.
//!
//! A permission ID has the form `resource:action`. Its definition names the
//! resource path it covers and the actions it allows there.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::Role;

/// Wildcard for resources and actions.
pub const WILDCARD: &str = "*";

/// The global grant: every action on every resource.
pub const ALL_PERMISSIONS: &str = "*:*";

// =============================================================================
// Permission
// =============================================================================

/// A permission definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// ID of the form `resource:action`.
    pub id: String,
    /// Resource path covered, or `*`.
    pub resource: String,
    /// Allowed actions, possibly including `*`.
    pub actions: BTreeSet<String>,
    /// Description of the permission.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Permission {
    /// Creates a permission definition.
    pub fn new(id: impl Into<String>, resource: impl Into<String>, actions: &[&str]) -> Self {
        Self {
            id: id.into(),
            resource: resource.into(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            description: String::new(),
        }
    }

    /// Adds a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Derives a definition for an ID that has none registered.
    ///
    /// `reports:read` covers `/reports` for `read`; `*:*` covers everything.
    pub fn implied_by_id(id: &str) -> Option<Self> {
        let (resource, action) = split_id(id)?;
        let path = if resource == WILDCARD {
            WILDCARD.to_string()
        } else {
            format!("/{}", resource.trim_start_matches('/'))
        };
        Some(Self::new(id, path, &[action]))
    }

    /// Returns `true` if `action` is allowed.
    pub fn allows_action(&self, action: &str) -> bool {
        self.actions.contains(WILDCARD) || self.actions.contains(action)
    }

    /// Returns `true` if the resource covers `path`.
    ///
    /// Matching is by path segment: `/ai` covers `/ai` and `/ai/chat` but
    /// not `/aircraft`. This is not a plain string prefix match: the
    /// character after the prefix must be `/`.
    pub fn covers_path(&self, path: &str) -> bool {
        if self.resource == WILDCARD {
            return true;
        }
        let resource = self.resource.trim_end_matches('/');
        if resource.is_empty() {
            return path.starts_with('/');
        }
        path == resource
            || path
                .strip_prefix(resource)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Splits a permission ID into resource and action.
pub fn split_id(id: &str) -> Option<(&str, &str)> {
    let (resource, action) = id.split_once(':')?;
    if resource.is_empty() || action.is_empty() {
        return None;
    }
    Some((resource, action))
}

// =============================================================================
// Built-in Definitions
// =============================================================================

/// Returns the built-in permission definitions.
pub fn builtin_permissions() -> Vec<Permission> {
    vec![
        Permission::new(ALL_PERMISSIONS, WILDCARD, &[WILDCARD])
            .with_description("All actions on all resources"),
        Permission::new("ai:read", "/ai", &["read"]).with_description("List models and history"),
        Permission::new("ai:execute", "/ai", &["execute"])
            .with_description("Run AI generation requests"),
        Permission::new("memory:read", "/memory", &["read"]).with_description("Read shared memory"),
        Permission::new("memory:write", "/memory", &["write", "create", "update"])
            .with_description("Store and update shared memory"),
        Permission::new("memory:delete", "/memory", &["delete"])
            .with_description("Delete shared memory entries"),
        Permission::new("projects:read", "/projects", &["read"]).with_description("Read projects"),
        Permission::new("projects:write", "/projects", &["write", "create", "update"])
            .with_description("Create and modify projects"),
        Permission::new("projects:execute", "/projects", &["execute"])
            .with_description("Run project operations"),
        Permission::new("analytics:read", "/analytics", &["read"])
            .with_description("View usage analytics"),
        Permission::new("config:read", "/config", &["read"]).with_description("Read configuration"),
        Permission::new("config:write", "/config", &["write", "update"])
            .with_description("Modify configuration"),
        Permission::new("users:read", "/users", &["read"]).with_description("List users"),
        Permission::new("users:manage", "/users", &["create", "update", "delete"])
            .with_description("Create, update and delete users"),
        Permission::new("audit:read", "/audit", &["read"]).with_description("Read the audit trail"),
        Permission::new("system:admin", "/system", &[WILDCARD])
            .with_description("System administration"),
    ]
}

/// Returns the permission IDs a role grants on its own, before the hierarchy
/// adds the grants of junior roles.
pub fn builtin_role_grants(role: Role) -> &'static [&'static str] {
    match role {
        Role::Readonly => &["ai:read", "memory:read", "projects:read", "config:read"],
        Role::Analyst => &["analytics:read"],
        Role::Developer => &["ai:execute", "memory:write", "projects:write", "projects:execute"],
        Role::Admin => &[
            ALL_PERMISSIONS,
            "memory:delete",
            "config:write",
            "users:read",
            "users:manage",
            "audit:read",
            "system:admin",
        ],
    }
}

// =============================================================================
// Permission Set
// =============================================================================

/// An ordered set of permission IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet {
    ids: BTreeSet<String>,
}

impl PermissionSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a permission ID.
    pub fn add(&mut self, id: impl Into<String>) {
        self.ids.insert(id.into());
    }

    /// Returns `true` if the exact ID is present.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns `true` if the ID is granted, directly or through a wildcard.
    pub fn grants(&self, id: &str) -> bool {
        if self.ids.contains(id) || self.ids.contains(ALL_PERMISSIONS) || self.ids.contains(WILDCARD) {
            return true;
        }
        match split_id(id) {
            Some((resource, _)) => self.ids.contains(&format!("{}:{}", resource, WILDCARD)),
            None => false,
        }
    }

    /// Adds every ID of another set.
    pub fn merge(&mut self, other: &PermissionSet) {
        self.ids.extend(other.ids.iter().cloned());
    }

    /// Returns `true` if every ID of `other` is present.
    pub fn is_superset(&self, other: &PermissionSet) -> bool {
        self.ids.is_superset(&other.ids)
    }

    /// Returns the number of IDs.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates over the IDs in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Returns the IDs as a vector.
    pub fn to_vec(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}
