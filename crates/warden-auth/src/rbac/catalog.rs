// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Role to permission resolution.

use std::collections::HashMap;

use super::permission::{builtin_permissions, builtin_role_grants, Permission, PermissionSet};
use super::Role;
use crate::model::User;

// =============================================================================
// Permission Catalog
// =============================================================================

/// Static role definitions with hierarchical resolution.
///
/// A role's effective permissions are its own grants plus the grants of every
/// junior role, so a senior role always holds a superset of its juniors.
///
/// # Example
///
/// ```rust,ignore
/// let catalog = PermissionCatalog::new();
/// assert!(catalog.has_resource_access(&developer, "/ai", "execute"));
/// assert!(!catalog.has_resource_access(&developer, "/users", "create"));
/// ```
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    permissions: HashMap<String, Permission>,
    role_grants: HashMap<Role, Vec<String>>,
}

impl PermissionCatalog {
    /// Creates the catalog with the built-in definitions.
    pub fn new() -> Self {
        Self::builder().with_builtin().build()
    }

    /// Creates a builder for the catalog.
    pub fn builder() -> PermissionCatalogBuilder {
        PermissionCatalogBuilder::new()
    }

    /// Returns the definition registered for `id`.
    pub fn permission(&self, id: &str) -> Option<&Permission> {
        self.permissions.get(id)
    }

    /// Returns all registered definitions, sorted by ID.
    pub fn permissions(&self) -> Vec<&Permission> {
        let mut all: Vec<_> = self.permissions.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Returns the grants of `role` alone, without the hierarchy.
    pub fn role_grants(&self, role: Role) -> &[String] {
        self.role_grants.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the effective permissions of a role.
    pub fn permissions_for_role(&self, role: Role) -> PermissionSet {
        role.chain()
            .into_iter()
            .flat_map(|r| self.role_grants(r).iter().cloned())
            .collect()
    }

    /// Returns the effective permissions of a user: all roles plus explicit grants.
    pub fn user_permissions(&self, user: &User) -> PermissionSet {
        let mut set = PermissionSet::new();
        for role in &user.roles {
            set.merge(&self.permissions_for_role(*role));
        }
        for id in &user.permissions {
            set.add(id.clone());
        }
        set
    }

    /// Returns `true` if the user holds `id`, exactly or through a wildcard.
    pub fn has_permission(&self, user: &User, id: &str) -> bool {
        self.user_permissions(user).grants(id)
    }

    /// Returns `true` if the user may perform `action` on `path`.
    pub fn has_resource_access(&self, user: &User, path: &str, action: &str) -> bool {
        self.user_permissions(user).iter().any(|id| {
            let implied;
            let permission = match self.permissions.get(id) {
                Some(p) => p,
                None => match Permission::implied_by_id(id) {
                    Some(p) => {
                        implied = p;
                        &implied
                    }
                    None => return false,
                },
            };
            permission.covers_path(path) && permission.allows_action(action)
        })
    }
}

impl Default for PermissionCatalog {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for the permission catalog.
#[derive(Debug, Default)]
pub struct PermissionCatalogBuilder {
    permissions: HashMap<String, Permission>,
    role_grants: HashMap<Role, Vec<String>>,
}

impl PermissionCatalogBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the built-in definitions and role grants.
    pub fn with_builtin(mut self) -> Self {
        for permission in builtin_permissions() {
            self.permissions.insert(permission.id.clone(), permission);
        }
        for role in Role::ALL {
            for id in builtin_role_grants(role) {
                self = self.grant(role, *id);
            }
        }
        self
    }

    /// Registers a permission definition.
    pub fn permission(mut self, permission: Permission) -> Self {
        self.permissions.insert(permission.id.clone(), permission);
        self
    }

    /// Grants a permission ID to a role.
    pub fn grant(mut self, role: Role, id: impl Into<String>) -> Self {
        let id = id.into();
        let grants = self.role_grants.entry(role).or_default();
        if !grants.contains(&id) {
            grants.push(id);
        }
        self
    }

    /// Builds the catalog.
    pub fn build(self) -> PermissionCatalog {
        PermissionCatalog {
            permissions: self.permissions,
            role_grants: self.role_grants,
        }
    }
}
