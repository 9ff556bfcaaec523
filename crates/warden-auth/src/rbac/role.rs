// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Roles and the role hierarchy.

use serde::{Deserialize, Serialize};

// =============================================================================
// Role
// =============================================================================

/// Predefined roles, ordered from least to most privileged.
///
/// The hierarchy is total: each role includes every role below it, so
/// `Admin > Developer > Analyst > Readonly`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only access to AI, memory, projects and configuration.
    Readonly,
    /// Read access plus analytics.
    Analyst,
    /// Can execute AI requests and modify memory and projects.
    Developer,
    /// Complete system access.
    Admin,
}

impl Role {
    /// All roles from least to most privileged.
    pub const ALL: [Role; 4] = [Role::Readonly, Role::Analyst, Role::Developer, Role::Admin];

    /// Returns the role name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Readonly => "readonly",
            Role::Analyst => "analyst",
            Role::Developer => "developer",
            Role::Admin => "admin",
        }
    }

    /// Parses a role from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "readonly" | "read_only" | "viewer" => Some(Role::Readonly),
            "analyst" => Some(Role::Analyst),
            "developer" | "dev" => Some(Role::Developer),
            "admin" | "administrator" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Returns `true` if this role includes `other` in the hierarchy.
    pub fn includes(&self, other: Role) -> bool {
        *self >= other
    }

    /// Returns the role directly below this one.
    pub fn junior(&self) -> Option<Role> {
        match self {
            Role::Readonly => None,
            Role::Analyst => Some(Role::Readonly),
            Role::Developer => Some(Role::Analyst),
            Role::Admin => Some(Role::Developer),
        }
    }

    /// Returns this role followed by every role it includes.
    pub fn chain(&self) -> Vec<Role> {
        let mut chain = vec![*self];
        let mut current = *self;
        while let Some(next) = current.junior() {
            chain.push(next);
            current = next;
        }
        chain
    }

    /// Returns a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Role::Readonly => "Read-only access to AI, memory, projects and configuration",
            Role::Analyst => "Read-only access plus analytics",
            Role::Developer => "AI execution and write access to memory and projects",
            Role::Admin => "Complete system administration access",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(s).ok_or_else(|| format!("unknown role: {}", s))
    }
}
