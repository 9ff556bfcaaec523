// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Well-known accounts, configurations and policies shared by the suites.

use std::path::Path;
use std::time::Duration;

use warden_auth::config::StorageBackend;
use warden_auth::policy::{Attribute, Operator, Policy, PolicyCondition};
use warden_auth::{Credentials, NewUser, Role, SecurityConfig};

// =============================================================================
// Accounts
// =============================================================================

/// Username and password of an account.
#[derive(Debug, Clone)]
pub struct Account {
    /// Username.
    pub username: &'static str,
    /// Plaintext password.
    pub password: &'static str,
}

impl Account {
    /// Login credentials for this account.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username, self.password)
    }

    /// Credentials with a wrong password.
    pub fn wrong_credentials(&self) -> Credentials {
        Credentials::new(self.username, "definitely-not-it")
    }
}

/// Fixture providing accounts.
pub struct UserFixtures;

impl UserFixtures {
    /// The bootstrapped administrator.
    pub fn admin() -> Account {
        Account {
            username: warden_auth::authn::DEFAULT_ADMIN.0,
            password: warden_auth::authn::DEFAULT_ADMIN.1,
        }
    }

    /// The bootstrapped developer.
    pub fn developer() -> Account {
        Account {
            username: warden_auth::authn::DEFAULT_DEVELOPER.0,
            password: warden_auth::authn::DEFAULT_DEVELOPER.1,
        }
    }

    /// A password that passes every strength rule.
    pub const STRONG_PASSWORD: &'static str = "Strong1Pass!";

    /// A new account request with a strong password.
    pub fn new_user(username: &str, role: Role) -> NewUser {
        NewUser::new(username, Self::STRONG_PASSWORD, role).email(format!("{}@example.test", username))
    }

    /// Passwords each missing exactly one strength rule.
    pub fn weak_passwords() -> Vec<(&'static str, &'static str)> {
        vec![
            ("too short", "Sh1!a"),
            ("no uppercase", "strong1pass!"),
            ("no lowercase", "STRONG1PASS!"),
            ("no digit", "StrongPass!!"),
            ("no special", "Strong1Pass1"),
        ]
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Fixture providing configurations.
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// Defaults with cheap hashing and auditing handled by the harness.
    pub fn fast() -> SecurityConfig {
        let mut config = SecurityConfig::default();
        config.password.bcrypt_cost = 4;
        config.audit.enabled = false;
        config
    }

    /// [`ConfigFixtures::fast`] with JSON storage under `dir`.
    pub fn json_storage(dir: &Path) -> SecurityConfig {
        let mut config = Self::fast();
        config.storage.backend = StorageBackend::Json;
        config.storage.directory = dir.to_path_buf();
        config
    }

    /// [`ConfigFixtures::fast`] with file auditing under `dir`.
    pub fn file_audit(dir: &Path) -> SecurityConfig {
        let mut config = Self::fast();
        config.audit.enabled = true;
        config.audit.directory = dir.to_path_buf();
        config
    }

    /// [`ConfigFixtures::fast`] with a short lockout.
    pub fn short_lockout(max_attempts: u32, lockout: Duration) -> SecurityConfig {
        let mut config = Self::fast();
        config.lockout.max_attempts = max_attempts;
        config.lockout.lockout_duration = lockout;
        config
    }
}

// =============================================================================
// Policies
// =============================================================================

/// Fixture providing ABAC policies.
pub struct PolicyFixtures;

impl PolicyFixtures {
    /// Allows `action` on `/analytics` to anyone with the developer role.
    pub fn developer_analytics(action: &str) -> Policy {
        Policy::allow("allow-dev-analytics", "Developers read analytics")
            .resource("/analytics/*")
            .action(action)
            .condition(PolicyCondition::new(Attribute::UserRoles, Operator::Contains, "developer"))
    }

    /// Denies everything on `resource` while `context.maintenance` is true.
    pub fn maintenance_freeze(resource: &str) -> Policy {
        Policy::deny("deny-maintenance", "Maintenance freeze")
            .resource(format!("{}/*", resource.trim_end_matches('/')))
            .action("*")
            .condition(PolicyCondition::new(
                Attribute::Context("maintenance".to_string()),
                Operator::Equals,
                true,
            ))
    }

    /// Allows `action` on `resource` for everyone.
    pub fn open(resource: &str, action: &str) -> Policy {
        Policy::allow(format!("allow-open-{}", action), "Open access")
            .resource(resource)
            .action(action)
    }

    /// Denies `action` on `resource` for everyone.
    pub fn closed(resource: &str, action: &str) -> Policy {
        Policy::deny(format!("deny-closed-{}", action), "Closed access")
            .resource(resource)
            .action(action)
    }
}
