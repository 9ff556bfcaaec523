// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! User model and the values exchanged with callers.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rbac::Role;

// =============================================================================
// User
// =============================================================================

/// A user account.
///
/// `id` is assigned at creation and never changes. Credentialed users always
/// carry a password hash.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Immutable user ID.
    pub id: String,
    /// Login name, unique across users.
    pub username: String,
    /// Contact email.
    #[serde(default)]
    pub email: String,
    /// Assigned roles.
    pub roles: BTreeSet<Role>,
    /// Explicit permission IDs granted on top of the roles.
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// bcrypt hash of the password.
    #[serde(default)]
    pub password_hash: Option<String>,
    /// Base32 TOTP secret, present once MFA setup started.
    #[serde(default)]
    pub mfa_secret: Option<String>,
    /// Whether logins require a TOTP code.
    #[serde(default)]
    pub mfa_enabled: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last successful login.
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// Creates a user with a fresh ID and no credentials.
    pub fn new(username: impl Into<String>, email: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username: username.into(),
            email: email.into(),
            roles: roles.into_iter().collect(),
            permissions: BTreeSet::new(),
            password_hash: None,
            mfa_secret: None,
            mfa_enabled: false,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    /// Adds explicit permission IDs.
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions.extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Sets the password hash.
    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    /// Returns `true` if any assigned role includes `role` in the hierarchy.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.iter().any(|r| r.includes(role))
    }

    /// Returns the highest assigned role.
    pub fn highest_role(&self) -> Option<Role> {
        self.roles.iter().max().copied()
    }

    /// Returns role names in hierarchy order.
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.as_str().to_string()).collect()
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .field("permissions", &self.permissions)
            .field("mfa_enabled", &self.mfa_enabled)
            .field("created_at", &self.created_at)
            .field("last_login", &self.last_login)
            .finish_non_exhaustive()
    }
}

/// Input for creating a user.
#[derive(Clone, Deserialize)]
pub struct NewUser {
    /// Login name.
    pub username: String,
    /// Contact email.
    #[serde(default)]
    pub email: String,
    /// Plain-text password, checked against the strength rules.
    pub password: String,
    /// Roles to assign.
    pub roles: Vec<Role>,
    /// Explicit permission IDs.
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl NewUser {
    /// Creates input with a single role.
    pub fn new(username: impl Into<String>, password: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            email: String::new(),
            password: password.into(),
            roles: vec![role],
            permissions: Vec::new(),
        }
    }

    /// Sets the email.
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Adds a role.
    pub fn role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    /// Adds an explicit permission ID.
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("roles", &self.roles)
            .field("permissions", &self.permissions)
            .finish()
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Login credentials.
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    /// Submitted username.
    pub username: String,
    /// Submitted password.
    pub password: String,
    /// TOTP code for MFA-enabled accounts.
    #[serde(default)]
    pub mfa_code: Option<String>,
}

impl Credentials {
    /// Creates credentials without an MFA code.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            mfa_code: None,
        }
    }

    /// Adds an MFA code.
    pub fn with_mfa_code(mut self, code: impl Into<String>) -> Self {
        self.mfa_code = Some(code.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("mfa_code", &self.mfa_code.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// =============================================================================
// Issued Tokens
// =============================================================================

/// Tokens returned by a successful login.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    /// Short-lived access token.
    pub access_token: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// Always `Bearer`.
    pub token_type: String,
}

impl AuthTokens {
    /// Creates a bearer token pair.
    pub fn bearer(access_token: String, refresh_token: String, expires_in: u64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_in,
            token_type: "Bearer".to_string(),
        }
    }
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

/// A freshly issued TOTP secret.
#[derive(Clone, Serialize)]
pub struct MfaSetup {
    /// Base32 secret for manual entry.
    pub secret: String,
    /// `otpauth://` URI for authenticator apps.
    pub provisioning_uri: String,
}

impl fmt::Debug for MfaSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MfaSetup").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_role_is_hierarchical() {
        let admin = User::new("admin", "admin@localhost", [Role::Admin]);
        assert!(admin.has_role(Role::Developer));
        assert!(admin.has_role(Role::Analyst));
        assert!(admin.has_role(Role::Readonly));

        let analyst = User::new("ana", "", [Role::Analyst]);
        assert!(analyst.has_role(Role::Readonly));
        assert!(!analyst.has_role(Role::Developer));
        assert_eq!(analyst.highest_role(), Some(Role::Analyst));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let user = User::new("dev", "", [Role::Developer]).with_password_hash("$2b$12$abc");
        assert!(!format!("{:?}", user).contains("$2b$"));

        let creds = Credentials::new("dev", "hunter2").with_mfa_code("123456");
        let shown = format!("{:?}", creds);
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("123456"));
    }

    #[test]
    fn test_user_serde_roundtrip_keeps_hash() {
        let user = User::new("dev", "dev@localhost", [Role::Developer])
            .with_password_hash("$2b$12$abc")
            .with_permissions(["audit:read"]);
        let json = serde_json::to_string(&user).unwrap();
        let back: User = serde_json::from_str(&json).unwrap();
        assert_eq!(back, user);
        assert!(json.contains("\"developer\""));
    }

    #[test]
    fn test_bearer_tokens() {
        let tokens = AuthTokens::bearer("a".into(), "r".into(), 3600);
        assert_eq!(tokens.token_type, "Bearer");
        assert!(!format!("{:?}", tokens).contains("\"a\""));
    }
}
