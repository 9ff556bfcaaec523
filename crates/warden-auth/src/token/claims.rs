// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Token claims.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::model::User;
use crate::rbac::{PermissionSet, Role};

/// Kind of token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Grants access to commands.
    Access,
    /// Exchanged for new access tokens.
    Refresh,
}

impl TokenType {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// TokenPayload
// =============================================================================

/// Identity claims supplied when signing.
///
/// The service adds `jti`, `iss`, `aud`, `iat` and `exp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    /// Subject (user ID).
    pub sub: String,
    /// Username.
    pub username: String,
    /// Email.
    pub email: String,
    /// Role snapshot.
    pub roles: Vec<Role>,
    /// Permission snapshot.
    pub permissions: Vec<String>,
    /// Token kind.
    pub token_type: TokenType,
}

impl TokenPayload {
    /// Creates an access payload with an empty snapshot.
    pub fn new(sub: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            username: username.into(),
            email: String::new(),
            roles: Vec::new(),
            permissions: Vec::new(),
            token_type: TokenType::Access,
        }
    }

    /// Creates an access payload carrying the user's full snapshot.
    pub fn access_for(user: &User, permissions: &PermissionSet) -> Self {
        Self {
            sub: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            roles: user.roles.iter().copied().collect(),
            permissions: permissions.to_vec(),
            token_type: TokenType::Access,
        }
    }

    /// Creates a refresh payload: roles only, no permissions.
    pub fn refresh_for(user: &User) -> Self {
        Self {
            sub: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            roles: user.roles.iter().copied().collect(),
            permissions: Vec::new(),
            token_type: TokenType::Refresh,
        }
    }

    /// Sets the email.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Sets the role snapshot.
    pub fn with_roles(mut self, roles: Vec<Role>) -> Self {
        self.roles = roles;
        self
    }

    /// Sets the permission snapshot.
    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Sets the token type.
    pub fn with_type(mut self, token_type: TokenType) -> Self {
        self.token_type = token_type;
        self
    }
}

// =============================================================================
// Claims
// =============================================================================

/// Claims carried by a signed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    // =========================================================================
    // Standard JWT Claims (RFC 7519)
    // =========================================================================
    /// Subject (user ID).
    pub sub: String,

    /// Issuer.
    pub iss: String,

    /// Audience.
    pub aud: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Token ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    // =========================================================================
    // Identity Snapshot
    // =========================================================================
    /// Username.
    pub username: String,

    /// Email.
    #[serde(default)]
    pub email: String,

    /// Role snapshot.
    #[serde(default)]
    pub roles: Vec<Role>,

    /// Permission snapshot.
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Token kind.
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

impl Claims {
    /// Returns `true` if the token has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    /// Returns the expiry as a timestamp.
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }

    /// Returns `true` if the role snapshot includes `role`.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.iter().any(|r| r.includes(role))
    }

    /// Rebuilds the identity payload, e.g. to issue a new token.
    pub fn to_payload(&self) -> TokenPayload {
        TokenPayload {
            sub: self.sub.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
            permissions: self.permissions.clone(),
            token_type: self.token_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_wire_names() {
        let claims = Claims {
            sub: "u-1".into(),
            iss: "warden".into(),
            aud: "warden-cli".into(),
            iat: 0,
            exp: 60,
            jti: Some("j-1".into()),
            username: "admin".into(),
            email: "admin@localhost".into(),
            roles: vec![Role::Admin],
            permissions: vec!["*:*".into()],
            token_type: TokenType::Refresh,
        };

        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["type"], "refresh");
        assert_eq!(json["roles"][0], "admin");
        assert_eq!(json["jti"], "j-1");
        assert!(claims.is_expired());
        assert!(claims.has_role(Role::Readonly));
    }

    #[test]
    fn test_refresh_payload_has_no_permissions() {
        let user = User::new("dev", "dev@localhost", [Role::Developer]);
        let payload = TokenPayload::refresh_for(&user);
        assert_eq!(payload.token_type, TokenType::Refresh);
        assert!(payload.permissions.is_empty());
        assert_eq!(payload.roles, vec![Role::Developer]);
    }
}
