// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Authentication service.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use warden_audit::{AuditEvent, AuditLogEntry, AuditTrail, ClientMeta};

use super::password::{check_strength, PasswordHasher};
use super::rate_limit::{LoginRateLimiter, RateLimitResult};
use super::totp::Totp;
use crate::config::SecurityConfig;
use crate::error::{AuthError, AuthResult, TokenError};
use crate::model::{AuthTokens, Credentials, MfaSetup, NewUser, User};
use crate::rbac::{PermissionCatalog, Role};
use crate::store::Store;
use crate::token::{TokenPayload, TokenService, TokenType};

/// Account created at cold start with full access.
pub const DEFAULT_ADMIN: (&str, &str, &str) = ("admin", "admin123!", "admin@localhost");

/// Account created at cold start with developer access.
pub const DEFAULT_DEVELOPER: (&str, &str, &str) = ("developer", "dev123!", "developer@localhost");

// =============================================================================
// AuthenticationService
// =============================================================================

/// Verifies credentials, issues tokens and manages accounts.
///
/// Callers only ever see [`AuthError::InvalidCredentials`] for unknown users
/// and wrong passwords alike. The precise reason goes to the audit trail.
pub struct AuthenticationService {
    config: Arc<SecurityConfig>,
    users: Arc<dyn Store<User>>,
    tokens: Arc<TokenService>,
    catalog: Arc<PermissionCatalog>,
    audit: Arc<AuditTrail>,
    limiter: LoginRateLimiter,
    hasher: PasswordHasher,
    totp: Totp,
    // Serializes username uniqueness checks with inserts.
    registration: Mutex<()>,
}

impl AuthenticationService {
    /// Creates the service.
    pub fn new(
        config: Arc<SecurityConfig>,
        users: Arc<dyn Store<User>>,
        limiter: LoginRateLimiter,
        tokens: Arc<TokenService>,
        catalog: Arc<PermissionCatalog>,
        audit: Arc<AuditTrail>,
    ) -> Self {
        Self {
            hasher: PasswordHasher::new(config.password.bcrypt_cost),
            totp: Totp::new(config.mfa.clone()),
            config,
            users,
            tokens,
            catalog,
            audit,
            limiter,
            registration: Mutex::new(()),
        }
    }

    /// Returns the login rate limiter.
    pub fn rate_limiter(&self) -> &LoginRateLimiter {
        &self.limiter
    }

    /// Returns the TOTP helper.
    pub fn totp(&self) -> &Totp {
        &self.totp
    }

    // =========================================================================
    // Login
    // =========================================================================

    /// Verifies credentials and issues an access/refresh token pair.
    ///
    /// Every outcome leaves one audit entry. Storage and internal failures
    /// are recorded as a login failure with their cause.
    pub async fn authenticate(&self, credentials: &Credentials, client: Option<&ClientMeta>) -> AuthResult<AuthTokens> {
        let username = credentials.username.trim();
        let result = self.try_authenticate(username, credentials, client).await;

        if let Err(e) = &result {
            if e.is_internal() {
                self.login_failed(username, None, client, &format!("internal error: {}", e));
            }
        }
        result
    }

    async fn try_authenticate(
        &self,
        username: &str,
        credentials: &Credentials,
        client: Option<&ClientMeta>,
    ) -> AuthResult<AuthTokens> {
        if username.is_empty() || credentials.password.is_empty() {
            self.login_failed(username, None, client, "empty username or password");
            return Err(AuthError::InvalidCredentials);
        }

        match self.limiter.check(username)? {
            RateLimitResult::Allowed { .. } => {}
            RateLimitResult::Limited { retry_after, newly_locked } => {
                self.audit.record(
                    AuditLogEntry::failure(AuditEvent::AccountLocked, "too many failed attempts")
                        .with_username(username)
                        .with_client(client)
                        .with_details(json!({
                            "retry_after_secs": retry_after.as_secs(),
                            "newly_locked": newly_locked,
                        })),
                );
                return Err(AuthError::RateLimited { retry_after });
            }
        }

        let Some(mut user) = self.find_by_username(username)? else {
            self.login_failed(username, None, client, "unknown user");
            return Err(AuthError::InvalidCredentials);
        };

        let Some(hash) = user.password_hash.clone() else {
            self.login_failed(username, Some(&user), client, "account has no password");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.verify(&credentials.password, &hash).await? {
            self.login_failed(username, Some(&user), client, "wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if user.mfa_enabled {
            let Some(code) = credentials.mfa_code.as_deref().filter(|c| !c.trim().is_empty()) else {
                self.login_failed(username, Some(&user), client, "mfa code required");
                return Err(AuthError::MfaRequired);
            };
            let verified = user
                .mfa_secret
                .as_deref()
                .is_some_and(|secret| self.totp.verify(secret, code));
            if !verified {
                self.login_failed(username, Some(&user), client, "invalid mfa code");
                return Err(AuthError::InvalidMfa);
            }
        }

        let tokens = self.issue_tokens(&user)?;
        user.last_login = Some(Utc::now());
        self.users.set(&user.id, user.clone())?;
        // Only a fully successful login clears the counter.
        self.limiter.reset(username)?;

        self.audit.record(
            AuditLogEntry::success(AuditEvent::LoginSuccess)
                .with_user(&user.id, &user.username)
                .with_client(client)
                .with_details(json!({ "mfa": user.mfa_enabled })),
        );
        tracing::info!(user_id = %user.id, username = %user.username, "User authenticated");

        Ok(tokens)
    }

    fn login_failed(&self, username: &str, user: Option<&User>, client: Option<&ClientMeta>, reason: &str) {
        let mut entry = AuditLogEntry::failure(AuditEvent::LoginFailure, reason).with_client(client);
        entry = match user {
            Some(user) => entry.with_user(&user.id, &user.username),
            None => entry.with_username(username),
        };
        self.audit.record(entry);
        tracing::warn!(username = %username, reason, "Authentication failed");
    }

    fn issue_tokens(&self, user: &User) -> AuthResult<AuthTokens> {
        let permissions = self.catalog.user_permissions(user);
        let access = self
            .tokens
            .sign(&TokenPayload::access_for(user, &permissions), self.tokens.access_ttl())
            .map_err(|e| AuthError::internal(format!("failed to sign access token: {}", e)))?;
        let refresh = self
            .tokens
            .sign(&TokenPayload::refresh_for(user), self.tokens.refresh_ttl())
            .map_err(|e| AuthError::internal(format!("failed to sign refresh token: {}", e)))?;

        Ok(AuthTokens::bearer(access, refresh, self.tokens.access_ttl().as_secs()))
    }

    // =========================================================================
    // Tokens
    // =========================================================================

    /// Resolves an access token to its current user.
    pub fn validate_token(&self, token: &str) -> AuthResult<User> {
        let claims = self.tokens.verify(token).map_err(|e| AuthError::invalid_token(e.to_string()))?;
        if claims.token_type != TokenType::Access {
            return Err(AuthError::invalid_token("not an access token"));
        }

        match self.users.get(&claims.sub) {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(AuthError::invalid_token("subject no longer exists")),
            Err(e) => Err(AuthError::invalid_token(e.to_string())),
        }
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// The new token reflects the user's current roles and permissions. The
    /// refresh token is returned unchanged.
    pub fn refresh_token(&self, refresh_token: &str) -> AuthResult<AuthTokens> {
        let claims = self
            .tokens
            .verify(refresh_token)
            .map_err(|e| AuthError::invalid_refresh_token(e.to_string()))?;
        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::invalid_refresh_token(
                TokenError::InvalidTokenType {
                    expected: TokenType::Refresh.to_string(),
                    actual: claims.token_type.to_string(),
                }
                .to_string(),
            ));
        }

        let user = self
            .users
            .get(&claims.sub)?
            .ok_or_else(|| AuthError::invalid_refresh_token("subject no longer exists"))?;

        let permissions = self.catalog.user_permissions(&user);
        let access = self
            .tokens
            .sign(&TokenPayload::access_for(&user, &permissions), self.tokens.access_ttl())
            .map_err(|e| AuthError::internal(format!("failed to sign access token: {}", e)))?;

        self.audit
            .record(AuditLogEntry::success(AuditEvent::TokenRefresh).with_user(&user.id, &user.username));

        Ok(AuthTokens::bearer(
            access,
            refresh_token.to_string(),
            self.tokens.access_ttl().as_secs(),
        ))
    }

    /// Revokes a token so it no longer verifies.
    pub fn revoke_token(&self, token: &str) -> AuthResult<()> {
        let claims = self.tokens.decode(token).map_err(|e| AuthError::invalid_token(e.to_string()))?;
        let entry = AuditLogEntry::success(AuditEvent::TokenRevoked).with_user(&claims.sub, &claims.username);

        match self.tokens.revoke(token) {
            Ok(()) => {
                self.audit.record(entry.with_details(json!({ "type": claims.token_type.as_str() })));
                Ok(())
            }
            Err(e) => {
                self.audit.record(
                    AuditLogEntry::failure(AuditEvent::TokenRevoked, e.to_string())
                        .with_user(&claims.sub, &claims.username),
                );
                Err(match e {
                    TokenError::Storage(inner) => AuthError::Storage(inner),
                    other => AuthError::invalid_token(other.to_string()),
                })
            }
        }
    }

    /// Revokes the session's token and records the logout.
    pub fn logout(&self, token: &str, client: Option<&ClientMeta>) -> AuthResult<()> {
        let claims = self.tokens.decode(token).map_err(|e| AuthError::invalid_token(e.to_string()))?;
        self.tokens.revoke(token).map_err(|e| match e {
            TokenError::Storage(inner) => AuthError::Storage(inner),
            other => AuthError::invalid_token(other.to_string()),
        })?;

        self.audit.record(
            AuditLogEntry::success(AuditEvent::Logout)
                .with_user(&claims.sub, &claims.username)
                .with_client(client),
        );
        tracing::info!(user_id = %claims.sub, "User logged out");
        Ok(())
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Looks up a user by ID.
    pub fn get_user(&self, user_id: &str) -> AuthResult<User> {
        self.users.get(user_id)?.ok_or(AuthError::UserNotFound)
    }

    /// Looks up a user by username.
    pub fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        Ok(self
            .users
            .list()?
            .into_iter()
            .map(|(_, user)| user)
            .find(|user| user.username == username))
    }

    /// Lists all users ordered by username.
    pub fn list_users(&self) -> AuthResult<Vec<User>> {
        let mut users: Vec<User> = self.users.list()?.into_iter().map(|(_, u)| u).collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    /// Creates an account after checking uniqueness and password strength.
    pub async fn create_user(&self, input: NewUser) -> AuthResult<User> {
        let username = input.username.trim().to_string();
        if username.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        check_strength(&self.config.password, &input.password)?;
        if self.find_by_username(&username)?.is_some() {
            return Err(AuthError::UserExists { username });
        }

        let hash = self.hasher.hash(&input.password).await?;
        let user = User::new(&username, input.email, input.roles)
            .with_permissions(input.permissions)
            .with_password_hash(hash);

        self.insert_unique(user.clone())?;

        self.audit.record(
            AuditLogEntry::success(AuditEvent::UserCreated)
                .with_user(&user.id, &user.username)
                .with_details(json!({ "roles": user.role_names() })),
        );
        tracing::info!(user_id = %user.id, username = %user.username, "User created");

        Ok(user)
    }

    fn insert_unique(&self, user: User) -> AuthResult<()> {
        let _guard = self.registration.lock();
        if self.find_by_username(&user.username)?.is_some() {
            return Err(AuthError::UserExists {
                username: user.username,
            });
        }
        self.users.set(&user.id.clone(), user)?;
        Ok(())
    }

    /// Creates the default administrator and developer if missing.
    ///
    /// These passwords do not meet the strength rules and must be replaced in
    /// production. Returns the number of accounts created.
    pub async fn bootstrap_default_users(&self) -> AuthResult<usize> {
        let mut created = 0;
        for ((username, password, email), role) in [(DEFAULT_ADMIN, Role::Admin), (DEFAULT_DEVELOPER, Role::Developer)] {
            if self.find_by_username(username)?.is_some() {
                continue;
            }
            let hash = self.hasher.hash(password).await?;
            let user = User::new(username, email, [role]).with_password_hash(hash);
            self.insert_unique(user)?;
            created += 1;
        }

        if created > 0 {
            tracing::info!(created, "Created default accounts");
        }
        Ok(created)
    }

    /// Replaces a password after checking the old one.
    pub async fn change_password(&self, user_id: &str, old_password: &str, new_password: &str) -> AuthResult<()> {
        let mut user = self.get_user(user_id)?;
        let hash = user.password_hash.clone().ok_or(AuthError::InvalidCredentials)?;

        if !self.hasher.verify(old_password, &hash).await? {
            self.audit.record(
                AuditLogEntry::failure(AuditEvent::PasswordChanged, "old password mismatch")
                    .with_user(&user.id, &user.username),
            );
            return Err(AuthError::InvalidCredentials);
        }

        if let Err(e) = check_strength(&self.config.password, new_password) {
            self.audit.record(
                AuditLogEntry::failure(AuditEvent::PasswordChanged, e.to_string()).with_user(&user.id, &user.username),
            );
            return Err(e);
        }

        user.password_hash = Some(self.hasher.hash(new_password).await?);
        self.users.set(&user.id, user.clone())?;

        self.audit
            .record(AuditLogEntry::success(AuditEvent::PasswordChanged).with_user(&user.id, &user.username));
        Ok(())
    }

    /// Replaces a user's roles.
    pub fn set_roles(&self, user_id: &str, roles: impl IntoIterator<Item = Role>) -> AuthResult<User> {
        let mut user = self.get_user(user_id)?;
        let previous = user.role_names();
        user.roles = roles.into_iter().collect::<BTreeSet<_>>();
        self.users.set(&user.id, user.clone())?;

        self.audit.record(
            AuditLogEntry::success(AuditEvent::RolesChanged)
                .with_user(&user.id, &user.username)
                .with_details(json!({ "from": previous, "to": user.role_names() })),
        );
        Ok(user)
    }

    // =========================================================================
    // MFA
    // =========================================================================

    /// Issues a new TOTP secret. MFA stays disabled until confirmed.
    pub fn setup_mfa(&self, user_id: &str) -> AuthResult<MfaSetup> {
        let mut user = self.get_user(user_id)?;
        let secret = Totp::generate_secret();
        let provisioning_uri = self.totp.provisioning_uri(&user.username, &secret);

        user.mfa_secret = Some(secret.clone());
        user.mfa_enabled = false;
        self.users.set(&user.id, user.clone())?;

        self.audit
            .record(AuditLogEntry::success(AuditEvent::MfaSetup).with_user(&user.id, &user.username));

        Ok(MfaSetup {
            secret,
            provisioning_uri,
        })
    }

    /// Enables MFA once `code` proves the authenticator is set up.
    pub fn enable_mfa(&self, user_id: &str, code: &str) -> AuthResult<()> {
        self.toggle_mfa(user_id, code, true, AuditEvent::MfaEnabled)
    }

    /// Disables MFA. Requires a valid current code.
    pub fn disable_mfa(&self, user_id: &str, code: &str) -> AuthResult<()> {
        self.toggle_mfa(user_id, code, false, AuditEvent::MfaDisabled)
    }

    fn toggle_mfa(&self, user_id: &str, code: &str, enabled: bool, event: AuditEvent) -> AuthResult<()> {
        let mut user = self.get_user(user_id)?;
        let verified = user
            .mfa_secret
            .as_deref()
            .is_some_and(|secret| self.totp.verify(secret, code));

        if !verified {
            self.audit
                .record(AuditLogEntry::failure(event, "invalid mfa code").with_user(&user.id, &user.username));
            return Err(AuthError::InvalidMfa);
        }

        user.mfa_enabled = enabled;
        if !enabled {
            user.mfa_secret = None;
        }
        self.users.set(&user.id, user.clone())?;

        self.audit.record(AuditLogEntry::success(event).with_user(&user.id, &user.username));
        Ok(())
    }
}

impl std::fmt::Debug for AuthenticationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationService")
            .field("limiter", &self.limiter)
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
