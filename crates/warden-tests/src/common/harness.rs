// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! Builds an isolated [`SecurityContext`] per test: its own tables, cheap
//! bcrypt, and an in-memory audit sink that tests can inspect.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use warden_audit::{AuditEvent, AuditLogEntry, InMemoryAuditSink};
use warden_auth::{AuthTokens, Role, SecurityConfig, SecurityContext, Stores, User};

use super::fixtures::{Account, ConfigFixtures, UserFixtures};
use super::init_test_logging;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the test harness.
pub struct TestHarnessConfig {
    /// Security configuration for the context.
    pub security: SecurityConfig,
    /// Tables to use instead of the configured backend.
    pub stores: Option<Stores>,
    /// Whether to create a temp directory for the test.
    pub create_temp_dir: bool,
    /// Whether to enable tracing for the test.
    pub enable_tracing: bool,
}

impl Default for TestHarnessConfig {
    fn default() -> Self {
        Self {
            security: ConfigFixtures::fast(),
            stores: None,
            create_temp_dir: false,
            enable_tracing: false,
        }
    }
}

impl TestHarnessConfig {
    /// Uses `security` as the configuration.
    pub fn security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    /// Uses the given tables.
    pub fn stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Skips the default accounts.
    pub fn without_default_users(mut self) -> Self {
        self.security.bootstrap.create_default_users = false;
        self
    }

    /// Creates a temp directory owned by the harness.
    pub fn with_temp_dir(mut self) -> Self {
        self.create_temp_dir = true;
        self
    }

    /// Enable tracing.
    pub fn with_tracing(mut self) -> Self {
        self.enable_tracing = true;
        self
    }
}

// =============================================================================
// Harness
// =============================================================================

/// An isolated security context plus handles for inspecting it.
pub struct TestHarness {
    /// The context under test.
    pub ctx: SecurityContext,
    /// Sink receiving every audit entry the context records.
    pub audit_sink: Arc<InMemoryAuditSink>,
    temp_dir: Option<TempDir>,
}

impl TestHarness {
    /// Creates a harness with the default test configuration.
    pub async fn new() -> Self {
        Self::with_config(TestHarnessConfig::default()).await
    }

    /// Creates a harness from `config`.
    pub async fn with_config(config: TestHarnessConfig) -> Self {
        if config.enable_tracing {
            init_test_logging();
        }

        let temp_dir = config.create_temp_dir.then(|| super::temp_test_dir("warden-test-"));
        let audit_sink = Arc::new(InMemoryAuditSink::new());

        let mut builder = SecurityContext::builder()
            .config(config.security)
            .audit_sink(audit_sink.clone());
        if let Some(stores) = config.stores {
            builder = builder.stores(stores);
        }
        let ctx = builder.build().await.expect("Failed to build security context");

        tracing::debug!("Test harness ready");
        Self {
            ctx,
            audit_sink,
            temp_dir,
        }
    }

    /// Get the temp directory path.
    pub fn temp_path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().to_path_buf())
    }

    /// Logs `account` in, panicking on failure.
    pub async fn login(&self, account: &Account) -> AuthTokens {
        self.ctx
            .authn()
            .authenticate(&account.credentials(), None)
            .await
            .unwrap_or_else(|e| panic!("Login as {} failed: {}", account.username, e))
    }

    /// Logs `account` in and resolves the access token to its user.
    pub async fn login_user(&self, account: &Account) -> User {
        let tokens = self.login(account).await;
        self.ctx
            .authn()
            .validate_token(&tokens.access_token)
            .expect("Freshly issued token did not validate")
    }

    /// Creates an account with a strong password and the given role.
    pub async fn create_user(&self, username: &str, role: Role) -> User {
        self.ctx
            .authn()
            .create_user(UserFixtures::new_user(username, role))
            .await
            .unwrap_or_else(|e| panic!("Creating {} failed: {}", username, e))
    }

    /// Flushes the trail and returns everything recorded so far.
    pub async fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.ctx.audit().flush().await.expect("Audit flush failed");
        self.audit_sink.entries()
    }

    /// Flushes the trail and returns the entries with `event`.
    pub async fn audit_events(&self, event: AuditEvent) -> Vec<AuditLogEntry> {
        self.ctx.audit().flush().await.expect("Audit flush failed");
        self.audit_sink.entries_for(event)
    }

    /// Shuts the context down.
    pub async fn shutdown(self) {
        self.ctx.shutdown().await;
    }
}
