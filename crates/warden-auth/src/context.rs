// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Composition root wiring every security service together.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use warden_audit::{
    AuditEvent, AuditLogEntry, AuditSink, AuditTrail, FileAuditSink, NoOpAuditSink,
};

use crate::authn::{AuthenticationService, LoginRateLimiter};
use crate::authz::AuthorizationService;
use crate::config::{SecurityConfig, StorageBackend};
use crate::error::SecurityResult;
use crate::policy::PolicyEngine;
use crate::rbac::PermissionCatalog;
use crate::store::Stores;
use crate::token::TokenService;

// =============================================================================
// SecurityContext
// =============================================================================

/// All security services, built once and passed by reference to callers.
///
/// Cloning is cheap; clones share the same services.
#[derive(Clone)]
pub struct SecurityContext {
    /// Effective configuration.
    pub config: Arc<SecurityConfig>,
    /// Backing tables.
    pub stores: Stores,
    /// Token signing and verification.
    pub tokens: Arc<TokenService>,
    /// Role and permission definitions.
    pub catalog: Arc<PermissionCatalog>,
    /// ABAC policies.
    pub policies: Arc<PolicyEngine>,
    /// Audit trail.
    pub audit: Arc<AuditTrail>,
    /// Authentication service.
    pub authn: Arc<AuthenticationService>,
    /// Authorization service.
    pub authz: Arc<AuthorizationService>,
    maintenance: Arc<Mutex<Option<Maintenance>>>,
}

struct Maintenance {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Counts from one maintenance sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Retired signing keys dropped.
    pub keys_purged: usize,
    /// Revocations of expired tokens forgotten.
    pub revocations_swept: usize,
    /// Idle rate-limit trackers removed.
    pub trackers_swept: usize,
    /// Audit files deleted by retention.
    pub audit_files_removed: usize,
}

impl SecurityContext {
    /// Creates a builder.
    pub fn builder() -> SecurityContextBuilder {
        SecurityContextBuilder::new()
    }

    /// Builds a context entirely from configuration.
    pub async fn from_config(config: SecurityConfig) -> SecurityResult<Self> {
        Self::builder().config(config).build().await
    }

    /// Returns the authentication service.
    pub fn authn(&self) -> &AuthenticationService {
        &self.authn
    }

    /// Returns the authorization service.
    pub fn authz(&self) -> &AuthorizationService {
        &self.authz
    }

    /// Returns the token service.
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Returns the audit trail.
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Rotates the signing key and records the rotation.
    pub fn rotate_keys(&self) -> SecurityResult<String> {
        let key_id = self.tokens.rotate_keys()?;
        self.audit.record(
            AuditLogEntry::success(AuditEvent::KeyRotated).with_details(json!({ "key_id": key_id })),
        );
        Ok(key_id)
    }

    /// Runs one sweep of every time-bounded table.
    ///
    /// Audit retention failures are logged and do not fail the sweep.
    pub async fn run_maintenance(&self) -> SecurityResult<MaintenanceReport> {
        let mut report = MaintenanceReport {
            keys_purged: self.tokens.purge_expired_keys(),
            revocations_swept: self.tokens.sweep_revocations()?,
            trackers_swept: self.authn.rate_limiter().sweep_expired()?,
            audit_files_removed: 0,
        };

        match self.audit.cleanup_old_logs().await {
            Ok(removed) => report.audit_files_removed = removed,
            Err(e) => tracing::warn!(error = %e, "Audit retention cleanup failed"),
        }

        tracing::debug!(?report, "Maintenance sweep finished");
        Ok(report)
    }

    /// Starts a background task running [`SecurityContext::run_maintenance`]
    /// every `interval`. Replaces any task already running.
    pub fn spawn_maintenance(&self, interval: Duration) {
        let (stop, mut stopped) = watch::channel(false);
        let ctx = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = ctx.run_maintenance().await {
                            tracing::warn!(error = %e, "Maintenance sweep failed");
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
            tracing::debug!("Maintenance task stopped");
        });

        if let Some(previous) = self.maintenance.lock().replace(Maintenance { stop, handle }) {
            let _ = previous.stop.send(true);
            previous.handle.abort();
        }
        tracing::info!(interval = ?interval, "Maintenance task started");
    }

    /// Returns `true` while a maintenance task is running.
    pub fn is_maintenance_running(&self) -> bool {
        self.maintenance.lock().as_ref().is_some_and(|m| !m.handle.is_finished())
    }

    /// Clears all state, issues fresh keys and re-creates default accounts.
    ///
    /// Meant for test isolation; every issued token stops verifying.
    pub async fn reset(&self) -> SecurityResult<()> {
        self.stores.clear_all()?;
        self.tokens.reset()?;
        if self.config.bootstrap.create_default_users {
            self.authn.bootstrap_default_users().await?;
        }
        tracing::info!("Security context reset");
        Ok(())
    }

    /// Stops maintenance and flushes the audit trail.
    pub async fn shutdown(&self) {
        let maintenance = self.maintenance.lock().take();
        if let Some(m) = maintenance {
            let _ = m.stop.send(true);
            if let Err(e) = m.handle.await {
                tracing::warn!(error = %e, "Maintenance task failed");
            }
        }
        self.audit.shutdown().await;
        tracing::info!("Security context shut down");
    }
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("tokens", &self.tokens)
            .field("policies", &self.policies)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// SecurityContextBuilder
// =============================================================================

/// Builder for [`SecurityContext`].
///
/// Anything not set explicitly is derived from the configuration.
#[derive(Default)]
pub struct SecurityContextBuilder {
    config: Option<SecurityConfig>,
    stores: Option<Stores>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    catalog: Option<PermissionCatalog>,
}

impl SecurityContextBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    pub fn config(mut self, config: SecurityConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the backing tables.
    pub fn stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Sets the audit sink.
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Sets the permission catalog.
    pub fn catalog(mut self, catalog: PermissionCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Builds the context and starts the periodic sweep every
    /// `maintenance_interval`. Must run inside a Tokio runtime.
    pub async fn build(self) -> SecurityResult<SecurityContext> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let config = Arc::new(config);

        let stores = match self.stores {
            Some(stores) => stores,
            None => match config.storage.backend {
                StorageBackend::Memory => Stores::in_memory(),
                StorageBackend::Json => Stores::json(&config.storage.directory)?,
            },
        };

        let sink: Arc<dyn AuditSink> = match self.audit_sink {
            Some(sink) => sink,
            None if config.audit.enabled => Arc::new(FileAuditSink::new(config.audit.sink_config())?),
            None => Arc::new(NoOpAuditSink::new()),
        };
        let audit = Arc::new(AuditTrail::new(sink));

        let tokens = Arc::new(TokenService::new(config.token.clone(), stores.revoked_tokens.clone())?);
        let catalog = Arc::new(self.catalog.unwrap_or_default());
        let policies = Arc::new(PolicyEngine::new(stores.policies.clone()));

        let limiter = LoginRateLimiter::new(config.lockout.clone(), stores.rate_limits.clone());
        let authn = Arc::new(AuthenticationService::new(
            config.clone(),
            stores.users.clone(),
            limiter,
            tokens.clone(),
            catalog.clone(),
            audit.clone(),
        ));
        let authz = Arc::new(AuthorizationService::new(catalog.clone(), policies.clone(), audit.clone()));

        if config.bootstrap.create_default_users {
            authn.bootstrap_default_users().await?;
        }

        tracing::info!(
            audit_sink = audit.sink_name(),
            storage = ?config.storage.backend,
            "Security context ready"
        );

        let interval = config.maintenance_interval;
        let ctx = SecurityContext {
            config,
            stores,
            tokens,
            catalog,
            policies,
            audit,
            authn,
            authz,
            maintenance: Arc::new(Mutex::new(None)),
        };
        ctx.spawn_maintenance(interval);
        Ok(ctx)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Credentials;
    use warden_audit::InMemoryAuditSink;

    fn test_config() -> SecurityConfig {
        let mut config = SecurityConfig::default();
        config.password.bcrypt_cost = 4;
        config.audit.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_build_bootstraps_default_users() {
        let ctx = SecurityContext::from_config(test_config()).await.unwrap();
        assert_eq!(ctx.audit().sink_name(), "noop");
        assert!(ctx.authn().find_by_username("admin").unwrap().is_some());
        assert!(ctx.authn().find_by_username("developer").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_build_without_bootstrap() {
        let mut config = test_config();
        config.bootstrap.create_default_users = false;
        let ctx = SecurityContext::from_config(config).await.unwrap();
        assert!(ctx.authn().list_users().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = test_config();
        config.password.bcrypt_cost = 2;
        assert!(SecurityContext::from_config(config).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_invalidates_tokens() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let ctx = SecurityContext::builder()
            .config(test_config())
            .audit_sink(sink)
            .build()
            .await
            .unwrap();

        let tokens = ctx
            .authn()
            .authenticate(&Credentials::new("admin", "admin123!"), None)
            .await
            .unwrap();
        assert!(ctx.authn().validate_token(&tokens.access_token).is_ok());

        ctx.reset().await.unwrap();
        assert!(ctx.authn().validate_token(&tokens.access_token).is_err());
        assert!(ctx.authn().find_by_username("admin").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rotate_keys_is_audited() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let ctx = SecurityContext::builder()
            .config(test_config())
            .audit_sink(sink.clone())
            .build()
            .await
            .unwrap();

        let key_id = ctx.rotate_keys().unwrap();
        assert_eq!(ctx.tokens().key_ids()[0], key_id);

        ctx.audit().flush().await.unwrap();
        assert_eq!(sink.entries_for(AuditEvent::KeyRotated).len(), 1);
    }

    #[tokio::test]
    async fn test_build_starts_maintenance() {
        let ctx = SecurityContext::from_config(test_config()).await.unwrap();
        assert!(ctx.is_maintenance_running());

        ctx.shutdown().await;
        assert!(!ctx.is_maintenance_running());
    }

    #[tokio::test]
    async fn test_maintenance_sweeps_on_schedule() {
        let mut config = test_config();
        config.maintenance_interval = Duration::from_millis(20);
        let ctx = SecurityContext::from_config(config).await.unwrap();

        let stale = chrono::Utc::now() - chrono::Duration::hours(1);
        ctx.authn().rate_limiter().check_at("ghost", stale).unwrap();
        assert_eq!(ctx.authn().rate_limiter().attempts("ghost").unwrap(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ctx.authn().rate_limiter().attempts("ghost").unwrap(), 0);

        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_maintenance_lifecycle() {
        let ctx = SecurityContext::from_config(test_config()).await.unwrap();

        let report = ctx.run_maintenance().await.unwrap();
        assert_eq!(report, MaintenanceReport::default());

        ctx.spawn_maintenance(Duration::from_millis(20));
        assert!(ctx.is_maintenance_running());
        tokio::time::sleep(Duration::from_millis(60)).await;

        ctx.shutdown().await;
        assert!(!ctx.is_maintenance_running());
    }
}
