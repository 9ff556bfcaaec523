// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Security subsystem configuration.
//!
//! Configuration is read from TOML or JSON (chosen by file extension), then
//! `WARDEN_*` environment variables are applied, then the result is validated.
//!
//! ```toml
//! maintenance_interval = "5m"
//!
//! [token]
//! issuer = "warden"
//! access_ttl = "1h"
//!
//! [lockout]
//! max_attempts = 5
//! lockout_duration = "30m"
//!
//! [audit]
//! directory = "/var/log/warden"
//! retention_days = 30
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use warden_audit::FileSinkConfig;

use crate::error::{ConfigError, ConfigResult};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "WARDEN";

// =============================================================================
// SecurityConfig
// =============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Token signing and lifetimes.
    pub token: TokenConfig,
    /// Brute-force lockout.
    pub lockout: LockoutConfig,
    /// Password rules and hashing cost.
    pub password: PasswordPolicy,
    /// TOTP parameters.
    pub mfa: MfaConfig,
    /// Audit trail output.
    pub audit: AuditConfig,
    /// Storage backend.
    pub storage: StorageConfig,
    /// Default accounts.
    pub bootstrap: BootstrapConfig,
    /// Period of the background sweep.
    #[serde(with = "humantime_serde")]
    pub maintenance_interval: Duration,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token: TokenConfig::default(),
            lockout: LockoutConfig::default(),
            password: PasswordPolicy::default(),
            mfa: MfaConfig::default(),
            audit: AuditConfig::default(),
            storage: StorageConfig::default(),
            bootstrap: BootstrapConfig::default(),
            maintenance_interval: Duration::from_secs(300),
        }
    }
}

impl SecurityConfig {
    /// Loads, overrides from the environment, and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading security configuration");

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut config = Self::parse(&content, ConfigFormat::from_path(path)?)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        debug!(
            issuer = %config.token.issuer,
            storage = ?config.storage.backend,
            audit_enabled = config.audit.enabled,
            "Security configuration loaded"
        );
        Ok(config)
    }

    /// Parses configuration content without overrides or validation.
    pub fn parse(content: &str, format: ConfigFormat) -> ConfigResult<Self> {
        match format {
            ConfigFormat::Toml => {
                toml::from_str(content).map_err(|e| ConfigError::parse(e.to_string()))
            }
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| ConfigError::parse(e.to_string()))
            }
        }
    }

    /// Applies `WARDEN_*` overrides read through `lookup`.
    ///
    /// Recognized keys: `WARDEN_TOKEN_ISSUER`, `WARDEN_TOKEN_AUDIENCE`,
    /// `WARDEN_BCRYPT_COST`, `WARDEN_AUDIT_DIR`, `WARDEN_AUDIT_ENABLED`,
    /// `WARDEN_STORAGE_DIR`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = |name: &str| format!("{}_{}", ENV_PREFIX, name);

        if let Some(value) = lookup(&key("TOKEN_ISSUER")) {
            self.token.issuer = value;
        }
        if let Some(value) = lookup(&key("TOKEN_AUDIENCE")) {
            self.token.audience = value;
        }
        if let Some(value) = lookup(&key("BCRYPT_COST")) {
            self.password.bcrypt_cost = value
                .parse()
                .map_err(|_| ConfigError::validation(key("BCRYPT_COST"), format!("not a number: {}", value)))?;
        }
        if let Some(value) = lookup(&key("AUDIT_DIR")) {
            self.audit.directory = PathBuf::from(value);
        }
        if let Some(value) = lookup(&key("AUDIT_ENABLED")) {
            self.audit.enabled = parse_bool(&value)
                .ok_or_else(|| ConfigError::validation(key("AUDIT_ENABLED"), format!("not a boolean: {}", value)))?;
        }
        if let Some(value) = lookup(&key("STORAGE_DIR")) {
            self.storage.backend = StorageBackend::Json;
            self.storage.directory = PathBuf::from(value);
        }
        Ok(())
    }

    /// Checks value ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        self.token.validate()?;
        self.lockout.validate()?;
        self.password.validate()?;
        self.mfa.validate()?;
        self.audit.validate()?;

        if self.maintenance_interval.is_zero() {
            return Err(ConfigError::validation("maintenance_interval", "must be greater than zero"));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML.
    Toml,
    /// JSON.
    Json,
}

impl ConfigFormat {
    /// Picks the format from the file extension.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat { extension }),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Token settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// `iss` claim.
    pub issuer: String,
    /// `aud` claim.
    pub audience: String,
    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_ttl: Duration,
    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_ttl: Duration,
    /// Clock skew tolerance in seconds.
    pub leeway_secs: u64,
    /// How long a superseded key still verifies tokens.
    #[serde(with = "humantime_serde")]
    pub rotation_grace: Duration,
    /// Maximum number of keys held, the current one included.
    pub max_keys: usize,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "warden".to_string(),
            audience: "warden-cli".to_string(),
            access_ttl: Duration::from_secs(3600),
            refresh_ttl: Duration::from_secs(7 * 86_400),
            leeway_secs: 30,
            rotation_grace: Duration::from_secs(30 * 86_400),
            max_keys: 4,
        }
    }
}

impl TokenConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::validation("token.issuer", "must not be empty"));
        }
        if self.audience.trim().is_empty() {
            return Err(ConfigError::validation("token.audience", "must not be empty"));
        }
        if self.access_ttl.is_zero() || self.refresh_ttl.is_zero() {
            return Err(ConfigError::validation("token", "token lifetimes must be greater than zero"));
        }
        if self.refresh_ttl < self.access_ttl {
            return Err(ConfigError::validation("token.refresh_ttl", "must not be shorter than access_ttl"));
        }
        if self.max_keys == 0 {
            return Err(ConfigError::validation("token.max_keys", "must be at least 1"));
        }
        Ok(())
    }
}

/// Lockout settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Failed attempts tolerated within the window.
    pub max_attempts: u32,
    /// Window after which the attempt counter starts over.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// How long a locked identifier stays locked.
    #[serde(with = "humantime_serde")]
    pub lockout_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
            lockout_duration: Duration::from_secs(30 * 60),
        }
    }
}

impl LockoutConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::validation("lockout.max_attempts", "must be at least 1"));
        }
        if self.window.is_zero() || self.lockout_duration.is_zero() {
            return Err(ConfigError::validation("lockout", "durations must be greater than zero"));
        }
        Ok(())
    }
}

/// Password strength rules and hashing cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    /// Minimum length in characters.
    pub min_length: usize,
    /// Require an uppercase letter.
    pub require_uppercase: bool,
    /// Require a lowercase letter.
    pub require_lowercase: bool,
    /// Require a digit.
    pub require_digit: bool,
    /// Require a non-alphanumeric character.
    pub require_special: bool,
    /// bcrypt cost factor.
    pub bcrypt_cost: u32,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
            bcrypt_cost: 12,
        }
    }
}

impl PasswordPolicy {
    fn validate(&self) -> ConfigResult<()> {
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ConfigError::validation("password.bcrypt_cost", "must be between 4 and 31"));
        }
        if self.min_length == 0 {
            return Err(ConfigError::validation("password.min_length", "must be at least 1"));
        }
        Ok(())
    }
}

/// TOTP settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MfaConfig {
    /// Issuer label shown by authenticator apps.
    pub issuer: String,
    /// Time step in seconds.
    pub step_secs: u64,
    /// Steps of tolerance on each side of the current one.
    pub skew_steps: u64,
    /// Code length.
    pub digits: u32,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            issuer: "Warden".to_string(),
            step_secs: 30,
            skew_steps: 1,
            digits: 6,
        }
    }
}

impl MfaConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.step_secs == 0 {
            return Err(ConfigError::validation("mfa.step_secs", "must be greater than zero"));
        }
        if !(6..=8).contains(&self.digits) {
            return Err(ConfigError::validation("mfa.digits", "must be between 6 and 8"));
        }
        Ok(())
    }
}

/// Audit trail settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Write entries to files; when off, entries are discarded.
    pub enabled: bool,
    /// Directory of the day files.
    pub directory: PathBuf,
    /// Size at which the active file rolls over, in bytes.
    pub max_file_size: u64,
    /// Age in days after which day files are deleted.
    pub retention_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("logs/audit"),
            max_file_size: 10 * 1024 * 1024,
            retention_days: 90,
        }
    }
}

impl AuditConfig {
    /// Returns the file sink settings for this configuration.
    pub fn sink_config(&self) -> FileSinkConfig {
        FileSinkConfig::new(&self.directory)
            .max_file_size(self.max_file_size)
            .retention_days(self.retention_days)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.enabled && self.max_file_size == 0 {
            return Err(ConfigError::validation("audit.max_file_size", "must be greater than zero"));
        }
        if self.retention_days == 0 {
            return Err(ConfigError::validation("audit.retention_days", "must be at least 1"));
        }
        Ok(())
    }
}

/// Where security state lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local tables.
    #[default]
    Memory,
    /// JSON documents in `storage.directory`.
    Json,
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind.
    pub backend: StorageBackend,
    /// Directory for the JSON backend.
    pub directory: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            directory: PathBuf::from("data/security"),
        }
    }
}

/// Default account settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Create `admin` and `developer` when no user with those names exists.
    pub create_default_users: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            create_default_users: true,
        }
    }
}
