// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `validate`: Validate the configuration
//! - `audit`: Query, clean up or verify the audit trail
//! - `check`: End-to-end login and access decision
//! - `version`: Show version information

mod audit;
mod check;
mod validate;
mod version;

pub use audit::{audit_cleanup, audit_query, audit_verify};
pub use check::check;
pub use validate::validate;
pub use version::version;

use std::path::Path;

use warden_auth::SecurityConfig;

use crate::cli::{AuditCommand, Cli, Commands};
use crate::error::BinResult;

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Audit(AuditCommand::Query(args)) => audit::audit_query(&cli, args).await,
        Commands::Audit(AuditCommand::Cleanup) => audit::audit_cleanup(&cli).await,
        Commands::Audit(AuditCommand::Verify) => audit::audit_verify(&cli),
        Commands::Check(args) => check::check(&cli, args).await,
        Commands::Version => version::version(&cli),
    }
}

/// A validated configuration and where it came from.
#[derive(Debug)]
pub struct LoadedConfig {
    /// The configuration.
    pub config: SecurityConfig,
    /// `false` when the file was missing and defaults were used.
    pub from_file: bool,
}

/// Loads the configuration at `path`.
///
/// A missing file yields the defaults. Environment overrides and validation
/// apply either way.
pub fn load_config(path: &Path) -> BinResult<LoadedConfig> {
    if path.exists() {
        let config = SecurityConfig::load(path)?;
        return Ok(LoadedConfig { config, from_file: true });
    }

    tracing::debug!(path = %path.display(), "Configuration file not found, using defaults");
    let mut config = SecurityConfig::default();
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(LoadedConfig {
        config,
        from_file: false,
    })
}
