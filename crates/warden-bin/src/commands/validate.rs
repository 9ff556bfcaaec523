// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use warden_auth::config::StorageBackend;
use warden_auth::SecurityConfig;

use super::load_config;
use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Lowest bcrypt cost that does not draw a warning.
const RECOMMENDED_BCRYPT_COST: u32 = 10;

/// Executes the `validate` command.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;
    let loaded = load_config(config_path)
        .map_err(|e| e.with_context(format!("Configuration validation failed for {}", config_path.display())))?;

    let mut warnings = collect_warnings(&loaded.config);
    if !loaded.from_file {
        warnings.insert(
            0,
            format!("Configuration file not found, defaults in use: {}", config_path.display()),
        );
    }

    let config = &loaded.config;
    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Issuer:       {}", config.token.issuer);
            println!("  Audience:     {}", config.token.audience);
            println!("  Access TTL:   {}s", config.token.access_ttl.as_secs());
            println!("  Refresh TTL:  {}s", config.token.refresh_ttl.as_secs());
            println!(
                "  Lockout:      {} attempts / {}s, locked {}s",
                config.lockout.max_attempts,
                config.lockout.window.as_secs(),
                config.lockout.lockout_duration.as_secs()
            );
            println!("  Storage:      {}", storage_label(config));
            println!(
                "  Audit:        {}",
                if config.audit.enabled {
                    config.audit.directory.display().to_string()
                } else {
                    "disabled".to_string()
                }
            );

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!("{}", serde_json::to_string_pretty(config)?);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "from_file": loaded.from_file,
                "summary": {
                    "issuer": config.token.issuer,
                    "audience": config.token.audience,
                    "access_ttl_secs": config.token.access_ttl.as_secs(),
                    "refresh_ttl_secs": config.token.refresh_ttl.as_secs(),
                    "max_attempts": config.lockout.max_attempts,
                    "storage": storage_label(config),
                    "audit_enabled": config.audit.enabled,
                },
                "warnings": warnings,
                "config": if args.show_config { Some(config) } else { None },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    if args.strict && !warnings.is_empty() {
        return Err(BinError::config(format!("Strict mode: {} warning(s) found", warnings.len())));
    }

    Ok(())
}

/// Returns deployment concerns that are valid but worth flagging.
pub fn collect_warnings(config: &SecurityConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.bootstrap.create_default_users {
        warnings.push("Default accounts with well-known passwords will be created".to_string());
    }
    if config.storage.backend == StorageBackend::Memory {
        warnings.push("In-memory storage: users and revocations are lost on exit".to_string());
    }
    if config.password.bcrypt_cost < RECOMMENDED_BCRYPT_COST {
        warnings.push(format!(
            "bcrypt cost {} is below the recommended {}",
            config.password.bcrypt_cost, RECOMMENDED_BCRYPT_COST
        ));
    }
    if !config.audit.enabled {
        warnings.push("Audit trail is disabled".to_string());
    } else if !config.audit.directory.exists() {
        warnings.push(format!(
            "Audit directory does not exist yet: {}",
            config.audit.directory.display()
        ));
    }

    warnings
}

fn storage_label(config: &SecurityConfig) -> String {
    match config.storage.backend {
        StorageBackend::Memory => "memory".to_string(),
        StorageBackend::Json => format!("json ({})", config.storage.directory.display()),
    }
}
