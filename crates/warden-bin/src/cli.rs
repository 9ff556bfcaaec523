// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `validate`: Validate the security configuration (default)
//! - `audit query`: Filter the audit trail
//! - `audit cleanup`: Apply the audit retention window
//! - `audit verify`: Check the audit hash chain
//! - `check`: Log in and authorize one request end to end
//! - `version`: Show version information

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use warden_audit::{AuditEvent, AuditOutcome};
use warden_auth::DEFAULT_ACTION;

// =============================================================================
// Main CLI Structure
// =============================================================================

/// Warden - authentication, authorization and audit for local services
#[derive(Parser, Debug)]
#[command(
    name = "warden",
    author = "Sylvex <contact@sylvex.io>",
    version = warden_auth::VERSION,
    about = "Authentication, authorization and audit toolkit",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "warden.toml", env = "WARDEN_CONFIG", global = true)]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", env = "WARDEN_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json, compact)
    #[arg(long, default_value = "text", env = "WARDEN_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Enable quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Validate the configuration file
    ///
    /// This is the default command when no subcommand is specified.
    /// A missing file is not an error: defaults plus environment overrides
    /// are validated instead.
    Validate(ValidateArgs),

    /// Inspect or maintain the audit trail
    #[command(subcommand)]
    Audit(AuditCommand),

    /// Authenticate a user and authorize one request
    ///
    /// Runs login, token validation and the access decision against a
    /// fresh context built from the configuration.
    Check(CheckArgs),

    /// Show detailed version information
    Version,
}

/// Audit trail subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum AuditCommand {
    /// List entries matching a filter, newest first
    Query(AuditQueryArgs),

    /// Delete day files older than the retention window
    Cleanup,

    /// Check that no audit record was edited or removed
    Verify,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `validate` command.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Strict mode: treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the `audit query` command.
#[derive(Args, Debug, Clone)]
pub struct AuditQueryArgs {
    /// Earliest timestamp (RFC 3339)
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,

    /// Latest timestamp (RFC 3339)
    #[arg(long)]
    pub until: Option<DateTime<Utc>>,

    /// User ID
    #[arg(long)]
    pub user: Option<String>,

    /// Event kind, e.g. login_failure
    #[arg(long, value_parser = parse_event)]
    pub event: Option<AuditEvent>,

    /// Outcome (success, failure)
    #[arg(long, value_parser = parse_outcome)]
    pub result: Option<AuditOutcome>,

    /// Maximum number of entries
    #[arg(long, default_value = "50")]
    pub limit: usize,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the `check` command.
#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Username to log in as
    #[arg(short, long)]
    pub username: String,

    /// Password
    #[arg(short, long, env = "WARDEN_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Current TOTP code, when MFA is enabled
    #[arg(long)]
    pub mfa_code: Option<String>,

    /// Resource path to authorize
    #[arg(short, long)]
    pub resource: String,

    /// Action to authorize
    #[arg(short, long, default_value = DEFAULT_ACTION)]
    pub action: String,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

fn parse_event(value: &str) -> Result<AuditEvent, String> {
    AuditEvent::parse(value).ok_or_else(|| format!("unknown audit event: {}", value))
}

fn parse_outcome(value: &str) -> Result<AuditOutcome, String> {
    AuditOutcome::parse(value).ok_or_else(|| format!("unknown audit result: {}", value))
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Validate` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Validate(ValidateArgs::default()))
    }

    /// Check if verbose logging is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }

    /// Get the effective log level based on flags.
    pub fn effective_log_level(&self) -> &str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            &self.log_level
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["warden"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Validate(_)));
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["warden", "validate", "--show-config", "--strict"]);
        if let Some(Commands::Validate(args)) = cli.command {
            assert!(args.show_config);
            assert!(args.strict);
        } else {
            panic!("Expected Validate command");
        }
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["warden", "-c", "/etc/warden/warden.toml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/warden/warden.toml"));
    }

    #[test]
    fn test_quiet_mode() {
        let cli = Cli::parse_from(["warden", "-q"]);
        assert!(cli.quiet);
        assert_eq!(cli.effective_log_level(), "warn");
    }

    #[test]
    fn test_verbose_mode() {
        let cli = Cli::parse_from(["warden", "-v"]);
        assert!(cli.is_verbose());
        assert_eq!(cli.effective_log_level(), "debug");
    }

    #[test]
    fn test_audit_query_filters() {
        let cli = Cli::parse_from([
            "warden",
            "audit",
            "query",
            "--event",
            "login_failure",
            "--result",
            "failure",
            "--since",
            "2025-01-01T00:00:00Z",
            "--limit",
            "10",
        ]);
        match cli.command {
            Some(Commands::Audit(AuditCommand::Query(args))) => {
                assert_eq!(args.event, Some(AuditEvent::LoginFailure));
                assert_eq!(args.result, Some(AuditOutcome::Failure));
                assert_eq!(args.limit, 10);
                assert!(args.since.is_some());
                assert!(args.until.is_none());
            }
            other => panic!("Expected audit query, got {:?}", other),
        }
    }

    #[test]
    fn test_audit_query_rejects_unknown_event() {
        let result = Cli::try_parse_from(["warden", "audit", "query", "--event", "nope"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_audit_cleanup_command() {
        let cli = Cli::parse_from(["warden", "audit", "cleanup"]);
        assert!(matches!(cli.command, Some(Commands::Audit(AuditCommand::Cleanup))));
    }

    #[test]
    fn test_audit_verify_command() {
        let cli = Cli::parse_from(["warden", "audit", "verify"]);
        assert!(matches!(cli.command, Some(Commands::Audit(AuditCommand::Verify))));
    }

    #[test]
    fn test_check_command_defaults_action() {
        let cli = Cli::parse_from(["warden", "check", "-u", "admin", "-p", "admin123!", "-r", "/ai"]);
        if let Some(Commands::Check(args)) = cli.command {
            assert_eq!(args.username, "admin");
            assert_eq!(args.resource, "/ai");
            assert_eq!(args.action, DEFAULT_ACTION);
            assert!(args.mfa_code.is_none());
        } else {
            panic!("Expected Check command");
        }
    }

    #[test]
    fn test_log_format() {
        let cli = Cli::parse_from(["warden", "--log-format", "json"]);
        assert_eq!(cli.log_format, LogFormat::Json);
    }
}
