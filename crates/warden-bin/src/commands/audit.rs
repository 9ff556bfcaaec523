// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `audit` commands.

use warden_audit::{AuditError, AuditFilter, AuditLogEntry, AuditSink, ChainVerification, FileAuditSink};
use warden_auth::SecurityConfig;

use super::load_config;
use crate::cli::{AuditQueryArgs, Cli, OutputFormat};
use crate::error::{BinError, BinResult};

/// Executes `audit query`.
pub async fn audit_query(cli: &Cli, args: AuditQueryArgs) -> BinResult<()> {
    let loaded = load_config(&cli.config)?;
    let sink = open_sink(&loaded.config)?;

    let entries = sink.query(&build_filter(&args)).await?;
    tracing::debug!(count = entries.len(), "Audit query finished");

    match args.format {
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No matching audit entries");
            }
            for entry in &entries {
                println!("{}", format_entry(entry));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
    }
    Ok(())
}

/// Executes `audit cleanup`.
pub async fn audit_cleanup(cli: &Cli) -> BinResult<()> {
    let loaded = load_config(&cli.config)?;
    let sink = open_sink(&loaded.config)?;

    let removed = sink.cleanup().await?;
    if !cli.quiet {
        println!(
            "Removed {} audit file(s) older than {} days from {}",
            removed,
            loaded.config.audit.retention_days,
            loaded.config.audit.directory.display()
        );
    }
    Ok(())
}

/// Executes `audit verify`.
pub fn audit_verify(cli: &Cli) -> BinResult<()> {
    let loaded = load_config(&cli.config)?;
    let sink = open_sink(&loaded.config)?;

    let result = check_chain(&sink)?;
    if !cli.quiet {
        println!(
            "Audit chain intact: {} record(s) in {}",
            result.entries,
            loaded.config.audit.directory.display()
        );
    }
    Ok(())
}

/// Verifies the chain, turning the first break into an error.
fn check_chain(sink: &FileAuditSink) -> BinResult<ChainVerification> {
    let result = sink.verify_chain()?;
    match &result.first_break {
        Some(broken) => {
            tracing::error!(%broken, "Audit chain verification failed");
            Err(AuditError::chain_broken(broken.to_string()).into())
        }
        None => Ok(result),
    }
}

fn open_sink(config: &SecurityConfig) -> BinResult<FileAuditSink> {
    if !config.audit.enabled {
        return Err(BinError::config("auditing is disabled in this configuration"));
    }
    FileAuditSink::new(config.audit.sink_config())
        .map_err(|e| BinError::from(e).with_context("Failed to open audit directory"))
}

/// Translates command arguments into a sink filter.
pub fn build_filter(args: &AuditQueryArgs) -> AuditFilter {
    let mut filter = AuditFilter::new().limit(args.limit);
    if let Some(since) = args.since {
        filter = filter.since(since);
    }
    if let Some(until) = args.until {
        filter = filter.until(until);
    }
    if let Some(user) = &args.user {
        filter = filter.user(user.clone());
    }
    if let Some(event) = args.event {
        filter = filter.event(event);
    }
    if let Some(result) = args.result {
        filter = filter.result(result);
    }
    filter
}

/// Renders one entry as a single line.
pub fn format_entry(entry: &AuditLogEntry) -> String {
    let mut line = format!(
        "{} {:<17} {:<7}",
        entry.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
        entry.event.as_str(),
        entry.result.to_string()
    );
    if let Some(username) = entry.username.as_deref().or(entry.user_id.as_deref()) {
        line.push_str(&format!(" user={}", username));
    }
    if let Some(resource) = &entry.resource {
        line.push_str(&format!(" resource={}", resource));
    }
    if let Some(action) = &entry.action {
        line.push_str(&format!(" action={}", action));
    }
    if let Some(ip) = &entry.ip_address {
        line.push_str(&format!(" ip={}", ip));
    }
    if let Some(message) = &entry.error_message {
        line.push_str(&format!(" error=\"{}\"", message));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use warden_audit::{AuditEvent, AuditOutcome};

    fn query_args(extra: &[&str]) -> AuditQueryArgs {
        let mut argv = vec!["warden", "audit", "query"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Some(crate::cli::Commands::Audit(crate::cli::AuditCommand::Query(args))) => args,
            other => panic!("Expected audit query, got {:?}", other),
        }
    }

    #[test]
    fn test_build_filter_maps_arguments() {
        let args = query_args(&["--user", "u-1", "--event", "access_decision", "--limit", "5"]);
        let filter = build_filter(&args);
        assert_eq!(filter.user_id.as_deref(), Some("u-1"));
        assert_eq!(filter.event, Some(AuditEvent::AccessDecision));
        assert_eq!(filter.limit, Some(5));
        assert!(filter.result.is_none());
        assert!(filter.start.is_none());
    }

    #[test]
    fn test_format_entry_includes_target() {
        let entry = AuditLogEntry::failure(AuditEvent::AccessDecision, "no matching permissions or policy")
            .with_user("u-1", "developer")
            .with_target("/config", "write");
        let line = format_entry(&entry);

        assert!(line.contains("access_decision"));
        assert!(line.contains(&AuditOutcome::Failure.to_string()));
        assert!(line.contains("user=developer"));
        assert!(line.contains("resource=/config"));
        assert!(line.contains("action=write"));
    }

    #[test]
    fn test_open_sink_requires_enabled_audit() {
        let mut config = SecurityConfig::default();
        config.audit.enabled = false;
        assert!(open_sink(&config).is_err());
    }

    #[tokio::test]
    async fn test_query_reads_written_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SecurityConfig::default();
        config.audit.directory = dir.path().to_path_buf();

        let sink = open_sink(&config).unwrap();
        sink.write(&AuditLogEntry::success(AuditEvent::LoginSuccess).with_user("u-1", "admin"))
            .await
            .unwrap();
        sink.write(&AuditLogEntry::failure(AuditEvent::LoginFailure, "wrong password").with_username("admin"))
            .await
            .unwrap();
        sink.flush().await.unwrap();

        let args = query_args(&["--result", "failure"]);
        let entries = sink.query(&build_filter(&args)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, AuditEvent::LoginFailure);
    }

    #[tokio::test]
    async fn test_check_chain_flags_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SecurityConfig::default();
        config.audit.directory = dir.path().to_path_buf();

        let sink = open_sink(&config).unwrap();
        let mut previous = String::new();
        for user in ["admin", "developer"] {
            let mut entry = AuditLogEntry::success(AuditEvent::LoginSuccess).with_username(user);
            entry.seal(&previous);
            previous = entry.hash.clone();
            sink.write(&entry).await.unwrap();
        }
        assert_eq!(check_chain(&sink).unwrap().entries, 2);

        let path = sink.day_file_path(chrono::Utc::now().date_naive());
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replace("\"developer\"", "\"intruder\"")).unwrap();

        let err = check_chain(&sink).unwrap_err();
        assert_eq!(err.exit_code(), 5);
        assert!(err.to_string().contains("chain broken"));
    }
}
