// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # warden-audit
//!
//! Audit trail for every authentication and authorization outcome.
//!
//! # Architecture
//!
//! - **Sinks**: storage backends behind the [`AuditSink`] trait
//! - **Trail**: [`AuditTrail`] redacts entries and hands them to a background
//!   writer, so recording never blocks or fails a decision
//! - **Query**: sinks that keep entries can be filtered newest-first
//!
//! # Components
//!
//! - [`AuditLogEntry`]: one immutable record, sealed into a SHA-256 hash chain
//!   by the trail's writer
//! - [`verify_chain`]: checks that no sealed entry was edited or removed
//! - [`FileAuditSink`]: JSON-lines day files with size rollover and retention
//! - [`InMemoryAuditSink`]: queryable sink for tests
//! - [`NoOpAuditSink`]: discards everything when auditing is disabled
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_audit::{AuditTrail, AuditLogEntry, AuditEvent, FileAuditSink, FileSinkConfig};
//!
//! let sink = FileAuditSink::new(FileSinkConfig::new("logs/audit"))?;
//! let trail = AuditTrail::new(Arc::new(sink));
//!
//! trail.record(AuditLogEntry::success(AuditEvent::LoginSuccess).with_user("u-1", "admin"));
//! trail.flush().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod chain;
mod error;
mod file_sink;
mod memory_sink;
mod redact;
mod trail;
mod types;

pub use chain::{chain_tail, verify_chain, ChainBreak, ChainBreakKind, ChainVerification};
pub use error::{AuditError, AuditResult};
pub use file_sink::{FileAuditSink, FileSinkConfig};
pub use memory_sink::InMemoryAuditSink;
pub use redact::{is_sensitive_key, redact_details, REDACTED};
pub use trail::{AuditTrail, AuditWriteFailure, TrailStats};
pub use types::{AuditEvent, AuditFilter, AuditLogEntry, AuditOutcome, ClientMeta};

use async_trait::async_trait;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Core Trait
// =============================================================================

/// Storage backend for audit entries.
///
/// Sinks receive entries that have already been redacted. Writes happen on the
/// trail's background worker, one at a time and in submission order.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists one entry.
    async fn write(&self, entry: &AuditLogEntry) -> AuditResult<()>;

    /// Returns entries matching the filter, newest first.
    async fn query(&self, filter: &AuditFilter) -> AuditResult<Vec<AuditLogEntry>>;

    /// Flushes buffered output.
    async fn flush(&self) -> AuditResult<()>;

    /// Returns the hash of the newest sealed entry, so a new writer continues
    /// the existing chain.
    async fn chain_head(&self) -> AuditResult<Option<String>> {
        Ok(None)
    }

    /// Removes entries older than the sink's retention window.
    ///
    /// Returns the number of removed units (files for file sinks).
    async fn cleanup(&self) -> AuditResult<usize> {
        Ok(0)
    }

    /// Returns the sink name for identification.
    fn name(&self) -> &str {
        "audit_sink"
    }
}

// =============================================================================
// No-Op Sink
// =============================================================================

/// A sink that discards all entries.
///
/// Used when auditing is disabled in configuration.
#[derive(Debug, Default, Clone)]
pub struct NoOpAuditSink;

impl NoOpAuditSink {
    /// Creates a new no-op sink.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for NoOpAuditSink {
    async fn write(&self, _entry: &AuditLogEntry) -> AuditResult<()> {
        Ok(())
    }

    async fn query(&self, _filter: &AuditFilter) -> AuditResult<Vec<AuditLogEntry>> {
        Ok(Vec::new())
    }

    async fn flush(&self) -> AuditResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpAuditSink::new();
        let entry = AuditLogEntry::success(AuditEvent::Logout);

        sink.write(&entry).await.unwrap();
        sink.flush().await.unwrap();
        assert!(sink.query(&AuditFilter::new()).await.unwrap().is_empty());
        assert_eq!(sink.cleanup().await.unwrap(), 0);
        assert_eq!(sink.chain_head().await.unwrap(), None);
        assert_eq!(sink.name(), "noop");
    }
}
