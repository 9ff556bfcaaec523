// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory audit sink for testing and development.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::chain::{chain_tail, verify_chain, ChainVerification};
use crate::error::AuditResult;
use crate::types::{AuditEvent, AuditFilter, AuditLogEntry};
use crate::AuditSink;

// =============================================================================
// In-Memory Audit Sink
// =============================================================================

/// In-memory audit sink.
///
/// Keeps every entry in a shared vector. Clones share the same storage, so a
/// test can keep a handle while the trail owns another.
///
/// # Example
///
/// ```rust,ignore
/// use warden_audit::{InMemoryAuditSink, AuditTrail};
///
/// let sink = InMemoryAuditSink::new();
/// let trail = AuditTrail::new(Arc::new(sink.clone()));
///
/// trail.record(entry);
/// trail.flush().await?;
/// assert_eq!(sink.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditSink {
    entries: Arc<RwLock<Vec<AuditLogEntry>>>,
    /// Maximum number of entries to keep (0 = unlimited).
    max_entries: usize,
}

impl InMemoryAuditSink {
    /// Creates a new unbounded sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that keeps only the most recent `max_entries` entries.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::with_capacity(max_entries))),
            max_entries,
        }
    }

    /// Returns all entries in insertion order.
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.read().clone()
    }

    /// Returns entries of the given kind in insertion order.
    pub fn entries_for(&self, event: AuditEvent) -> Vec<AuditLogEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.event == event)
            .cloned()
            .collect()
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Verifies the hash chain over the retained entries.
    pub fn verify_chain(&self) -> ChainVerification {
        verify_chain(self.entries.read().iter())
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn write(&self, entry: &AuditLogEntry) -> AuditResult<()> {
        let mut entries = self.entries.write();
        entries.push(entry.clone());

        if self.max_entries > 0 && entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(0..excess);
        }

        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> AuditResult<Vec<AuditLogEntry>> {
        let matches = self
            .entries
            .read()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        Ok(filter.finish(matches))
    }

    async fn flush(&self) -> AuditResult<()> {
        Ok(())
    }

    async fn chain_head(&self) -> AuditResult<Option<String>> {
        Ok(chain_tail(self.entries.read().iter()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
