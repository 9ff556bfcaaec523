// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The audit trail: redaction plus a background writer in front of a sink.
//!
//! The writer is the only task that touches the sink, so it also owns the
//! hash chain: each entry is sealed against the hash of the last entry the
//! sink accepted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::error::{AuditError, AuditResult};
use crate::redact::redact_details;
use crate::types::{AuditEvent, AuditFilter, AuditLogEntry};
use crate::AuditSink;

const DEFAULT_QUEUE_SIZE: usize = 10_000;
const ERROR_CHANNEL_SIZE: usize = 64;

// =============================================================================
// Audit Trail
// =============================================================================

/// Fire-and-forget front end for an [`AuditSink`].
///
/// [`record`](Self::record) never blocks and never fails: the entry is queued
/// for a background task that owns all sink writes and seals every entry into
/// the hash chain. Write failures are logged
/// and published on the error channel returned by
/// [`subscribe_errors`](Self::subscribe_errors).
///
/// Must be created inside a Tokio runtime.
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
    sender: mpsc::Sender<TrailCommand>,
    errors: broadcast::Sender<AuditWriteFailure>,
    counters: Arc<Counters>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Commands sent to the writer task.
enum TrailCommand {
    /// Write one entry.
    Record(AuditLogEntry),
    /// Reply once everything queued before this command is written.
    Flush(oneshot::Sender<AuditResult<()>>),
    /// Flush and stop.
    Shutdown,
}

/// A write that did not make it to the sink.
#[derive(Debug, Clone)]
pub struct AuditWriteFailure {
    /// ID of the lost entry.
    pub entry_id: Uuid,
    /// Event kind of the lost entry.
    pub event: AuditEvent,
    /// What went wrong.
    pub message: String,
}

#[derive(Debug, Default)]
struct Counters {
    recorded: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of trail statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrailStats {
    /// Entries accepted by `record`.
    pub recorded: u64,
    /// Entries the sink accepted.
    pub written: u64,
    /// Entries the sink rejected.
    pub failed: u64,
    /// Entries dropped because the queue was full or closed.
    pub dropped: u64,
}

impl AuditTrail {
    /// Creates a trail over `sink` and starts its writer task.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self::with_queue_size(sink, DEFAULT_QUEUE_SIZE)
    }

    /// Creates a trail with a custom queue size.
    pub fn with_queue_size(sink: Arc<dyn AuditSink>, queue_size: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_SIZE);
        let counters = Arc::new(Counters::default());

        let handle = tokio::spawn(Self::worker(
            sink.clone(),
            receiver,
            counters.clone(),
            errors.clone(),
        ));

        Self {
            sink,
            sender,
            errors,
            counters,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Background task performing all sink writes in order.
    async fn worker(
        sink: Arc<dyn AuditSink>,
        mut receiver: mpsc::Receiver<TrailCommand>,
        counters: Arc<Counters>,
        errors: broadcast::Sender<AuditWriteFailure>,
    ) {
        let mut last_hash = match sink.chain_head().await {
            Ok(head) => head.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(
                    sink = sink.name(),
                    error = %e,
                    "Failed to read audit chain head, starting a new chain"
                );
                String::new()
            }
        };

        while let Some(command) = receiver.recv().await {
            match command {
                TrailCommand::Record(mut entry) => {
                    entry.seal(&last_hash);
                    match sink.write(&entry).await {
                        Ok(()) => {
                            counters.written.fetch_add(1, Ordering::Relaxed);
                            last_hash = entry.hash;
                        }
                        Err(e) => {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::error!(
                                sink = sink.name(),
                                event = %entry.event,
                                error = %e,
                                "Failed to write audit entry"
                            );
                            let _ = errors.send(AuditWriteFailure {
                                entry_id: entry.id,
                                event: entry.event,
                                message: e.to_string(),
                            });
                        }
                    }
                }
                TrailCommand::Flush(reply) => {
                    let _ = reply.send(sink.flush().await);
                }
                TrailCommand::Shutdown => {
                    if let Err(e) = sink.flush().await {
                        tracing::warn!(error = %e, "Failed to flush audit sink on shutdown");
                    }
                    break;
                }
            }
        }

        tracing::debug!(sink = sink.name(), "Audit writer stopped");
    }

    /// Queues an entry after redacting its details.
    pub fn record(&self, mut entry: AuditLogEntry) {
        entry.details = entry.details.take().map(redact_details);
        let (entry_id, event) = (entry.id, entry.event);
        self.counters.recorded.fetch_add(1, Ordering::Relaxed);

        if let Err(err) = self.sender.try_send(TrailCommand::Record(entry)) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            let reason = match err {
                TrySendError::Full(_) => "audit queue full",
                TrySendError::Closed(_) => "audit writer stopped",
            };
            tracing::warn!(event = %event, reason, "Dropped audit entry");
            let _ = self.errors.send(AuditWriteFailure {
                entry_id,
                event,
                message: reason.to_string(),
            });
        }
    }

    /// Waits until every entry recorded so far has reached the sink.
    pub async fn flush(&self) -> AuditResult<()> {
        let (reply, done) = oneshot::channel();
        self.sender
            .send(TrailCommand::Flush(reply))
            .await
            .map_err(|_| AuditError::ChannelClosed)?;
        done.await.map_err(|_| AuditError::ChannelClosed)?
    }

    /// Queries the sink after flushing pending writes.
    pub async fn query_logs(&self, filter: &AuditFilter) -> AuditResult<Vec<AuditLogEntry>> {
        self.flush().await?;
        self.sink.query(filter).await
    }

    /// Applies the sink's retention window.
    pub async fn cleanup_old_logs(&self) -> AuditResult<usize> {
        let removed = self.sink.cleanup().await?;
        if removed > 0 {
            tracing::info!(removed, "Removed expired audit log files");
        }
        Ok(removed)
    }

    /// Subscribes to write failures.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<AuditWriteFailure> {
        self.errors.subscribe()
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> TrailStats {
        TrailStats {
            recorded: self.counters.recorded.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Returns the sink name.
    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    /// Flushes pending entries and stops the writer.
    ///
    /// Entries recorded afterwards are dropped and reported on the error channel.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(TrailCommand::Shutdown).await;
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Audit writer task failed");
            }
        }
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("sink", &self.sink.name())
            .field("stats", &self.stats())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
