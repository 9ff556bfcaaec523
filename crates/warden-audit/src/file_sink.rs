// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! File-based audit sink with daily files, size rollover and retention.
//!
//! Layout of the audit directory:
//!
//! ```text
//! audit-2025-03-01.log                 active file for the day
//! audit-2025-03-01.1740830400123.log   rolled over when the active file filled up
//! audit-2025-02-28.log
//! ```
//!
//! Files sort by name in write order, so walking them in order replays the
//! hash chain. [`FileAuditSink::verify_chain`] does exactly that.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;

use crate::chain::{chain_tail, verify_chain, ChainBreak, ChainBreakKind, ChainVerification};
use crate::error::{AuditError, AuditResult};
use crate::types::{AuditFilter, AuditLogEntry};
use crate::AuditSink;

const FILE_PREFIX: &str = "audit-";
const FILE_EXTENSION: &str = "log";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the file sink.
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Directory holding the day files.
    pub directory: PathBuf,
    /// Size at which the active file is rolled over, in bytes.
    pub max_file_size: u64,
    /// Day files older than this many days are deleted by cleanup.
    pub retention_days: u32,
}

impl FileSinkConfig {
    /// Creates a config with default limits (10 MiB, 90 days).
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_file_size: 10 * 1024 * 1024,
            retention_days: 90,
        }
    }

    /// Sets the rollover size.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Sets the retention window.
    pub fn retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }
}

// =============================================================================
// File Audit Sink
// =============================================================================

/// The file currently receiving writes.
struct ActiveFile {
    date: NaiveDate,
    path: PathBuf,
    writer: BufWriter<File>,
    size: u64,
}

/// JSON-lines audit sink writing one file per calendar day (UTC).
pub struct FileAuditSink {
    config: FileSinkConfig,
    active: Mutex<Option<ActiveFile>>,
    total_bytes_written: AtomicU64,
    total_entries_written: AtomicU64,
    rollovers: AtomicU64,
}

impl FileAuditSink {
    /// Creates a sink, creating the directory if needed.
    pub fn new(config: FileSinkConfig) -> AuditResult<Self> {
        if config.max_file_size == 0 {
            return Err(AuditError::configuration("max_file_size must be greater than zero"));
        }

        fs::create_dir_all(&config.directory).map_err(|e| {
            AuditError::write_failed_with(
                format!("Failed to create audit directory {}", config.directory.display()),
                e,
            )
        })?;

        Ok(Self {
            config,
            active: Mutex::new(None),
            total_bytes_written: AtomicU64::new(0),
            total_entries_written: AtomicU64::new(0),
            rollovers: AtomicU64::new(0),
        })
    }

    /// Returns the sink configuration.
    pub fn config(&self) -> &FileSinkConfig {
        &self.config
    }

    /// Returns the path of the day file for `date`.
    pub fn day_file_path(&self, date: NaiveDate) -> PathBuf {
        self.config
            .directory
            .join(format!("{}{}.{}", FILE_PREFIX, date.format("%Y-%m-%d"), FILE_EXTENSION))
    }

    fn rolled_file_path(&self, date: NaiveDate, now: DateTime<Utc>) -> PathBuf {
        let mut stamp = now.timestamp_millis();
        loop {
            let path = self.config.directory.join(format!(
                "{}{}.{}.{}",
                FILE_PREFIX,
                date.format("%Y-%m-%d"),
                stamp,
                FILE_EXTENSION
            ));
            if !path.exists() {
                return path;
            }
            stamp += 1;
        }
    }

    fn open_file(path: &Path) -> AuditResult<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AuditError::write_failed_with(format!("Failed to open {}", path.display()), e))
    }

    fn open_day(&self, date: NaiveDate) -> AuditResult<ActiveFile> {
        let path = self.day_file_path(date);
        let file = Self::open_file(&path)?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(ActiveFile {
            date,
            path,
            writer: BufWriter::new(file),
            size,
        })
    }

    /// Moves the full active file aside and opens a fresh one for the same day.
    fn roll_over(&self, active: &mut ActiveFile) -> AuditResult<()> {
        active.writer.flush()?;

        let rolled = self.rolled_file_path(active.date, Utc::now());
        fs::rename(&active.path, &rolled).map_err(|e| {
            AuditError::rotation_failed_at(format!("Failed to rename active file: {}", e), &rolled)
        })?;

        let file = Self::open_file(&active.path)?;
        active.writer = BufWriter::new(file);
        active.size = 0;
        self.rollovers.fetch_add(1, Ordering::Relaxed);

        tracing::info!(rolled = %rolled.display(), "Rolled over audit log file (size limit)");
        Ok(())
    }

    fn write_line(&self, date: NaiveDate, line: &str) -> AuditResult<()> {
        let mut guard = self.active.lock();

        let needs_open = guard.as_ref().map_or(true, |active| active.date != date);
        if needs_open {
            if let Some(mut previous) = guard.take() {
                previous.writer.flush()?;
            }
            *guard = Some(self.open_day(date)?);
        }

        let active = guard
            .as_mut()
            .ok_or_else(|| AuditError::write_failed("No active audit file"))?;

        if active.size > 0 && active.size >= self.config.max_file_size {
            self.roll_over(active)?;
        }

        writeln!(active.writer, "{}", line)?;
        active.writer.flush()?;

        let written = line.len() as u64 + 1;
        active.size += written;
        self.total_bytes_written.fetch_add(written, Ordering::Relaxed);
        self.total_entries_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Lists audit files in the directory with the day each belongs to.
    fn audit_files(&self) -> AuditResult<Vec<(NaiveDate, PathBuf)>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.config.directory)? {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(_) => continue,
            };
            if let Some(date) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_file_date)
            {
                files.push((date, path));
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_file(path: &Path, filter: &AuditFilter, out: &mut Vec<AuditLogEntry>) -> AuditResult<()> {
        let file = File::open(path)?;
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditLogEntry>(&line) {
                Ok(entry) if filter.matches(&entry) => out.push(entry),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping malformed audit record"
                    );
                }
            }
        }
        Ok(())
    }

    /// Walks every record on disk in write order and checks the hash chain.
    ///
    /// Editing, deleting or inserting a line breaks the chain. Losing whole
    /// files from the oldest end does not, since retention does the same.
    pub fn verify_chain(&self) -> AuditResult<ChainVerification> {
        self.flush_active()?;

        let mut entries = Vec::new();
        let mut locations = Vec::new();
        for (_, path) in self.audit_files()? {
            let file = File::open(&path)?;
            for (index, line) in BufReader::new(file).lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let location = format!("{}:{}", path.display(), index + 1);
                match serde_json::from_str::<AuditLogEntry>(&line) {
                    Ok(entry) => {
                        entries.push(entry);
                        locations.push(location);
                    }
                    Err(_) => {
                        return Ok(ChainVerification::broken(
                            entries.len() + 1,
                            ChainBreak {
                                position: entries.len(),
                                entry_id: None,
                                kind: ChainBreakKind::Malformed,
                                location: Some(location),
                            },
                        ));
                    }
                }
            }
        }

        let mut result = verify_chain(&entries);
        if let Some(broken) = result.first_break.as_mut() {
            broken.location = locations.get(broken.position).cloned();
        }
        Ok(result)
    }

    /// Finds the newest sealed entry in the two most recent days.
    ///
    /// Two days, because an entry stamped just before midnight can be written
    /// after the first entry of the next day.
    fn newest_hash(&self) -> AuditResult<Option<String>> {
        let files = self.audit_files()?;
        let mut days: Vec<NaiveDate> = files.iter().map(|(date, _)| *date).collect();
        days.dedup();
        let Some(&oldest) = days.iter().rev().take(2).last() else {
            return Ok(None);
        };

        let mut recent = Vec::new();
        for (_, path) in files.iter().filter(|(date, _)| *date >= oldest) {
            Self::read_file(path, &AuditFilter::new(), &mut recent)?;
        }
        Ok(chain_tail(&recent))
    }

    fn flush_active(&self) -> AuditResult<()> {
        if let Some(active) = self.active.lock().as_mut() {
            active.writer.flush()?;
        }
        Ok(())
    }

    /// Deletes day files dated before `today - retention_days`.
    pub fn cleanup_before(&self, today: NaiveDate) -> AuditResult<usize> {
        let cutoff = today - Duration::days(i64::from(self.config.retention_days));
        let active_path = self.active.lock().as_ref().map(|a| a.path.clone());

        let mut removed = 0;
        for (date, path) in self.audit_files()? {
            if date >= cutoff || Some(&path) == active_path.as_ref() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    removed += 1;
                    tracing::debug!(path = %path.display(), "Removed expired audit log file");
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to remove expired audit log file"
                    );
                }
            }
        }
        Ok(removed)
    }

    /// Returns the total bytes written.
    pub fn total_bytes_written(&self) -> u64 {
        self.total_bytes_written.load(Ordering::Relaxed)
    }

    /// Returns the total entries written.
    pub fn total_entries_written(&self) -> u64 {
        self.total_entries_written.load(Ordering::Relaxed)
    }

    /// Returns how many size rollovers happened.
    pub fn rollovers(&self) -> u64 {
        self.rollovers.load(Ordering::Relaxed)
    }
}

/// Extracts the day from `audit-YYYY-MM-DD.log` or `audit-YYYY-MM-DD.<stamp>.log`.
fn parse_file_date(name: &str) -> Option<NaiveDate> {
    let rest = name.strip_prefix(FILE_PREFIX)?;
    let rest = rest.strip_suffix(FILE_EXTENSION)?.strip_suffix('.')?;
    let day = rest.get(..10)?;
    let tail = &rest[10..];
    let valid_tail = tail.is_empty()
        || tail.strip_prefix('.').is_some_and(|stamp| {
            !stamp.is_empty() && stamp.chars().all(|c| c.is_ascii_digit())
        });
    if !valid_tail {
        return None;
    }
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn write(&self, entry: &AuditLogEntry) -> AuditResult<()> {
        let line = serde_json::to_string(entry)?;
        self.write_line(entry.timestamp.date_naive(), &line)
    }

    async fn query(&self, filter: &AuditFilter) -> AuditResult<Vec<AuditLogEntry>> {
        self.flush().await?;

        let start_day = filter.start.map(|t| t.date_naive());
        let end_day = filter.end.map(|t| t.date_naive());

        let mut matches = Vec::new();
        for (date, path) in self.audit_files()? {
            if start_day.is_some_and(|d| date < d) || end_day.is_some_and(|d| date > d) {
                continue;
            }
            Self::read_file(&path, filter, &mut matches)
                .map_err(|e| AuditError::query_failed(format!("{}: {}", path.display(), e)))?;
        }

        Ok(filter.finish(matches))
    }

    async fn flush(&self) -> AuditResult<()> {
        self.flush_active()
    }

    async fn chain_head(&self) -> AuditResult<Option<String>> {
        self.newest_hash()
    }

    async fn cleanup(&self) -> AuditResult<usize> {
        self.cleanup_before(Utc::now().date_naive())
    }

    fn name(&self) -> &str {
        "file"
    }
}

impl std::fmt::Debug for FileAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAuditSink")
            .field("directory", &self.config.directory)
            .field("max_file_size", &self.config.max_file_size)
            .field("retention_days", &self.config.retention_days)
            .field("total_entries_written", &self.total_entries_written())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trail::AuditTrail;
    use crate::types::{AuditEvent, AuditOutcome};
    use chrono::TimeZone;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn entry_at(ts: DateTime<Utc>, user: &str) -> AuditLogEntry {
        AuditLogEntry::success(AuditEvent::AccessDecision)
            .with_user(user, user)
            .with_target("/ai", "execute")
            .at(ts)
    }

    #[test]
    fn test_parse_file_date() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(parse_file_date("audit-2025-03-01.log"), Some(day));
        assert_eq!(parse_file_date("audit-2025-03-01.1740830400123.log"), Some(day));
        assert_eq!(parse_file_date("audit-2025-03-01.bak.log"), None);
        assert_eq!(parse_file_date("other-2025-03-01.log"), None);
        assert_eq!(parse_file_date("audit-2025-13-01.log"), None);
    }

    #[tokio::test]
    async fn test_writes_one_file_per_day() {
        let dir = tempdir().unwrap();
        let sink = FileAuditSink::new(FileSinkConfig::new(dir.path())).unwrap();

        let day1 = Utc.with_ymd_and_hms(2025, 3, 1, 23, 59, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2025, 3, 2, 0, 1, 0).unwrap();
        sink.write(&entry_at(day1, "u-1")).await.unwrap();
        sink.write(&entry_at(day2, "u-2")).await.unwrap();

        let first = fs::read_to_string(dir.path().join("audit-2025-03-01.log")).unwrap();
        let second = fs::read_to_string(dir.path().join("audit-2025-03-02.log")).unwrap();
        assert_eq!(first.lines().count(), 1);
        assert!(second.contains("\"user_id\":\"u-2\""));
        assert_eq!(sink.total_entries_written(), 2);
    }

    #[tokio::test]
    async fn test_size_rollover_keeps_all_entries() {
        let dir = tempdir().unwrap();
        let sink = FileAuditSink::new(FileSinkConfig::new(dir.path()).max_file_size(200)).unwrap();

        let now = Utc::now();
        for i in 0..6 {
            sink.write(&entry_at(now, &format!("u-{}", i))).await.unwrap();
        }

        assert!(sink.rollovers() > 0);
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert!(files.len() > 1);

        let all = sink.query(&AuditFilter::new()).await.unwrap();
        assert_eq!(all.len(), 6);
    }

    #[tokio::test]
    async fn test_query_filters_newest_first() {
        let dir = tempdir().unwrap();
        let sink = FileAuditSink::new(FileSinkConfig::new(dir.path())).unwrap();

        let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        sink.write(&entry_at(base, "u-1")).await.unwrap();
        sink.write(&entry_at(base + Duration::hours(1), "u-2")).await.unwrap();
        sink.write(&entry_at(base + Duration::days(1), "u-1")).await.unwrap();
        sink.write(
            &AuditLogEntry::failure(AuditEvent::LoginFailure, "bad password")
                .with_username("u-1")
                .at(base + Duration::days(2)),
        )
        .await
        .unwrap();

        let user1 = sink.query(&AuditFilter::new().user("u-1")).await.unwrap();
        assert_eq!(user1.len(), 2);
        assert!(user1[0].timestamp > user1[1].timestamp);

        let failures = sink
            .query(&AuditFilter::new().result(AuditOutcome::Failure))
            .await
            .unwrap();
        assert_eq!(failures.len(), 1);

        let first_day = sink
            .query(&AuditFilter::new().time_range(base, base + Duration::hours(2)))
            .await
            .unwrap();
        assert_eq!(first_day.len(), 2);
    }

    #[tokio::test]
    async fn test_query_skips_malformed_lines() {
        let dir = tempdir().unwrap();
        let sink = FileAuditSink::new(FileSinkConfig::new(dir.path())).unwrap();

        let now = Utc::now();
        sink.write(&entry_at(now, "u-1")).await.unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(sink.day_file_path(now.date_naive()))
            .unwrap();
        writeln!(file, "not json").unwrap();

        let all = sink.query(&AuditFilter::new()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_day_files() {
        let dir = tempdir().unwrap();
        let sink = FileAuditSink::new(FileSinkConfig::new(dir.path()).retention_days(30)).unwrap();

        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        fs::write(dir.path().join("audit-2025-04-01.log"), "").unwrap();
        fs::write(dir.path().join("audit-2025-04-01.1743465600000.log"), "").unwrap();
        fs::write(dir.path().join("audit-2025-05-20.log"), "").unwrap();
        fs::write(dir.path().join("unrelated.txt"), "").unwrap();

        let removed = sink.cleanup_before(today).unwrap();
        assert_eq!(removed, 2);
        assert!(dir.path().join("audit-2025-05-20.log").exists());
        assert!(dir.path().join("unrelated.txt").exists());
    }

    async fn record_all(sink: &Arc<FileAuditSink>, users: &[&str]) {
        let trail = AuditTrail::new(sink.clone());
        for user in users {
            trail.record(entry_at(Utc::now(), user));
        }
        trail.shutdown().await;
    }

    #[tokio::test]
    async fn test_verify_chain_intact() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(FileAuditSink::new(FileSinkConfig::new(dir.path())).unwrap());

        record_all(&sink, &["u-0", "u-1", "u-2"]).await;

        let result = sink.verify_chain().unwrap();
        assert!(result.is_intact(), "{:?}", result.first_break);
        assert_eq!(result.entries, 3);
    }

    #[tokio::test]
    async fn test_verify_chain_detects_edited_line() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(FileAuditSink::new(FileSinkConfig::new(dir.path())).unwrap());
        record_all(&sink, &["u-0", "u-1", "u-2"]).await;

        let path = sink.day_file_path(Utc::now().date_naive());
        let content = fs::read_to_string(&path).unwrap();
        let edited: Vec<String> = content
            .lines()
            .enumerate()
            .map(|(i, line)| if i == 1 { line.replace("u-1", "u-9") } else { line.to_string() })
            .collect();
        fs::write(&path, edited.join("\n") + "\n").unwrap();

        let reopened = FileAuditSink::new(FileSinkConfig::new(dir.path())).unwrap();
        let broken = reopened.verify_chain().unwrap().first_break.unwrap();
        assert_eq!(broken.kind, ChainBreakKind::Altered);
        assert_eq!(broken.position, 1);
        assert!(broken.location.unwrap().ends_with(":2"));
    }

    #[tokio::test]
    async fn test_verify_chain_detects_deleted_line() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(FileAuditSink::new(FileSinkConfig::new(dir.path())).unwrap());
        record_all(&sink, &["u-0", "u-1", "u-2"]).await;

        let path = sink.day_file_path(Utc::now().date_naive());
        let content = fs::read_to_string(&path).unwrap();
        let kept: Vec<&str> = content.lines().enumerate().filter(|(i, _)| *i != 1).map(|(_, l)| l).collect();
        fs::write(&path, kept.join("\n") + "\n").unwrap();

        let broken = sink.verify_chain().unwrap().first_break.unwrap();
        assert_eq!(broken.kind, ChainBreakKind::Unlinked);
    }

    #[tokio::test]
    async fn test_verify_chain_reports_malformed_line() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(FileAuditSink::new(FileSinkConfig::new(dir.path())).unwrap());
        record_all(&sink, &["u-0"]).await;

        let mut file = OpenOptions::new()
            .append(true)
            .open(sink.day_file_path(Utc::now().date_naive()))
            .unwrap();
        writeln!(file, "not json").unwrap();

        let broken = sink.verify_chain().unwrap().first_break.unwrap();
        assert_eq!(broken.kind, ChainBreakKind::Malformed);
        assert_eq!(broken.entry_id, None);
    }

    #[tokio::test]
    async fn test_chain_spans_rollover_and_restart() {
        let dir = tempdir().unwrap();
        let config = FileSinkConfig::new(dir.path()).max_file_size(600);

        let sink = Arc::new(FileAuditSink::new(config.clone()).unwrap());
        record_all(&sink, &["u-0", "u-1", "u-2", "u-3"]).await;
        assert!(sink.rollovers() > 0);
        let head = sink.chain_head().await.unwrap().unwrap();

        let restarted = Arc::new(FileAuditSink::new(config).unwrap());
        assert_eq!(restarted.chain_head().await.unwrap(), Some(head.clone()));
        record_all(&restarted, &["u-4"]).await;

        let newest = restarted.query(&AuditFilter::new().limit(1)).await.unwrap();
        assert_eq!(newest[0].previous_hash, head);

        let result = restarted.verify_chain().unwrap();
        assert!(result.is_intact(), "{:?}", result.first_break);
        assert_eq!(result.entries, 5);
    }

    #[test]
    fn test_zero_size_rejected() {
        let dir = tempdir().unwrap();
        let result = FileAuditSink::new(FileSinkConfig::new(dir.path()).max_file_size(0));
        assert!(matches!(result, Err(AuditError::Configuration { .. })));
    }
}
