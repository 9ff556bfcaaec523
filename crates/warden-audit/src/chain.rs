// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Verification of the hash chain linking sealed audit entries.
//!
//! Each entry stores the hash of the entry written before it. A chain is
//! intact when every entry re-hashes to its stored hash and every link points
//! at another entry of the chain, except the first one. The first link is not
//! checked, because retention deletes the oldest files.

use std::collections::{HashMap, HashSet};
use std::fmt;

use uuid::Uuid;

use crate::types::AuditLogEntry;

/// Why verification stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainBreakKind {
    /// The record could not be parsed.
    Malformed,
    /// The entry carries no hash.
    Unsealed,
    /// The contents no longer match the stored hash.
    Altered,
    /// The entry links to a hash no entry carries.
    Unlinked,
    /// Two entries claim the same predecessor.
    Forked,
}

impl fmt::Display for ChainBreakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Malformed => "malformed record",
            Self::Unsealed => "entry is not sealed",
            Self::Altered => "entry contents do not match its hash",
            Self::Unlinked => "entry links to a missing predecessor",
            Self::Forked => "predecessor is claimed twice",
        })
    }
}

/// The first problem found in a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    /// Zero-based position of the offending record in the walk.
    pub position: usize,
    /// ID of the offending entry, when it could be read.
    pub entry_id: Option<Uuid>,
    /// What is wrong.
    pub kind: ChainBreakKind,
    /// Where the record lives, such as `audit-2025-03-01.log:12`.
    pub location: Option<String>,
}

impl fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at record {}", self.kind, self.position)?;
        if let Some(location) = &self.location {
            write!(f, " ({})", location)?;
        }
        if let Some(id) = self.entry_id {
            write!(f, " [{}]", id)?;
        }
        Ok(())
    }
}

/// Outcome of walking a chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainVerification {
    /// Records examined.
    pub entries: usize,
    /// First problem found, if any.
    pub first_break: Option<ChainBreak>,
}

impl ChainVerification {
    /// Returns `true` if no problem was found.
    pub fn is_intact(&self) -> bool {
        self.first_break.is_none()
    }

    pub(crate) fn broken(entries: usize, first_break: ChainBreak) -> Self {
        Self {
            entries,
            first_break: Some(first_break),
        }
    }
}

/// Verifies entries given in write order.
///
/// Links are resolved by hash rather than by position, so an entry written to
/// the previous day's file just after midnight does not count as a break.
pub fn verify_chain<'a, I>(entries: I) -> ChainVerification
where
    I: IntoIterator<Item = &'a AuditLogEntry>,
{
    let entries: Vec<&AuditLogEntry> = entries.into_iter().collect();
    let total = entries.len();
    let at = |position: usize, kind: ChainBreakKind| {
        ChainVerification::broken(
            total,
            ChainBreak {
                position,
                entry_id: Some(entries[position].id),
                kind,
                location: None,
            },
        )
    };

    for (position, entry) in entries.iter().enumerate() {
        if !entry.is_sealed() {
            return at(position, ChainBreakKind::Unsealed);
        }
        if !entry.verify() {
            return at(position, ChainBreakKind::Altered);
        }
    }

    let hashes: HashSet<&str> = entries.iter().map(|e| e.hash.as_str()).collect();
    let mut claimed: HashMap<&str, usize> = HashMap::with_capacity(total);
    let mut head_seen = false;

    for (position, entry) in entries.iter().enumerate() {
        if claimed.insert(entry.previous_hash.as_str(), position).is_some() {
            return at(position, ChainBreakKind::Forked);
        }
        if !hashes.contains(entry.previous_hash.as_str()) {
            if head_seen {
                return at(position, ChainBreakKind::Unlinked);
            }
            head_seen = true;
        }
    }

    ChainVerification {
        entries: total,
        first_break: None,
    }
}

/// Returns the hash of the newest entry, the one no other entry links to.
///
/// Falls back to the last sealed entry when the links are inconsistent.
pub fn chain_tail<'a, I>(entries: I) -> Option<String>
where
    I: IntoIterator<Item = &'a AuditLogEntry>,
{
    let sealed: Vec<&AuditLogEntry> = entries.into_iter().filter(|e| e.is_sealed()).collect();
    let linked: HashSet<&str> = sealed.iter().map(|e| e.previous_hash.as_str()).collect();

    sealed
        .iter()
        .rev()
        .find(|e| !linked.contains(e.hash.as_str()))
        .or_else(|| sealed.last())
        .map(|e| e.hash.clone())
}

// =============================================================================
// Tests
// =============================================================================
