// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Login attempt limiting with a sliding window and lockout.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::LockoutConfig;
use crate::error::StoreResult;
use crate::store::Store;

// =============================================================================
// RateLimitTracker
// =============================================================================

/// Attempt counter for one identifier.
///
/// Created on the first attempt and deleted on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitTracker {
    /// Attempts in the current window.
    pub attempts: u32,
    /// Time of the latest attempt.
    pub last_attempt: DateTime<Utc>,
    /// End of the active lockout, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
}

impl RateLimitTracker {
    fn first(now: DateTime<Utc>) -> Self {
        Self {
            attempts: 1,
            last_attempt: now,
            locked_until: None,
        }
    }

    /// Returns `true` if a lockout is active at `now`.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    /// The attempt may proceed.
    Allowed {
        /// Attempts counted in the window, this one included.
        attempts: u32,
    },
    /// The identifier is locked out.
    Limited {
        /// Time until the lockout ends.
        retry_after: Duration,
        /// `true` if this attempt started the lockout.
        newly_locked: bool,
    },
}

impl RateLimitResult {
    /// Returns `true` if the attempt may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }
}

// =============================================================================
// LoginRateLimiter
// =============================================================================

/// Per-identifier login limiter.
///
/// Every attempt counts, successful or not, until [`LoginRateLimiter::reset`]
/// clears the tracker. Exceeding `max_attempts` within `window` locks the
/// identifier for `lockout_duration`.
pub struct LoginRateLimiter {
    config: LockoutConfig,
    trackers: Arc<dyn Store<RateLimitTracker>>,
    // Serializes read-modify-write on the tracker table.
    update: Mutex<()>,
}

impl LoginRateLimiter {
    /// Creates a limiter over `trackers`.
    pub fn new(config: LockoutConfig, trackers: Arc<dyn Store<RateLimitTracker>>) -> Self {
        Self {
            config,
            trackers,
            update: Mutex::new(()),
        }
    }

    /// Counts an attempt for `id` and decides whether it may proceed.
    pub fn check(&self, id: &str) -> StoreResult<RateLimitResult> {
        self.check_at(id, Utc::now())
    }

    /// Counts an attempt for `id` at `now`.
    pub fn check_at(&self, id: &str, now: DateTime<Utc>) -> StoreResult<RateLimitResult> {
        let _guard = self.update.lock();

        let Some(mut tracker) = self.trackers.get(id)? else {
            self.trackers.set(id, RateLimitTracker::first(now))?;
            return Ok(RateLimitResult::Allowed { attempts: 1 });
        };

        if let Some(until) = tracker.locked_until.filter(|until| *until > now) {
            return Ok(RateLimitResult::Limited {
                retry_after: remaining(until, now),
                newly_locked: false,
            });
        }

        // An expired lockout starts a new window.
        if tracker.locked_until.is_some() || now - tracker.last_attempt > chrono_duration(self.config.window) {
            tracker = RateLimitTracker::first(now);
            self.trackers.set(id, tracker)?;
            return Ok(RateLimitResult::Allowed { attempts: 1 });
        }

        tracker.attempts = tracker.attempts.saturating_add(1);
        tracker.last_attempt = now;

        if tracker.attempts > self.config.max_attempts {
            let until = now + chrono_duration(self.config.lockout_duration);
            tracker.locked_until = Some(until);
            self.trackers.set(id, tracker)?;

            tracing::warn!(identifier = %id, locked_until = %until, "Identifier locked out");
            return Ok(RateLimitResult::Limited {
                retry_after: self.config.lockout_duration,
                newly_locked: true,
            });
        }

        let attempts = tracker.attempts;
        self.trackers.set(id, tracker)?;
        Ok(RateLimitResult::Allowed { attempts })
    }

    /// Forgets all attempts for `id`.
    pub fn reset(&self, id: &str) -> StoreResult<()> {
        let _guard = self.update.lock();
        self.trackers.delete(id)?;
        Ok(())
    }

    /// Returns the attempts counted for `id`.
    pub fn attempts(&self, id: &str) -> StoreResult<u32> {
        Ok(self.trackers.get(id)?.map_or(0, |t| t.attempts))
    }

    /// Returns `true` if `id` is locked out now.
    pub fn is_locked(&self, id: &str) -> StoreResult<bool> {
        let now = Utc::now();
        Ok(self.trackers.get(id)?.is_some_and(|t| t.is_locked_at(now)))
    }

    /// Deletes trackers that are neither locked nor inside their window.
    pub fn sweep_expired(&self) -> StoreResult<usize> {
        self.sweep_expired_at(Utc::now())
    }

    /// Deletes trackers idle as of `now`.
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let _guard = self.update.lock();
        let window = chrono_duration(self.config.window);

        let mut removed = 0;
        for (id, tracker) in self.trackers.list()? {
            if !tracker.is_locked_at(now) && now - tracker.last_attempt > window && self.trackers.delete(&id)? {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "Swept idle rate-limit trackers");
        }
        Ok(removed)
    }

    /// Removes all trackers.
    pub fn clear(&self) -> StoreResult<()> {
        let _guard = self.update.lock();
        self.trackers.clear()
    }
}

impl std::fmt::Debug for LoginRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

fn remaining(until: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (until - now).to_std().unwrap_or(Duration::ZERO)
}

// =============================================================================
// Tests
// =============================================================================
