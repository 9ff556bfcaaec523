// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Custom Test Assertions
//!
//! Assertion helpers with failure messages that name the decision or entry
//! under test.

use warden_audit::{AuditEvent, AuditLogEntry, AuditOutcome};
use warden_auth::AccessDecision;

// =============================================================================
// Decision Assertions
// =============================================================================

/// Assertion extensions for [`AccessDecision`].
pub trait DecisionAssertions {
    /// Assert that access was granted.
    fn assert_allowed(&self);

    /// Assert that access was refused.
    fn assert_denied(&self);

    /// Assert the decision's reason.
    fn assert_reason(&self, expected: &str);
}

impl DecisionAssertions for AccessDecision {
    fn assert_allowed(&self) {
        assert!(
            self.allowed,
            "Expected {} on {} to be allowed, denied with: {}",
            self.action, self.resource, self.reason
        );
    }

    fn assert_denied(&self) {
        assert!(
            !self.allowed,
            "Expected {} on {} to be denied, allowed with: {}",
            self.action, self.resource, self.reason
        );
    }

    fn assert_reason(&self, expected: &str) {
        assert_eq!(
            self.reason, expected,
            "Unexpected reason for {} on {}",
            self.action, self.resource
        );
    }
}

// =============================================================================
// Audit Assertions
// =============================================================================

/// Assertion extensions for a batch of audit entries.
pub trait AuditAssertions {
    /// Assert that exactly `count` entries have `event`.
    fn assert_event_count(&self, event: AuditEvent, count: usize);

    /// Returns the first entry with `event`, panicking if none.
    fn expect_event(&self, event: AuditEvent) -> &AuditLogEntry;

    /// Assert that some `event` entry failed with `message`.
    fn assert_failure_reason(&self, event: AuditEvent, message: &str);
}

impl AuditAssertions for [AuditLogEntry] {
    fn assert_event_count(&self, event: AuditEvent, count: usize) {
        let actual = self.iter().filter(|e| e.event == event).count();
        assert_eq!(actual, count, "Expected {} {} entries, found {}", count, event, actual);
    }

    fn expect_event(&self, event: AuditEvent) -> &AuditLogEntry {
        self.iter()
            .find(|e| e.event == event)
            .unwrap_or_else(|| panic!("No {} entry among {} entries", event, self.len()))
    }

    fn assert_failure_reason(&self, event: AuditEvent, message: &str) {
        let found = self.iter().any(|e| {
            e.event == event && e.result == AuditOutcome::Failure && e.error_message.as_deref() == Some(message)
        });
        assert!(found, "No failed {} entry with reason {:?}", event, message);
    }
}
