// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core audit entry types.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// =============================================================================
// Audit Log Entry
// =============================================================================

/// A single audit trail entry.
///
/// Entries are immutable once handed to the trail. The serialized form is one
/// JSON object per line, and optional fields are omitted when absent.
///
/// The trail's writer seals each entry before it reaches the sink: `hash` is a
/// SHA-256 over every other field and `previous_hash` links it to the entry
/// written before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Unique entry ID.
    pub id: Uuid,

    /// When the event occurred.
    pub timestamp: DateTime<Utc>,

    /// What happened.
    pub event: AuditEvent,

    /// Subject user ID, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Subject username, when known or submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Client network address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// Client user agent or tool identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Resource path the decision concerned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Action the decision concerned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Outcome of the event.
    pub result: AuditOutcome,

    /// Sanitized detail object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Error message recorded for operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Hash of the entry written before this one. Empty at the start of a chain.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub previous_hash: String,

    /// Hash of this entry. Empty until sealed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
}

impl AuditLogEntry {
    /// Creates a new entry stamped with the current time.
    pub fn new(event: AuditEvent, result: AuditOutcome) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event,
            user_id: None,
            username: None,
            ip_address: None,
            user_agent: None,
            resource: None,
            action: None,
            result,
            details: None,
            error_message: None,
            previous_hash: String::new(),
            hash: String::new(),
        }
    }

    /// Creates a success entry.
    pub fn success(event: AuditEvent) -> Self {
        Self::new(event, AuditOutcome::Success)
    }

    /// Creates a failure entry carrying an operator-facing reason.
    pub fn failure(event: AuditEvent, error_message: impl Into<String>) -> Self {
        Self::new(event, AuditOutcome::Failure).with_error(error_message)
    }

    /// Sets the subject user.
    pub fn with_user(mut self, user_id: impl Into<String>, username: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.username = Some(username.into());
        self
    }

    /// Sets only the username, for attempts where no user was resolved.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Copies client metadata onto the entry.
    pub fn with_client(mut self, client: Option<&ClientMeta>) -> Self {
        if let Some(client) = client {
            self.ip_address = client.ip_address.clone();
            self.user_agent = client.user_agent.clone();
        }
        self
    }

    /// Sets the resource and action of an access decision.
    pub fn with_target(mut self, resource: impl Into<String>, action: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self.action = Some(action.into());
        self
    }

    /// Sets the detail object.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Sets the error message.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Overrides the timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns `true` if the entry records a success.
    pub fn is_success(&self) -> bool {
        self.result == AuditOutcome::Success
    }

    /// Links the entry to `previous_hash` and stores its own hash.
    pub fn seal(&mut self, previous_hash: &str) {
        self.previous_hash = previous_hash.to_string();
        self.hash = self.compute_hash();
    }

    /// Returns `true` once the entry carries a hash.
    pub fn is_sealed(&self) -> bool {
        !self.hash.is_empty()
    }

    /// Returns `true` if the stored hash matches the entry's contents.
    pub fn verify(&self) -> bool {
        self.is_sealed() && self.hash == self.compute_hash()
    }

    /// SHA-256 over every field except `hash`, as lowercase hex.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        let optional = |hasher: &mut Sha256, value: Option<&str>| match value {
            Some(v) => {
                hasher.update([1u8]);
                hasher.update((v.len() as u64).to_be_bytes());
                hasher.update(v.as_bytes());
            }
            None => hasher.update([0u8]),
        };

        hasher.update(self.id.as_bytes());
        hasher.update(
            self.timestamp
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .as_bytes(),
        );
        hasher.update(self.event.as_str().as_bytes());
        optional(&mut hasher, self.user_id.as_deref());
        optional(&mut hasher, self.username.as_deref());
        optional(&mut hasher, self.ip_address.as_deref());
        optional(&mut hasher, self.user_agent.as_deref());
        optional(&mut hasher, self.resource.as_deref());
        optional(&mut hasher, self.action.as_deref());
        hasher.update(self.result.to_string().as_bytes());
        let details = self.details.as_ref().map(serde_json::Value::to_string);
        optional(&mut hasher, details.as_deref());
        optional(&mut hasher, self.error_message.as_deref());
        optional(&mut hasher, Some(self.previous_hash.as_str()));

        format!("{:x}", hasher.finalize())
    }
}

// =============================================================================
// Client Metadata
// =============================================================================

/// Network and client metadata supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMeta {
    /// Client network address.
    pub ip_address: Option<String>,
    /// Client user agent or tool identifier.
    pub user_agent: Option<String>,
}

impl ClientMeta {
    /// Creates metadata with an IP address.
    pub fn ip(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: Some(ip_address.into()),
            user_agent: None,
        }
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

// =============================================================================
// Audit Event
// =============================================================================

/// Kind of audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    /// Credential verification succeeded and tokens were issued.
    LoginSuccess,
    /// Credential verification failed.
    LoginFailure,
    /// Authentication was refused by the lockout.
    AccountLocked,
    /// The user logged out.
    Logout,
    /// An access token was issued from a refresh token.
    TokenRefresh,
    /// A token was revoked.
    TokenRevoked,
    /// A user account was created.
    UserCreated,
    /// A user's roles were changed.
    RolesChanged,
    /// A password was changed.
    PasswordChanged,
    /// An MFA secret was issued.
    MfaSetup,
    /// MFA was enabled.
    MfaEnabled,
    /// MFA was disabled.
    MfaDisabled,
    /// An authorization decision.
    AccessDecision,
    /// A named permission check.
    PermissionCheck,
    /// A policy was added or removed.
    PolicyChanged,
    /// The signing key was rotated.
    KeyRotated,
}

impl AuditEvent {
    /// Returns the wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailure => "login_failure",
            Self::AccountLocked => "account_locked",
            Self::Logout => "logout",
            Self::TokenRefresh => "token_refresh",
            Self::TokenRevoked => "token_revoked",
            Self::UserCreated => "user_created",
            Self::RolesChanged => "roles_changed",
            Self::PasswordChanged => "password_changed",
            Self::MfaSetup => "mfa_setup",
            Self::MfaEnabled => "mfa_enabled",
            Self::MfaDisabled => "mfa_disabled",
            Self::AccessDecision => "access_decision",
            Self::PermissionCheck => "permission_check",
            Self::PolicyChanged => "policy_changed",
            Self::KeyRotated => "key_rotated",
        }
    }

    /// Parses a wire name.
    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Audit Outcome
// =============================================================================

/// Result recorded on an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// The operation succeeded or access was granted.
    Success,
    /// The operation failed or access was denied.
    Failure,
}

impl AuditOutcome {
    /// Maps a boolean decision to an outcome.
    pub fn from_allowed(allowed: bool) -> Self {
        if allowed {
            Self::Success
        } else {
            Self::Failure
        }
    }

    /// Parses `success` or `failure`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failure => f.write_str("failure"),
        }
    }
}

// =============================================================================
// Audit Filter
// =============================================================================

/// Filter for querying audit entries. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Inclusive lower time bound.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper time bound.
    pub end: Option<DateTime<Utc>>,
    /// Subject user ID.
    pub user_id: Option<String>,
    /// Event kind.
    pub event: Option<AuditEvent>,
    /// Outcome.
    pub result: Option<AuditOutcome>,
    /// Maximum number of entries to return.
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// Creates a new empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by time range.
    pub fn time_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Filters entries at or after `start`.
    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Filters entries at or before `end`.
    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    /// Filters by user ID.
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Filters by event kind.
    pub fn event(mut self, event: AuditEvent) -> Self {
        self.event = Some(event);
        self
    }

    /// Filters by outcome.
    pub fn result(mut self, result: AuditOutcome) -> Self {
        self.result = Some(result);
        self
    }

    /// Sets the limit.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Checks if an entry matches this filter.
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        if let Some(start) = self.start {
            if entry.timestamp < start {
                return false;
            }
        }

        if let Some(end) = self.end {
            if entry.timestamp > end {
                return false;
            }
        }

        if let Some(ref user_id) = self.user_id {
            if entry.user_id.as_ref() != Some(user_id) {
                return false;
            }
        }

        if let Some(event) = self.event {
            if entry.event != event {
                return false;
            }
        }

        if let Some(result) = self.result {
            if entry.result != result {
                return false;
            }
        }

        true
    }

    /// Sorts matches newest-first and applies the limit.
    pub fn finish(&self, mut entries: Vec<AuditLogEntry>) -> Vec<AuditLogEntry> {
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = self.limit {
            entries.truncate(limit);
        }
        entries
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_entry_wire_format_omits_absent_fields() {
        let entry = AuditLogEntry::success(AuditEvent::LoginSuccess).with_user("u-1", "admin");
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["event"], "login_success");
        assert_eq!(json["result"], "success");
        assert_eq!(json["user_id"], "u-1");
        assert!(json.get("ip_address").is_none());
        assert!(json.get("error_message").is_none());
        assert!(json.get("hash").is_none());
    }

    #[test]
    fn test_seal_links_and_verifies() {
        let mut first = AuditLogEntry::success(AuditEvent::LoginSuccess).with_user("u-1", "admin");
        assert!(!first.is_sealed());
        assert!(!first.verify());

        first.seal("");
        assert!(first.verify());
        assert_eq!(first.hash.len(), 64);

        let mut second = AuditLogEntry::success(AuditEvent::Logout).with_user("u-1", "admin");
        second.seal(&first.hash);
        assert_eq!(second.previous_hash, first.hash);
        assert!(second.verify());
        assert_ne!(first.hash, second.hash);
    }

    #[test]
    fn test_edited_entry_fails_verification() {
        let mut entry = AuditLogEntry::failure(AuditEvent::AccessDecision, "denied")
            .with_user("u-2", "dev")
            .with_target("/ai", "execute")
            .with_details(serde_json::json!({ "reason": "no policy" }));
        entry.seal("abc");

        let mut edited = entry.clone();
        edited.result = AuditOutcome::Success;
        assert!(!edited.verify());

        let mut relinked = entry.clone();
        relinked.previous_hash = "def".to_string();
        assert!(!relinked.verify());

        // A moved value is not the same entry.
        let mut shifted = entry.clone();
        shifted.username = None;
        shifted.user_id = Some("u-2dev".to_string());
        assert!(!shifted.verify());
    }

    #[test]
    fn test_sealed_entry_survives_wire_round_trip() {
        let mut entry = AuditLogEntry::success(AuditEvent::RolesChanged)
            .with_user("u-1", "admin")
            .with_details(serde_json::json!({ "to": ["developer"], "from": ["readonly"] }));
        entry.seal("");

        let line = serde_json::to_string(&entry).unwrap();
        let parsed: AuditLogEntry = serde_json::from_str(&line).unwrap();
        assert!(parsed.verify());
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_client_meta_copied() {
        let client = ClientMeta::ip("10.0.0.7").with_user_agent("warden-cli/0.1");
        let entry = AuditLogEntry::failure(AuditEvent::LoginFailure, "unknown user")
            .with_username("ghost")
            .with_client(Some(&client));

        assert_eq!(entry.ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(entry.user_agent.as_deref(), Some("warden-cli/0.1"));
        assert_eq!(entry.error_message.as_deref(), Some("unknown user"));
        assert!(!entry.is_success());
    }

    #[test]
    fn test_event_parse() {
        assert_eq!(AuditEvent::parse("access_decision"), Some(AuditEvent::AccessDecision));
        assert_eq!(AuditEvent::parse("nope"), None);
        assert_eq!(AuditEvent::KeyRotated.to_string(), "key_rotated");
        assert_eq!(AuditOutcome::parse("FAILURE"), Some(AuditOutcome::Failure));
    }

    #[test]
    fn test_filter_matches() {
        let now = Utc::now();
        let entry = AuditLogEntry::failure(AuditEvent::AccessDecision, "denied")
            .with_user("u-2", "dev")
            .at(now);

        assert!(AuditFilter::new().matches(&entry));
        assert!(AuditFilter::new().user("u-2").matches(&entry));
        assert!(!AuditFilter::new().user("u-3").matches(&entry));
        assert!(AuditFilter::new().result(AuditOutcome::Failure).matches(&entry));
        assert!(!AuditFilter::new().event(AuditEvent::Logout).matches(&entry));
        assert!(!AuditFilter::new().since(now + Duration::seconds(1)).matches(&entry));
        assert!(AuditFilter::new()
            .time_range(now - Duration::seconds(1), now)
            .matches(&entry));
    }

    #[test]
    fn test_finish_sorts_newest_first() {
        let now = Utc::now();
        let entries = (0..5)
            .map(|i| AuditLogEntry::success(AuditEvent::Logout).at(now + Duration::seconds(i)))
            .collect();

        let result = AuditFilter::new().limit(3).finish(entries);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].timestamp, now + Duration::seconds(4));
        assert!(result[0].timestamp > result[1].timestamp);
    }
}
