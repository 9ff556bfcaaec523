// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Redaction of sensitive detail fields.
//!
//! Only the top level of the detail object is inspected. Secrets nested inside
//! child objects are written as-is, so callers must keep credentials at the top
//! level of the details they attach.

use serde_json::Value;

/// Replacement written in place of a redacted value.
pub const REDACTED: &str = "[REDACTED]";

/// Detail keys whose values never reach the audit file.
///
/// Keys are compared after lowercasing and stripping `_` and `-`, so
/// `accessToken`, `access_token` and `ACCESS-TOKEN` are all covered.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "token",
    "accesstoken",
    "refreshtoken",
    "secret",
    "apikey",
    "privatekey",
    "mfacode",
    "mfasecret",
];

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Returns `true` if the key names a sensitive field.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = normalize_key(key);
    SENSITIVE_KEYS.contains(&normalized.as_str())
}

/// Redacts sensitive top-level keys of a detail object.
///
/// Non-object values pass through untouched.
pub fn redact_details(details: Value) -> Value {
    match details {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    if is_sensitive_key(&key) {
                        (key, Value::String(REDACTED.to_string()))
                    } else {
                        (key, value)
                    }
                })
                .collect(),
        ),
        other => other,
    }
}
