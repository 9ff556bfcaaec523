// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Ed25519 signing keys and the bounded key ring.

use std::collections::VecDeque;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::pkcs8::EncodePrivateKey;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use uuid::Uuid;

use crate::error::{TokenError, TokenResult};

// =============================================================================
// KeyPair
// =============================================================================

/// An Ed25519 key pair with its lifecycle metadata.
///
/// `expires_at` is set only when the pair is superseded by a rotation.
pub struct KeyPair {
    /// Key ID, carried in the `kid` header of signed tokens.
    pub key_id: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// End of the verification grace window.
    pub expires_at: Option<DateTime<Utc>>,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    /// Generates a new key pair from the OS random source.
    pub fn generate() -> TokenResult<Self> {
        let signing = ed25519_dalek::SigningKey::generate(&mut OsRng);

        let der = signing
            .to_pkcs8_der()
            .map_err(|e| TokenError::sign_failed(format!("Failed to encode signing key: {}", e)))?;
        let encoding = EncodingKey::from_ed_der(der.as_bytes());

        let public = URL_SAFE_NO_PAD.encode(signing.verifying_key().to_bytes());
        let decoding = DecodingKey::from_ed_components(&public)
            .map_err(|e| TokenError::sign_failed(format!("Failed to load verifying key: {}", e)))?;

        Ok(Self {
            key_id: Uuid::now_v7().simple().to_string(),
            created_at: Utc::now(),
            expires_at: None,
            encoding,
            decoding,
        })
    }

    /// Returns `true` if the grace window has ended at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.key_id)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// KeyRing
// =============================================================================

/// The current signing key plus retired keys still accepted for verification.
///
/// At most `max_keys` pairs are held, the current one included. When a
/// rotation would exceed that, the oldest retired pair is dropped early.
#[derive(Debug)]
pub struct KeyRing {
    current: KeyPair,
    /// Newest first.
    retired: VecDeque<KeyPair>,
    max_keys: usize,
}

impl KeyRing {
    /// Creates a ring with a freshly generated current key.
    pub fn generate(max_keys: usize) -> TokenResult<Self> {
        Ok(Self {
            current: KeyPair::generate()?,
            retired: VecDeque::new(),
            max_keys: max_keys.max(1),
        })
    }

    /// Returns the signing key.
    pub fn current(&self) -> &KeyPair {
        &self.current
    }

    /// Returns the keys valid for verification at `now`, current first.
    pub fn verification_keys(&self, now: DateTime<Utc>) -> impl Iterator<Item = &KeyPair> {
        std::iter::once(&self.current).chain(self.retired.iter().filter(move |k| !k.is_expired_at(now)))
    }

    /// Installs a new current key and retires the previous one for `grace`.
    ///
    /// Returns the new key ID.
    pub fn rotate(&mut self, grace: Duration, now: DateTime<Utc>) -> TokenResult<String> {
        let next = KeyPair::generate()?;
        let mut previous = std::mem::replace(&mut self.current, next);
        let grace = chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::days(36_500));
        previous.expires_at = Some(now.checked_add_signed(grace).unwrap_or(DateTime::<Utc>::MAX_UTC));
        self.retired.push_front(previous);

        self.purge_expired(now);

        while self.retired.len() + 1 > self.max_keys {
            if let Some(dropped) = self.retired.pop_back() {
                tracing::warn!(
                    key_id = %dropped.key_id,
                    "Dropped retired signing key before its grace window ended"
                );
            }
        }

        Ok(self.current.key_id.clone())
    }

    /// Removes retired keys whose grace window has ended.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.retired.len();
        self.retired.retain(|k| !k.is_expired_at(now));
        before - self.retired.len()
    }

    /// Returns all held key IDs, current first.
    pub fn key_ids(&self) -> Vec<String> {
        std::iter::once(&self.current)
            .chain(self.retired.iter())
            .map(|k| k.key_id.clone())
            .collect()
    }

    /// Returns the number of held keys.
    pub fn len(&self) -> usize {
        self.retired.len() + 1
    }

    /// Always `false`: a ring holds at least its current key.
    pub fn is_empty(&self) -> bool {
        false
    }
}
