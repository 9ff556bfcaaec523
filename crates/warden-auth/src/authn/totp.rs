// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Time-based one-time passwords (RFC 6238, HMAC-SHA1).

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use crate::config::MfaConfig;

type HmacSha1 = Hmac<Sha1>;

/// Secret length in bytes (160 bits).
const SECRET_BYTES: usize = 20;

/// TOTP generator and verifier.
#[derive(Debug, Clone)]
pub struct Totp {
    config: MfaConfig,
}

impl Totp {
    /// Creates a TOTP helper.
    pub fn new(config: MfaConfig) -> Self {
        Self { config }
    }

    /// Generates a random base32 secret.
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        BASE32_NOPAD.encode(&bytes)
    }

    /// Builds the `otpauth://` URI an authenticator app can import.
    pub fn provisioning_uri(&self, account: &str, secret: &str) -> String {
        let issuer = urlencoding::encode(&self.config.issuer);
        format!(
            "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
            issuer,
            urlencoding::encode(account),
            secret,
            issuer,
            self.config.digits,
            self.config.step_secs
        )
    }

    /// Computes the code for Unix time `unix_secs`.
    ///
    /// Returns `None` if the secret is not valid base32.
    pub fn code_at(&self, secret: &str, unix_secs: u64) -> Option<String> {
        let key = decode_secret(secret)?;
        Some(self.code_for_counter(&key, unix_secs / self.config.step_secs.max(1)))
    }

    /// Verifies `code` at the current time.
    pub fn verify(&self, secret: &str, code: &str) -> bool {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.verify_at(secret, code, now)
    }

    /// Verifies `code` at `unix_secs`, accepting neighbouring steps within the skew.
    pub fn verify_at(&self, secret: &str, code: &str, unix_secs: u64) -> bool {
        let code = code.trim();
        if code.len() != self.config.digits as usize || !code.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        let Some(key) = decode_secret(secret) else {
            return false;
        };

        let current = unix_secs / self.config.step_secs.max(1);
        let first = current.saturating_sub(self.config.skew_steps);
        let last = current.saturating_add(self.config.skew_steps);

        (first..=last).any(|counter| constant_time_eq(self.code_for_counter(&key, counter).as_bytes(), code.as_bytes()))
    }

    fn code_for_counter(&self, key: &[u8], counter: u64) -> String {
        // HMAC accepts keys of any length.
        let mut mac = match HmacSha1::new_from_slice(key) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(&counter.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let binary = u32::from_be_bytes([
            digest[offset] & 0x7f,
            digest[offset + 1],
            digest[offset + 2],
            digest[offset + 3],
        ]);

        let modulus = 10u32.pow(self.config.digits);
        format!("{:0width$}", binary % modulus, width = self.config.digits as usize)
    }
}

fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    BASE32_NOPAD.decode(normalized.as_bytes()).ok().filter(|k| !k.is_empty())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
