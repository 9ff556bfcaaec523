// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Password hashing and strength rules.

use crate::config::PasswordPolicy;
use crate::error::{AuthError, AuthResult};

/// bcrypt hasher. Hashing runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    /// Creates a hasher with the given bcrypt cost.
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Returns the bcrypt cost.
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hashes `password` with a fresh salt.
    pub async fn hash(&self, password: &str) -> AuthResult<String> {
        let password = password.to_owned();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AuthError::internal(format!("hashing task failed: {}", e)))?
            .map_err(|e| AuthError::internal(format!("hashing failed: {}", e)))
    }

    /// Checks `password` against `hash`.
    ///
    /// A malformed hash is treated as a mismatch.
    pub async fn verify(&self, password: &str, hash: &str) -> AuthResult<bool> {
        let password = password.to_owned();
        let hash = hash.to_owned();
        let result = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AuthError::internal(format!("verification task failed: {}", e)))?;

        match result {
            Ok(matched) => Ok(matched),
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash is unreadable");
                Ok(false)
            }
        }
    }
}

/// Checks `password` against the strength rules.
pub fn check_strength(policy: &PasswordPolicy, password: &str) -> AuthResult<()> {
    if password.chars().count() < policy.min_length {
        return Err(AuthError::weak_password(format!(
            "must be at least {} characters",
            policy.min_length
        )));
    }
    if policy.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
        return Err(AuthError::weak_password("must contain an uppercase letter"));
    }
    if policy.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
        return Err(AuthError::weak_password("must contain a lowercase letter"));
    }
    if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::weak_password("must contain a digit"));
    }
    if policy.require_special && !password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace()) {
        return Err(AuthError::weak_password("must contain a special character"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_rules() {
        let policy = PasswordPolicy::default();
        assert!(check_strength(&policy, "Strong1Pass!").is_ok());

        for weak in ["Sh0rt!", "nouppercase1!", "NOLOWERCASE1!", "NoDigitsHere!", "NoSpecial123"] {
            assert!(
                matches!(check_strength(&policy, weak), Err(AuthError::WeakPassword { .. })),
                "{} should be rejected",
                weak
            );
        }
    }

    #[test]
    fn test_relaxed_policy() {
        let policy = PasswordPolicy {
            require_special: false,
            ..Default::default()
        };
        assert!(check_strength(&policy, "NoSpecial123").is_ok());
    }

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hasher = PasswordHasher::new(4);
        let hash = hasher.hash("Strong1Pass!").await.unwrap();
        assert!(hash.starts_with("$2"));
        assert!(hasher.verify("Strong1Pass!", &hash).await.unwrap());
        assert!(!hasher.verify("wrong", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_hash_is_mismatch() {
        let hasher = PasswordHasher::new(4);
        assert!(!hasher.verify("anything", "not-a-hash").await.unwrap());
    }
}
