// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Token signing, verification, refresh, revocation and key rotation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, Header, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::keyring::KeyRing;
use super::{Claims, TokenPayload, TokenType};
use crate::config::TokenConfig;
use crate::error::{TokenError, TokenResult};
use crate::store::Store;

/// A revocation record, kept until the token would have expired anyway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokedToken {
    /// When the token was revoked.
    pub revoked_at: DateTime<Utc>,
    /// The token's own expiry.
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// TokenService
// =============================================================================

/// Issues and checks EdDSA-signed tokens.
///
/// Only the current key signs. Verification accepts any key still inside its
/// rotation grace window, and rejects revoked jtis before touching keys.
pub struct TokenService {
    config: TokenConfig,
    keys: RwLock<KeyRing>,
    revoked: Arc<dyn Store<RevokedToken>>,
    validation: Validation,
}

impl TokenService {
    /// Creates a service with a freshly generated signing key.
    pub fn new(config: TokenConfig, revoked: Arc<dyn Store<RevokedToken>>) -> TokenResult<Self> {
        let keys = KeyRing::generate(config.max_keys)?;

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.leeway = config.leeway_secs;

        tracing::info!(key_id = %keys.current().key_id, "Token service initialized");

        Ok(Self {
            config,
            keys: RwLock::new(keys),
            revoked,
            validation,
        })
    }

    /// Returns the token configuration.
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Returns the access token lifetime.
    pub fn access_ttl(&self) -> Duration {
        self.config.access_ttl
    }

    /// Returns the refresh token lifetime.
    pub fn refresh_ttl(&self) -> Duration {
        self.config.refresh_ttl
    }

    /// Signs `payload` with the current key, valid for `ttl`.
    pub fn sign(&self, payload: &TokenPayload, ttl: Duration) -> TokenResult<String> {
        self.sign_at(payload, ttl, Utc::now())
    }

    pub(crate) fn sign_at(
        &self,
        payload: &TokenPayload,
        ttl: Duration,
        issued_at: DateTime<Utc>,
    ) -> TokenResult<String> {
        if payload.sub.trim().is_empty() {
            return Err(TokenError::invalid_payload("subject is required"));
        }
        if payload.username.trim().is_empty() {
            return Err(TokenError::invalid_payload("username is required"));
        }

        let iat = issued_at.timestamp();
        let ttl = i64::try_from(ttl.as_secs()).map_err(|_| TokenError::invalid_payload("ttl out of range"))?;

        let claims = Claims {
            sub: payload.sub.clone(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat,
            exp: iat.saturating_add(ttl),
            jti: Some(Uuid::new_v4().to_string()),
            username: payload.username.clone(),
            email: payload.email.clone(),
            roles: payload.roles.clone(),
            permissions: payload.permissions.clone(),
            token_type: payload.token_type,
        };

        let keys = self.keys.read();
        let key = keys.current();
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(key.key_id.clone());

        encode(&header, &claims, key.encoding_key()).map_err(|e| TokenError::sign_failed(e.to_string()))
    }

    /// Verifies signature, issuer, audience and expiry.
    pub fn verify(&self, token: &str) -> TokenResult<Claims> {
        let unverified = self.decode(token)?;
        if let Some(ref jti) = unverified.jti {
            if self.is_revoked(jti)? {
                return Err(TokenError::TokenRevoked);
            }
        }

        let keys = self.keys.read();
        for key in keys.verification_keys(Utc::now()) {
            match decode::<Claims>(token, key.decoding_key(), &self.validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => continue,
                Err(e) => return Err(map_validation_error(e.kind())),
            }
        }

        Err(TokenError::verification_failed("no retained key matches the signature"))
    }

    /// Reads claims without checking the signature.
    ///
    /// The result is untrusted and must only be used for lookups such as the
    /// revocation check.
    pub fn decode(&self, token: &str) -> TokenResult<Claims> {
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::invalid_format(e.to_string()))
    }

    /// Exchanges a refresh token for an access token with the same identity.
    pub fn refresh(&self, refresh_token: &str) -> TokenResult<String> {
        let claims = self.verify(refresh_token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(TokenError::InvalidTokenType {
                expected: TokenType::Refresh.to_string(),
                actual: claims.token_type.to_string(),
            });
        }

        let payload = claims.to_payload().with_type(TokenType::Access);
        self.sign(&payload, self.config.access_ttl)
    }

    /// Adds the token's jti to the revocation set.
    pub fn revoke(&self, token: &str) -> TokenResult<()> {
        let claims = self.decode(token)?;
        let jti = claims.jti.clone().ok_or(TokenError::MissingJti)?;

        self.revoked.set(
            &jti,
            RevokedToken {
                revoked_at: Utc::now(),
                expires_at: claims.expires_at(),
            },
        )?;

        tracing::debug!(jti = %jti, sub = %claims.sub, "Token revoked");
        Ok(())
    }

    /// Returns `true` if the jti was revoked.
    pub fn is_revoked(&self, jti: &str) -> TokenResult<bool> {
        Ok(self.revoked.get(jti)?.is_some())
    }

    /// Generates a new signing key and retires the current one.
    ///
    /// Returns the new key ID.
    pub fn rotate_keys(&self) -> TokenResult<String> {
        let key_id = self.keys.write().rotate(self.config.rotation_grace, Utc::now())?;
        tracing::info!(key_id = %key_id, "Rotated signing key");
        Ok(key_id)
    }

    /// Drops retired keys whose grace window has ended.
    pub fn purge_expired_keys(&self) -> usize {
        self.purge_expired_keys_at(Utc::now())
    }

    /// Drops retired keys whose grace window ended before `now`.
    pub fn purge_expired_keys_at(&self, now: DateTime<Utc>) -> usize {
        let purged = self.keys.write().purge_expired(now);
        if purged > 0 {
            tracing::info!(purged, "Purged expired signing keys");
        }
        purged
    }

    /// Forgets revocations of tokens that have expired.
    pub fn sweep_revocations(&self) -> TokenResult<usize> {
        self.sweep_revocations_at(Utc::now())
    }

    /// Forgets revocations of tokens expired before `now`.
    pub fn sweep_revocations_at(&self, now: DateTime<Utc>) -> TokenResult<usize> {
        let mut removed = 0;
        for (jti, record) in self.revoked.list()? {
            if record.expires_at < now && self.revoked.delete(&jti)? {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "Swept expired revocations");
        }
        Ok(removed)
    }

    /// Returns held key IDs, current first.
    pub fn key_ids(&self) -> Vec<String> {
        self.keys.read().key_ids()
    }

    /// Returns the current signing key ID.
    pub fn current_key_id(&self) -> String {
        self.keys.read().current().key_id.clone()
    }

    /// Replaces all keys and clears the revocation set.
    pub fn reset(&self) -> TokenResult<()> {
        let fresh = KeyRing::generate(self.config.max_keys)?;
        *self.keys.write() = fresh;
        self.revoked.clear()?;
        Ok(())
    }
}

fn map_validation_error(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::ExpiredSignature => TokenError::verification_failed("token has expired"),
        ErrorKind::ImmatureSignature => TokenError::verification_failed("token is not yet valid"),
        ErrorKind::InvalidIssuer => TokenError::verification_failed("invalid issuer"),
        ErrorKind::InvalidAudience => TokenError::verification_failed("invalid audience"),
        ErrorKind::InvalidAlgorithm => TokenError::verification_failed("unexpected algorithm"),
        ErrorKind::MissingRequiredClaim(claim) => {
            TokenError::verification_failed(format!("missing claim: {}", claim))
        }
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            TokenError::invalid_format("malformed token")
        }
        other => TokenError::verification_failed(format!("{:?}", other)),
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .field("key_ids", &self.key_ids())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::Role;
    use crate::store::MemoryStore;

    fn service() -> TokenService {
        TokenService::new(TokenConfig::default(), Arc::new(MemoryStore::new())).unwrap()
    }

    fn payload() -> TokenPayload {
        TokenPayload::new("u-1", "admin")
            .with_email("admin@localhost")
            .with_roles(vec![Role::Admin])
            .with_permissions(vec!["*:*".into()])
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let tokens = service();
        let token = tokens.sign(&payload(), Duration::from_secs(60)).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.username, "admin");
        assert_eq!(claims.roles, vec![Role::Admin]);
        assert_eq!(claims.iss, "warden");
        assert_eq!(claims.aud, "warden-cli");
        assert_eq!(claims.token_type, TokenType::Access);
        assert!(claims.jti.is_some());
    }

    #[test]
    fn test_header_carries_kid() {
        let tokens = service();
        let token = tokens.sign(&payload(), Duration::from_secs(60)).unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::EdDSA);
        assert_eq!(header.kid, Some(tokens.current_key_id()));
    }

    #[test]
    fn test_sign_requires_subject_and_username() {
        let tokens = service();
        let result = tokens.sign(&TokenPayload::new("", "admin"), Duration::from_secs(60));
        assert!(matches!(result, Err(TokenError::InvalidPayload { .. })));

        let result = tokens.sign(&TokenPayload::new("u-1", " "), Duration::from_secs(60));
        assert!(matches!(result, Err(TokenError::InvalidPayload { .. })));
    }

    #[test]
    fn test_each_token_gets_unique_jti() {
        let tokens = service();
        let a = tokens.decode(&tokens.sign(&payload(), Duration::from_secs(60)).unwrap()).unwrap();
        let b = tokens.decode(&tokens.sign(&payload(), Duration::from_secs(60)).unwrap()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_revoke_then_verify_fails() {
        let tokens = service();
        let token = tokens.sign(&payload(), Duration::from_secs(60)).unwrap();

        tokens.revoke(&token).unwrap();
        assert!(matches!(tokens.verify(&token), Err(TokenError::TokenRevoked)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = service();
        let issued = Utc::now() - chrono::Duration::hours(2);
        let token = tokens.sign_at(&payload(), Duration::from_secs(60), issued).unwrap();

        match tokens.verify(&token) {
            Err(TokenError::VerificationFailed { message }) => assert!(message.contains("expired")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_leeway_tolerates_small_skew() {
        let tokens = service();
        let issued = Utc::now() - chrono::Duration::seconds(70);
        let token = tokens.sign_at(&payload(), Duration::from_secs(60), issued).unwrap();
        assert!(tokens.verify(&token).is_ok());
    }

    #[test]
    fn test_foreign_key_rejected() {
        let ours = service();
        let theirs = service();
        let token = theirs.sign(&payload(), Duration::from_secs(60)).unwrap();

        assert!(matches!(ours.verify(&token), Err(TokenError::VerificationFailed { .. })));
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let revoked: Arc<dyn Store<RevokedToken>> = Arc::new(MemoryStore::new());
        let tokens = TokenService::new(TokenConfig::default(), revoked).unwrap();
        let token = tokens.sign(&payload(), Duration::from_secs(60)).unwrap();

        let strict = TokenService {
            validation: {
                let mut v = tokens.validation.clone();
                v.set_audience(&["someone-else"]);
                v
            },
            ..tokens
        };
        assert!(matches!(strict.verify(&token), Err(TokenError::VerificationFailed { .. })));
    }

    #[test]
    fn test_garbage_is_invalid_format() {
        let tokens = service();
        assert!(matches!(tokens.verify("not-a-token"), Err(TokenError::InvalidFormat { .. })));
    }

    #[test]
    fn test_rotation_keeps_old_tokens_valid_during_grace() {
        let tokens = service();
        let old = tokens.sign(&payload(), Duration::from_secs(600)).unwrap();
        let old_kid = tokens.current_key_id();

        let new_kid = tokens.rotate_keys().unwrap();
        assert_ne!(old_kid, new_kid);
        assert_eq!(tokens.key_ids(), vec![new_kid.clone(), old_kid]);
        assert!(tokens.verify(&old).is_ok());

        let fresh = tokens.sign(&payload(), Duration::from_secs(600)).unwrap();
        let header = jsonwebtoken::decode_header(&fresh).unwrap();
        assert_eq!(header.kid, Some(new_kid));
    }

    #[test]
    fn test_old_tokens_fail_after_grace_purge() {
        let tokens = service();
        let old = tokens.sign(&payload(), Duration::from_secs(600)).unwrap();
        tokens.rotate_keys().unwrap();

        let purged = tokens.purge_expired_keys_at(Utc::now() + chrono::Duration::days(31));
        assert_eq!(purged, 1);
        assert!(matches!(tokens.verify(&old), Err(TokenError::VerificationFailed { .. })));
    }

    #[test]
    fn test_refresh_requires_refresh_type() {
        let tokens = service();
        let access = tokens.sign(&payload(), Duration::from_secs(60)).unwrap();
        assert!(matches!(tokens.refresh(&access), Err(TokenError::InvalidTokenType { .. })));

        let refresh_payload = payload().with_type(TokenType::Refresh).with_permissions(vec![]);
        let refresh = tokens.sign(&refresh_payload, Duration::from_secs(600)).unwrap();
        let new_access = tokens.refresh(&refresh).unwrap();

        let claims = tokens.verify(&new_access).unwrap();
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.roles, vec![Role::Admin]);
    }

    #[test]
    fn test_revoke_requires_jti() {
        let tokens = service();
        let claims = serde_json::json!({
            "sub": "u-1", "iss": "warden", "aud": "warden-cli",
            "iat": 0, "exp": 4_102_444_800i64, "username": "admin", "type": "access"
        });
        let keys = tokens.keys.read();
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(keys.current().key_id.clone());
        let token = encode(&header, &claims, keys.current().encoding_key()).unwrap();
        drop(keys);

        assert!(matches!(tokens.revoke(&token), Err(TokenError::MissingJti)));
    }

    #[test]
    fn test_sweep_revocations() {
        let tokens = service();
        let token = tokens.sign(&payload(), Duration::from_secs(60)).unwrap();
        tokens.revoke(&token).unwrap();

        assert_eq!(tokens.sweep_revocations().unwrap(), 0);
        let later = Utc::now() + chrono::Duration::minutes(5);
        assert_eq!(tokens.sweep_revocations_at(later).unwrap(), 1);
    }

    #[test]
    fn test_reset_invalidates_everything() {
        let tokens = service();
        let token = tokens.sign(&payload(), Duration::from_secs(60)).unwrap();
        tokens.revoke(&token).unwrap();

        tokens.reset().unwrap();
        assert_eq!(tokens.key_ids().len(), 1);
        assert!(matches!(tokens.verify(&token), Err(TokenError::VerificationFailed { .. })));
    }
}
