// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Authentication Integration Tests
//!
//! - `test_login_*`: credential checks and the default accounts
//! - `test_lockout_*`: brute-force protection
//! - `test_storage_*`: logins against failing tables
//! - `test_token_*`: signing, refresh, revocation and key rotation
//! - `test_password_*`: strength rules and password changes
//! - `test_mfa_*`: TOTP enrolment and login

use std::sync::Arc;
use std::time::Duration;

use warden_audit::{AuditEvent, AuditOutcome};
use warden_auth::{
    AuthError, Credentials, RateLimitTracker, Role, Stores, TokenError, TokenPayload, TokenType, User,
};
use warden_tests::prelude::*;

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_admin_scenario() {
    let harness = TestHarness::new().await;

    let tokens = harness.login(&UserFixtures::admin()).await;
    assert_eq!(tokens.token_type, "Bearer");
    assert_eq!(tokens.expires_in, 3600);

    let user = harness.ctx.authn().validate_token(&tokens.access_token).unwrap();
    assert!(user.roles.contains(&Role::Admin));
    assert!(user.last_login.is_some());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let harness = TestHarness::new().await;
    let authn = harness.ctx.authn();

    let unknown = authn.authenticate(&Credentials::new("ghost", "whatever"), None).await;
    let wrong = authn.authenticate(&UserFixtures::admin().wrong_credentials(), None).await;
    let empty = authn.authenticate(&Credentials::new("", ""), None).await;

    for result in [unknown, wrong, empty] {
        let err = result.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(err.client_message(), "Invalid username or password");
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_login_username_is_trimmed() {
    let harness = TestHarness::new().await;
    let result = harness
        .ctx
        .authn()
        .authenticate(&Credentials::new("  developer ", "dev123!"), None)
        .await;
    assert!(result.is_ok());
    harness.shutdown().await;
}

// =============================================================================
// Lockout
// =============================================================================

#[tokio::test]
async fn test_lockout_after_five_failures() {
    let harness = TestHarness::new().await;
    let authn = harness.ctx.authn();
    let admin = UserFixtures::admin();

    for _ in 0..5 {
        let err = authn.authenticate(&admin.wrong_credentials(), None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    // Correct password, still locked.
    let err = authn.authenticate(&admin.credentials(), None).await.unwrap_err();
    match err {
        AuthError::RateLimited { retry_after } => assert_eq!(retry_after, Duration::from_secs(30 * 60)),
        other => panic!("expected RateLimited, got {:?}", other),
    }
    assert!(authn.rate_limiter().is_locked("admin").unwrap());

    // Other usernames are unaffected.
    harness.login(&UserFixtures::developer()).await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_lockout_success_resets_counter() {
    let harness = TestHarness::new().await;
    let authn = harness.ctx.authn();
    let admin = UserFixtures::admin();

    for _ in 0..4 {
        let _ = authn.authenticate(&admin.wrong_credentials(), None).await;
    }
    assert_eq!(authn.rate_limiter().attempts("admin").unwrap(), 4);

    harness.login(&admin).await;
    assert_eq!(authn.rate_limiter().attempts("admin").unwrap(), 0);

    // A fresh budget of five.
    for _ in 0..5 {
        let err = authn.authenticate(&admin.wrong_credentials(), None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_lockout_expires() {
    let config = ConfigFixtures::short_lockout(2, Duration::from_millis(200));
    let harness = TestHarness::with_config(TestHarnessConfig::default().security(config)).await;
    let authn = harness.ctx.authn();
    let developer = UserFixtures::developer();

    for _ in 0..2 {
        let _ = authn.authenticate(&developer.wrong_credentials(), None).await;
    }
    let err = authn.authenticate(&developer.credentials(), None).await.unwrap_err();
    assert!(matches!(err, AuthError::RateLimited { .. }));

    tokio::time::sleep(Duration::from_millis(300)).await;
    harness.login(&developer).await;

    harness.shutdown().await;
}

// =============================================================================
// Storage Failures
// =============================================================================

#[tokio::test]
async fn test_storage_failing_limiter_is_audited() {
    let rate_limits = Arc::new(FlakyStore::<RateLimitTracker>::new());
    let stores = Stores {
        rate_limits: rate_limits.clone(),
        ..Stores::in_memory()
    };
    let harness = TestHarness::with_config(TestHarnessConfig::default().stores(stores)).await;

    rate_limits.set_failing(true);
    let err = harness
        .ctx
        .authn()
        .authenticate(&UserFixtures::admin().credentials(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Storage(_)));
    assert_eq!(err.client_message(), "Authentication unavailable");

    let entries = harness.audit_entries().await;
    assert_eq!(entries.len(), 1);
    let failure = entries.expect_event(AuditEvent::LoginFailure);
    assert_eq!(failure.result, AuditOutcome::Failure);
    assert_eq!(failure.username.as_deref(), Some("admin"));
    assert!(failure
        .error_message
        .as_deref()
        .is_some_and(|m| m.starts_with("internal error") && m.contains("storage offline")));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_storage_failed_login_write_keeps_counter() {
    let users = Arc::new(FlakyStore::<User>::new());
    let stores = Stores {
        users: users.clone(),
        ..Stores::in_memory()
    };
    let harness = TestHarness::with_config(TestHarnessConfig::default().stores(stores)).await;
    let authn = harness.ctx.authn();
    let admin = UserFixtures::admin();

    let _ = authn.authenticate(&admin.wrong_credentials(), None).await;
    assert_eq!(authn.rate_limiter().attempts("admin").unwrap(), 1);

    // Lookup works, recording last_login does not.
    users.set_failing_writes(true);
    let err = authn.authenticate(&admin.credentials(), None).await.unwrap_err();
    assert!(matches!(err, AuthError::Storage(_)));
    assert_eq!(authn.rate_limiter().attempts("admin").unwrap(), 2);

    let entries = harness.audit_entries().await;
    entries.assert_event_count(AuditEvent::LoginSuccess, 0);
    entries.assert_event_count(AuditEvent::LoginFailure, 2);

    users.set_failing_writes(false);
    harness.login(&admin).await;
    assert_eq!(authn.rate_limiter().attempts("admin").unwrap(), 0);

    harness.shutdown().await;
}

// =============================================================================
// Tokens
// =============================================================================

#[tokio::test]
async fn test_token_round_trip() {
    let harness = TestHarness::new().await;
    let tokens = harness.ctx.tokens();

    let payload = TokenPayload::new("u-42", "carol")
        .with_email("carol@example.test")
        .with_roles(vec![Role::Analyst, Role::Developer]);
    let token = tokens.sign(&payload, Duration::from_secs(60)).unwrap();

    let claims = tokens.verify(&token).unwrap();
    assert_eq!(claims.sub, "u-42");
    assert_eq!(claims.username, "carol");
    assert_eq!(claims.roles, vec![Role::Analyst, Role::Developer]);
    assert_eq!(claims.token_type, TokenType::Access);
    assert!(claims.jti.is_some());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_token_revoke_then_verify() {
    let harness = TestHarness::new().await;
    let tokens = harness.ctx.tokens();

    let token = tokens
        .sign(&TokenPayload::new("u-1", "dave"), Duration::from_secs(60))
        .unwrap();
    tokens.revoke(&token).unwrap();

    assert!(matches!(tokens.verify(&token), Err(TokenError::TokenRevoked)));
    harness.shutdown().await;
}

#[tokio::test]
async fn test_token_revoked_access_token_fails_validation() {
    let harness = TestHarness::new().await;
    let authn = harness.ctx.authn();
    let tokens = harness.login(&UserFixtures::developer()).await;

    authn.revoke_token(&tokens.access_token).unwrap();

    let err = authn.validate_token(&tokens.access_token).unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken { .. }));
    assert_eq!(err.client_message(), "Invalid or expired token");

    harness.shutdown().await;
}

#[tokio::test]
async fn test_token_refresh_reflects_current_roles() {
    let harness = TestHarness::new().await;
    let authn = harness.ctx.authn();
    let user = harness.create_user("erin", Role::Readonly).await;

    let tokens = authn
        .authenticate(&Credentials::new("erin", UserFixtures::STRONG_PASSWORD), None)
        .await
        .unwrap();
    authn.set_roles(&user.id, [Role::Developer]).unwrap();

    let refreshed = authn.refresh_token(&tokens.refresh_token).unwrap();
    assert_eq!(refreshed.refresh_token, tokens.refresh_token);

    let claims = harness.ctx.tokens().verify(&refreshed.access_token).unwrap();
    assert!(claims.has_role(Role::Developer));

    // Access tokens cannot be used to refresh.
    let err = authn.refresh_token(&tokens.access_token).unwrap_err();
    assert!(matches!(err, AuthError::InvalidRefreshToken { .. }));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_token_refresh_token_is_not_an_access_token() {
    let harness = TestHarness::new().await;
    let tokens = harness.login(&UserFixtures::admin()).await;

    let err = harness.ctx.authn().validate_token(&tokens.refresh_token).unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken { .. }));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_token_survives_key_rotation() {
    let harness = TestHarness::new().await;
    let before = harness.login(&UserFixtures::admin()).await;

    let old_key = harness.ctx.tokens().current_key_id();
    let new_key = harness.ctx.rotate_keys().unwrap();
    assert_ne!(old_key, new_key);

    let after = harness.login(&UserFixtures::admin()).await;
    assert!(harness.ctx.authn().validate_token(&before.access_token).is_ok());
    assert!(harness.ctx.authn().validate_token(&after.access_token).is_ok());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_token_logout_revokes_session() {
    let harness = TestHarness::new().await;
    let authn = harness.ctx.authn();
    let tokens = harness.login(&UserFixtures::developer()).await;

    authn.logout(&tokens.access_token, None).unwrap();
    assert!(authn.validate_token(&tokens.access_token).is_err());

    harness.shutdown().await;
}

// =============================================================================
// Passwords
// =============================================================================

#[tokio::test]
async fn test_password_strength_rules() {
    let harness = TestHarness::new().await;
    let authn = harness.ctx.authn();

    for (rule, password) in UserFixtures::weak_passwords() {
        let input = warden_auth::NewUser::new(format!("weak-{}", rule.replace(' ', "-")), password, Role::Readonly);
        let err = authn.create_user(input).await.unwrap_err();
        assert!(matches!(err, AuthError::WeakPassword { .. }), "{} was accepted", rule);
    }

    let user = harness.create_user("frank", Role::Analyst).await;
    assert!(user.password_hash.is_some());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_password_duplicate_username_rejected() {
    let harness = TestHarness::new().await;
    harness.create_user("grace", Role::Readonly).await;

    let err = harness
        .ctx
        .authn()
        .create_user(UserFixtures::new_user("grace", Role::Admin))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserExists { ref username } if username == "grace"));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_password_change() {
    let harness = TestHarness::new().await;
    let authn = harness.ctx.authn();
    let user = harness.create_user("heidi", Role::Developer).await;

    let err = authn
        .change_password(&user.id, "not-the-old-one", "Another2Pass!")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    let err = authn
        .change_password(&user.id, UserFixtures::STRONG_PASSWORD, "weak")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::WeakPassword { .. }));

    authn
        .change_password(&user.id, UserFixtures::STRONG_PASSWORD, "Another2Pass!")
        .await
        .unwrap();
    assert!(authn
        .authenticate(&Credentials::new("heidi", "Another2Pass!"), None)
        .await
        .is_ok());

    harness.shutdown().await;
}

// =============================================================================
// MFA
// =============================================================================

#[tokio::test]
async fn test_mfa_enrolment_and_login() {
    let harness = TestHarness::new().await;
    let authn = harness.ctx.authn();
    let user = harness.create_user("ivan", Role::Developer).await;

    let setup = authn.setup_mfa(&user.id).unwrap();
    assert!(setup.provisioning_uri.starts_with("otpauth://totp/"));

    // Not enforced until confirmed.
    authn
        .authenticate(&Credentials::new("ivan", UserFixtures::STRONG_PASSWORD), None)
        .await
        .unwrap();

    let code = authn.totp().code_at(&setup.secret, now_secs()).unwrap();
    authn.enable_mfa(&user.id, &code).unwrap();

    let err = authn
        .authenticate(&Credentials::new("ivan", UserFixtures::STRONG_PASSWORD), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::MfaRequired));

    let err = authn
        .authenticate(
            &Credentials::new("ivan", UserFixtures::STRONG_PASSWORD).with_mfa_code("abcdef"),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidMfa));

    let code = authn.totp().code_at(&setup.secret, now_secs()).unwrap();
    authn
        .authenticate(
            &Credentials::new("ivan", UserFixtures::STRONG_PASSWORD).with_mfa_code(code),
            None,
        )
        .await
        .unwrap();

    harness.shutdown().await;
}

#[tokio::test]
async fn test_mfa_disable_requires_code() {
    let harness = TestHarness::new().await;
    let authn = harness.ctx.authn();
    let user = harness.create_user("judy", Role::Readonly).await;

    let setup = authn.setup_mfa(&user.id).unwrap();
    let code = authn.totp().code_at(&setup.secret, now_secs()).unwrap();
    authn.enable_mfa(&user.id, &code).unwrap();

    assert!(matches!(authn.disable_mfa(&user.id, "12ab56"), Err(AuthError::InvalidMfa)));

    let code = authn.totp().code_at(&setup.secret, now_secs()).unwrap();
    authn.disable_mfa(&user.id, &code).unwrap();

    let stored = authn.get_user(&user.id).unwrap();
    assert!(!stored.mfa_enabled);
    assert!(stored.mfa_secret.is_none());

    harness.shutdown().await;
}
