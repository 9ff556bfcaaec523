// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `check` command.

use serde_json::json;
use warden_audit::ClientMeta;
use warden_auth::{AccessDecision, Credentials, SecurityContext, User};

use super::load_config;
use crate::cli::{CheckArgs, Cli, OutputFormat};
use crate::error::{BinError, BinResult};

/// Executes the `check` command.
///
/// Exits non-zero when login fails or access is denied.
pub async fn check(cli: &Cli, args: CheckArgs) -> BinResult<()> {
    let loaded = load_config(&cli.config)?;
    let ctx = SecurityContext::from_config(loaded.config)
        .await
        .map_err(|e| BinError::from(e).with_context("Failed to build security context"))?;

    let outcome = run_check(&ctx, &args).await;
    ctx.shutdown().await;
    let (user, decision) = outcome?;

    match args.format {
        OutputFormat::Text => {
            let mark = if decision.allowed { "✓" } else { "✗" };
            println!(
                "{} {} {} on {}: {}",
                mark,
                user.username,
                decision.action,
                decision.resource,
                if decision.allowed { "allowed" } else { "denied" }
            );
            println!("  Roles:  {}", user.role_names().join(", "));
            println!("  RBAC:   {}", if decision.rbac_allowed { "granted" } else { "not granted" });
            println!("  Reason: {}", decision.reason);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&decision_json(&user, &decision))?),
    }

    if !decision.allowed {
        return Err(BinError::denied(decision.reason));
    }
    Ok(())
}

/// Logs in, validates the issued access token and decides the request.
pub async fn run_check(ctx: &SecurityContext, args: &CheckArgs) -> BinResult<(User, AccessDecision)> {
    let mut credentials = Credentials::new(&args.username, &args.password);
    if let Some(code) = &args.mfa_code {
        credentials = credentials.with_mfa_code(code);
    }
    let client = ClientMeta::ip("127.0.0.1").with_user_agent(format!("warden-cli/{}", crate::VERSION));

    let tokens = ctx.authn().authenticate(&credentials, Some(&client)).await?;
    let user = ctx.authn().validate_token(&tokens.access_token)?;
    let decision = ctx.authz().validate_access(&user, &args.resource, &args.action);

    // The session only exists for this check.
    if let Err(err) = ctx.authn().logout(&tokens.access_token, Some(&client)) {
        tracing::warn!(error = %err, "Failed to revoke check session");
    }
    Ok((user, decision))
}

fn decision_json(user: &User, decision: &AccessDecision) -> serde_json::Value {
    json!({
        "user": {
            "id": user.id,
            "username": user.username,
            "roles": user.role_names(),
        },
        "resource": decision.resource,
        "action": decision.action,
        "allowed": decision.allowed,
        "reason": decision.reason,
        "rbac_allowed": decision.rbac_allowed,
        "policy": decision.policy.policy().map(|p| p.name.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_auth::SecurityConfig;

    fn args(username: &str, password: &str, resource: &str, action: &str) -> CheckArgs {
        CheckArgs {
            username: username.to_string(),
            password: password.to_string(),
            mfa_code: None,
            resource: resource.to_string(),
            action: action.to_string(),
            format: OutputFormat::Json,
        }
    }

    async fn context() -> SecurityContext {
        let mut config = SecurityConfig::default();
        config.password.bcrypt_cost = 4;
        config.audit.enabled = false;
        SecurityContext::from_config(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_developer_reads_memory() {
        let ctx = context().await;
        let (user, decision) = run_check(&ctx, &args("developer", "dev123!", "/memory", "read"))
            .await
            .unwrap();

        assert_eq!(user.username, "developer");
        assert!(decision.allowed);
        assert!(decision.rbac_allowed);
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_developer_denied_config_write() {
        let ctx = context().await;
        let (_, decision) = run_check(&ctx, &args("developer", "dev123!", "/config", "write"))
            .await
            .unwrap();

        assert!(!decision.allowed);
        let json = decision_json(&User::new("x", "x@localhost", []), &decision);
        assert_eq!(json["allowed"], false);
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_wrong_password_fails() {
        let ctx = context().await;
        let err = run_check(&ctx, &args("admin", "wrong", "/ai", "execute")).await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
        ctx.shutdown().await;
    }
}
