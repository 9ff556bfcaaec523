// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # warden-auth
//!
//! Authentication and authorization for the warden security subsystem.
//!
//! This crate provides:
//! - EdDSA-signed access/refresh tokens with revocation and key rotation
//! - Hierarchical RBAC over a fixed role set
//! - ABAC policies with deny-overrides precedence
//! - Credential verification with lockout and TOTP second factor
//! - A [`SecurityContext`] wiring everything to storage and the audit trail
//!
//! ## Example
//!
//! ```no_run
//! use warden_auth::{Credentials, SecurityConfig, SecurityContext};
//!
//! # async fn run() -> warden_auth::SecurityResult<()> {
//! let ctx = SecurityContext::from_config(SecurityConfig::default()).await?;
//! let tokens = ctx.authn().authenticate(&Credentials::new("admin", "admin123!"), None).await?;
//! let user = ctx.authn().validate_token(&tokens.access_token)?;
//! assert!(ctx.authz().authorize(&user, "/ai", "execute"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod authn;
pub mod authz;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod policy;
pub mod rbac;
pub mod store;
pub mod token;

pub use authn::{AuthenticationService, LoginRateLimiter, RateLimitTracker};
pub use authz::{normalize_resource, AccessDecision, AuthorizationService, DEFAULT_ACTION, KNOWN_RESOURCES};
pub use config::{ConfigFormat, SecurityConfig};
pub use context::{MaintenanceReport, SecurityContext, SecurityContextBuilder};
pub use error::{
    AuthError, AuthResult, AuthzError, AuthzResult, ConfigError, SecurityError, SecurityResult, StoreError,
    TokenError, TokenResult,
};
pub use model::{AuthTokens, Credentials, MfaSetup, NewUser, User};
pub use policy::{Effect, Policy, PolicyDecision, PolicyEngine};
pub use rbac::{Permission, PermissionCatalog, PermissionSet, Role};
pub use store::{JsonFileStore, MemoryStore, Store, Stores};
pub use token::{Claims, TokenPayload, TokenService, TokenType};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
