// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Warden Integration Tests
//!
//! Integration tests for the warden security subsystem, plus the shared
//! utilities they are built on.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities
//!   - `fixtures`: Well-known accounts, configs and policies
//!   - `assertions`: Assertion helpers for decisions and audit entries
//!   - `mocks`: Failing storage for fail-closed tests
//!   - `harness`: An isolated [`warden_auth::SecurityContext`] per test
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p warden-tests
//! cargo test -p warden-tests --test integration_authn
//! cargo test -p warden-tests -- --nocapture
//! ```
//!
//! ## Test Suites
//!
//! - `integration_rbac.rs`: permission expansion and the role hierarchy
//! - `integration_authn.rs`: login, lockout, tokens, MFA and accounts
//! - `integration_authz.rs`: combined RBAC/ABAC decisions and user overrides
//! - `integration_audit.rs`: what lands in the audit trail, on disk included
//! - `integration_storage.rs`: JSON-backed state across context restarts
//!
//! ## Using the Harness
//!
//! ```rust,ignore
//! use warden_tests::prelude::*;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let harness = TestHarness::new().await;
//!     let admin = harness.login_user(&UserFixtures::admin()).await;
//!     harness.ctx.authz().authorize(&admin, "/system", "restart");
//!     harness.shutdown().await;
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::assertions::*;
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
    pub use crate::common::{init_test_logging, temp_test_dir};
}
