// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Authentication: credentials, lockout, MFA and token issuance.

mod password;
mod rate_limit;
mod service;
mod totp;

pub use password::{check_strength, PasswordHasher};
pub use rate_limit::{LoginRateLimiter, RateLimitResult, RateLimitTracker};
pub use service::{AuthenticationService, DEFAULT_ADMIN, DEFAULT_DEVELOPER};
pub use totp::Totp;
