// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Signed token lifecycle.
//!
//! Tokens are compact JWS values signed with Ed25519. The [`TokenService`]
//! owns a bounded [`KeyRing`] so tokens signed before a rotation keep
//! verifying until the previous key's grace window ends.

mod claims;
mod keyring;
mod service;

pub use claims::{Claims, TokenPayload, TokenType};
pub use keyring::{KeyPair, KeyRing};
pub use service::{RevokedToken, TokenService};
