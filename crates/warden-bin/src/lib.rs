// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # warden-bin
//!
//! Command-line front end for the warden security subsystem.
//!
//! This crate provides:
//!
//! - CLI argument parsing with clap
//! - Logging initialization
//! - Command implementations (validate, audit, check, version)
//!
//! ## Architecture
//!
//! ```text
//!              main.rs
//!                 │
//!              cli.rs ──── logging.rs
//!                 │
//!            commands/
//!         ┌───────┼────────┐
//!         ▼       ▼        ▼
//!    validate   audit    check
//!         │       │        │
//!         └── warden-auth / warden-audit
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Validate configuration (default command)
//! warden -c /etc/warden/warden.toml
//!
//! # Recent failed logins
//! warden audit query --event login_failure --limit 20
//! warden audit verify
//!
//! # Does the developer account reach /memory?
//! warden check -u developer -p 'dev123!' -r /memory -a read
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
