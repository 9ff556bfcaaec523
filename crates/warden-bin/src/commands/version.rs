// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `version` command.

use crate::cli::Cli;
use crate::error::BinResult;

/// Executes the `version` command to display version information.
pub fn version(cli: &Cli) -> BinResult<()> {
    if cli.quiet {
        println!("{}", crate::VERSION);
        return Ok(());
    }

    println!("Warden - authentication, authorization and audit");
    println!();
    println!("Version Information:");
    println!("  warden-bin:   {}", crate::VERSION);
    println!("  warden-auth:  {}", warden_auth::VERSION);
    println!("  warden-audit: {}", warden_audit::VERSION);
    println!();
    println!("Build Information:");
    println!("  Rust Edition: 2021");
    println!("  Target:       {}", std::env::consts::ARCH);
    println!("  OS:           {}", std::env::consts::OS);
    println!();
    println!("Security Defaults:");
    println!("  Token signing: EdDSA (Ed25519)");
    println!("  Passwords:     bcrypt");
    println!("  MFA:           TOTP (HMAC-SHA1)");
    println!();
    println!("License: PolyForm Noncommercial License 1.0.0");
    println!("Copyright (c) 2025 Sylvex. All rights reserved.");

    Ok(())
}
