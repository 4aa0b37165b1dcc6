// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{anyhow, bail, Result};
use zeroize::{Zeroize, Zeroizing};

pub mod telemetry;

/// Ensure a private key is of the form 0x12435687abcdef... and wrap it so it
/// is wiped on drop
pub fn ensure_private_key(s: &str) -> Result<Zeroizing<String>> {
    let s = s.trim();
    let Some(digits) = s.strip_prefix("0x") else {
        bail!("private key must start with '0x'")
    };
    if digits.len() != 64 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("private key must be 32 bytes of hex [0-9a-fA-F]");
    }
    hex::decode(digits)?.zeroize();
    Ok(Zeroizing::new(s.to_string()))
}

/// Flatten an SDK report into the CLI's error type, keeping its context chain
pub fn from_report(report: eyre::Report) -> anyhow::Error {
    anyhow!("{:#}", report)
}
