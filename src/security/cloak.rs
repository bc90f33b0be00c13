//! Hostname cloaking.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of the hostname, shown in place of the real host
/// when user mode `x` is set.
pub fn cloak_hostname(hostname: &str) -> String {
    let hash = Sha256::digest(hostname.as_bytes());
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}
