//! Config password handling.
//!
//! The config stores passwords as base64(bcrypt(password)). Verification
//! is a bcrypt compare; it is CPU-heavy on purpose and runs inline on
//! the calling connection's task so one slow authentication cannot
//! stall other connections.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use thiserror::Error;

/// Password handling errors.
#[derive(Debug, Error)]
pub enum PasswordError {
    /// The configured value was empty.
    #[error("empty password")]
    Empty,
    /// The configured value was not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Hashing failed.
    #[error("bcrypt: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
}

/// Decode a base64(bcrypt) config value into the raw hash bytes.
pub fn decode_password(encoded: &str) -> Result<Vec<u8>, PasswordError> {
    if encoded.is_empty() {
        return Err(PasswordError::Empty);
    }
    Ok(BASE64.decode(encoded)?)
}

/// Compare a cleartext attempt against a decoded bcrypt hash.
pub fn verify_password(hash: &[u8], attempt: &str) -> bool {
    match std::str::from_utf8(hash) {
        Ok(hash) => bcrypt::verify(attempt, hash).unwrap_or(false),
        Err(_) => false,
    }
}

/// Hash a new password into the config encoding.
pub fn generate_password(password: &str) -> Result<String, PasswordError> {
    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
    Ok(BASE64.encode(hash.as_bytes()))
}
