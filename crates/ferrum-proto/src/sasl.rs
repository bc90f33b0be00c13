//! SASL PLAIN payloads (RFC 4616).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Maximum size of one AUTHENTICATE chunk. A chunk of exactly this size
/// signals continuation; a shorter chunk (or `+`) terminates the blob.
pub const CHUNK_SIZE: usize = 400;

/// Decoded PLAIN credentials.
#[derive(Debug, PartialEq, Eq)]
pub struct PlainCredentials {
    /// Authentication identity.
    pub authcid: String,
    /// Password.
    pub password: String,
}

/// Errors from decoding a PLAIN blob.
#[derive(Debug, PartialEq, Eq)]
pub enum PlainError {
    /// Not valid base64.
    Base64,
    /// Payload was not `authcid \0 authzid \0 password`.
    Malformed,
    /// authzid differed from authcid.
    AuthzidMismatch,
}

impl std::fmt::Display for PlainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PlainError::Base64 => "invalid base64 encoding",
            PlainError::Malformed => "invalid authentication blob",
            PlainError::AuthzidMismatch => "authzid and authcid should be the same",
        })
    }
}

/// Decode an accumulated base64 PLAIN blob.
///
/// The payload is `authcid \0 authzid \0 password` as the daemon's
/// clients send it; an empty authzid defaults to authcid, any other
/// mismatch is rejected.
pub fn parse_plain(blob: &str) -> Result<PlainCredentials, PlainError> {
    let decoded = BASE64.decode(blob).map_err(|_| PlainError::Base64)?;
    let parts: Vec<&[u8]> = decoded.split(|&b| b == 0).collect();
    if parts.len() != 3 {
        return Err(PlainError::Malformed);
    }

    let authcid = String::from_utf8(parts[0].to_vec()).map_err(|_| PlainError::Malformed)?;
    let authzid = String::from_utf8(parts[1].to_vec()).map_err(|_| PlainError::Malformed)?;
    let password = String::from_utf8(parts[2].to_vec()).map_err(|_| PlainError::Malformed)?;

    if authcid.is_empty() {
        return Err(PlainError::Malformed);
    }
    if !authzid.is_empty() && authzid != authcid {
        return Err(PlainError::AuthzidMismatch);
    }

    Ok(PlainCredentials { authcid, password })
}

/// Encode credentials the way a client would send them.
pub fn encode_plain(username: &str, password: &str) -> String {
    BASE64.encode(format!("{}\0{}\0{}", username, username, password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_valid_blob() {
        let blob = encode_plain("admin", "hunter2");
        let creds = parse_plain(&blob).unwrap();
        assert_eq!(creds.authcid, "admin");
        assert_eq!(creds.password, "hunter2");
    }

    #[test]
    fn empty_authzid_defaults() {
        let blob = BASE64.encode(b"admin\0\0hunter2");
        assert!(parse_plain(&blob).is_ok());
    }

    #[test]
    fn rejects_mismatched_authzid() {
        let blob = BASE64.encode(b"admin\0other\0hunter2");
        assert_eq!(parse_plain(&blob), Err(PlainError::AuthzidMismatch));
    }

    #[test]
    fn rejects_bad_blobs() {
        assert_eq!(parse_plain("!!not-base64!!"), Err(PlainError::Base64));
        let blob = BASE64.encode(b"no-separators");
        assert_eq!(parse_plain(&blob), Err(PlainError::Malformed));
    }
}
