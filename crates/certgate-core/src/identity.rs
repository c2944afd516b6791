//! Certificate-derived user identity
//!
//! A user ID is the lowercase hex SHA-256 digest of the *base64 text* of the
//! certificate's DER bytes. Hashing the text rather than the raw bytes keeps
//! IDs compatible with records created from base64-encoded certificates, so
//! both entry points below must agree.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{CertgateError, Result};

/// Length of a rendered user ID (hex SHA-256)
pub const USER_ID_LEN: usize = 64;

/// Stable identifier derived from a client certificate
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Whether `candidate` has the shape of a user ID (64 lowercase hex chars)
    pub fn is_well_formed(candidate: &str) -> bool {
        candidate.len() == USER_ID_LEN
            && candidate
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the user ID for raw DER certificate bytes.
///
/// The certificate structure is not inspected; only the presence of bytes is
/// checked.
pub fn derive_user_id(der: &[u8]) -> Result<UserId> {
    if der.is_empty() {
        return Err(CertgateError::InvalidInput("Cert cannot be empty".into()));
    }
    user_id_from_base64(&STANDARD.encode(der))
}

/// Derive the user ID for a certificate already rendered as base64 text.
pub fn user_id_from_base64(cert_base64: &str) -> Result<UserId> {
    if cert_base64.is_empty() {
        return Err(CertgateError::InvalidInput("Cert cannot be empty".into()));
    }
    let digest = Sha256::digest(cert_base64.as_bytes());
    Ok(UserId(hex::encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let a = derive_user_id(b"certificate-bytes").unwrap();
        let b = derive_user_id(b"certificate-bytes").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), USER_ID_LEN);
        assert!(UserId::is_well_formed(a.as_str()));
    }

    #[test]
    fn test_distinct_inputs_distinct_ids() {
        let a = derive_user_id(b"cert-a").unwrap();
        let b = derive_user_id(b"cert-b").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hashes_base64_text_not_raw_bytes() {
        let der = b"\x30\x82\x01\x0a";
        let id = derive_user_id(der).unwrap();

        let text = STANDARD.encode(der);
        let expected = hex::encode(Sha256::digest(text.as_bytes()));
        assert_eq!(id.as_str(), expected);

        let raw = hex::encode(Sha256::digest(der));
        assert_ne!(id.as_str(), raw);
    }

    #[test]
    fn test_base64_entry_point_agrees() {
        let der = b"some der payload";
        let from_der = derive_user_id(der).unwrap();
        let from_text = user_id_from_base64(&STANDARD.encode(der)).unwrap();
        assert_eq!(from_der, from_text);
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = derive_user_id(&[]).unwrap_err();
        assert_eq!(err.status_code(), 400);

        let err = user_id_from_base64("").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_known_vector() {
        // sha256("YWJj"), i.e. base64 of "abc"
        let id = derive_user_id(b"abc").unwrap();
        assert_eq!(id.as_str(), hex::encode(Sha256::digest(b"YWJj")));
    }

    #[test]
    fn test_is_well_formed() {
        assert!(!UserId::is_well_formed("alice"));
        assert!(!UserId::is_well_formed(&"A".repeat(64)));
        assert!(UserId::is_well_formed(&"0f".repeat(32)));
    }
}
