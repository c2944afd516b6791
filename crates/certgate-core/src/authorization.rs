//! Client authentication and trust authorization
//!
//! Two checks run on every gated request, strictly in this order:
//!
//! 1. **Authentication**: a certificate must have been presented on the
//!    connection and must yield a user ID. Failure is `Unauthenticated` (401).
//! 2. **Authorization**: the transport's chain-trust verdict decides. A trusted
//!    chain is always allowed. An untrusted chain is only allowed to register a
//!    new identity (`POST /user` or `POST /users`); everything else is
//!    `Forbidden` (403).
//!
//! The chain itself is never re-verified here. The transport's verdict is the
//! single source of truth.

use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{debug, warn};

use crate::error::{CertgateError, Result};
use crate::identity::{user_id_from_base64, UserId};

/// Message returned when no identity can be extracted from the connection
pub const UNAUTHENTICATED_MESSAGE: &str = "could not extract certificate from request";

/// Message returned when an untrusted certificate hits a non-exempt route
pub const FORBIDDEN_MESSAGE: &str = "certificate not signed by this organization";

/// What the transport knows about the peer certificate of a connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerCertificate {
    /// Raw DER bytes of the end-entity certificate, if one was presented
    pub der: Option<Vec<u8>>,
    /// Whether the certificate chains to a configured trusted root
    pub chain_trusted: bool,
    /// Verification failure reported by the transport, if any
    pub chain_error: Option<String>,
}

impl PeerCertificate {
    /// A certificate that chains to a trusted root
    pub fn trusted(der: impl Into<Vec<u8>>) -> Self {
        Self {
            der: Some(der.into()),
            chain_trusted: true,
            chain_error: None,
        }
    }

    /// A certificate that failed chain verification
    pub fn untrusted(der: impl Into<Vec<u8>>, error: impl Into<String>) -> Self {
        Self {
            der: Some(der.into()),
            chain_trusted: false,
            chain_error: Some(error.into()),
        }
    }

    /// No certificate was presented
    pub fn absent() -> Self {
        Self::default()
    }
}

/// Identity established for a request that passed authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedClient {
    pub user_id: UserId,
    /// Base64 text of the DER certificate the ID was derived from
    pub cert_base64: String,
    pub chain_trusted: bool,
}

/// Outcome of the trust state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Certificate chains to a trusted root
    TrustedChain,
    /// Untrusted certificate registering a new identity
    CreationExemption,
    /// Untrusted certificate on any other route
    Denied,
}

/// Extract the caller's identity from the peer certificate.
pub fn authenticate(peer: Option<&PeerCertificate>) -> Result<AuthenticatedClient> {
    let peer = peer.ok_or_else(unauthenticated)?;
    let der = match peer.der.as_deref() {
        Some(der) if !der.is_empty() => der,
        _ => return Err(unauthenticated()),
    };

    let cert_base64 = STANDARD.encode(der);
    let user_id = user_id_from_base64(&cert_base64).map_err(|_| unauthenticated())?;

    Ok(AuthenticatedClient {
        user_id,
        cert_base64,
        chain_trusted: peer.chain_trusted,
    })
}

/// Run the trust state machine without raising an error.
pub fn evaluate(peer: &PeerCertificate, method: &str, path: &str) -> Decision {
    if peer.chain_trusted {
        Decision::TrustedChain
    } else if is_user_creation(method, path) {
        Decision::CreationExemption
    } else {
        Decision::Denied
    }
}

/// Decide whether the request may proceed.
///
/// # Security
/// Must only be called after [`authenticate`] succeeded for the same request.
pub fn authorize(peer: &PeerCertificate, method: &str, path: &str) -> Result<Decision> {
    let decision = evaluate(peer, method, path);
    match decision {
        Decision::TrustedChain => Ok(decision),
        Decision::CreationExemption => {
            debug!(
                method = %method,
                path = %path,
                chain_error = ?peer.chain_error,
                "Untrusted certificate admitted for user creation"
            );
            Ok(decision)
        }
        Decision::Denied => {
            warn!(
                method = %method,
                path = %path,
                chain_error = ?peer.chain_error,
                "SECURITY: untrusted certificate rejected"
            );
            Err(CertgateError::Forbidden(FORBIDDEN_MESSAGE.into()))
        }
    }
}

/// Whether the method and path address the user-creation route.
///
/// Matches `/user` and `/users` case-insensitively, with `POST` only.
pub fn is_user_creation(method: &str, path: &str) -> bool {
    if !method.eq_ignore_ascii_case("POST") {
        return false;
    }
    let path = path.split('?').next().unwrap_or_default();
    path.eq_ignore_ascii_case("/user") || path.eq_ignore_ascii_case("/users")
}

fn unauthenticated() -> CertgateError {
    CertgateError::Unauthenticated(UNAUTHENTICATED_MESSAGE.into())
}
