//! Error types shared by every certgate component

use thiserror::Error;

/// Result type alias using CertgateError
pub type Result<T> = std::result::Result<T, CertgateError>;

/// Coarse failure classes, each mapped to one HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// Default HTTP status for this kind
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidInput => 400,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }
}

/// Errors raised by identity derivation, authorization, the user directory
/// and the patch engine.
///
/// The display form is the client-facing message, so variants carry the full
/// text rather than a prefix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertgateError {
    /// Malformed or missing input
    #[error("{0}")]
    InvalidInput(String),

    /// No client certificate could be extracted
    #[error("{0}")]
    Unauthenticated(String),

    /// Certificate does not chain to a trusted root
    #[error("{0}")]
    Forbidden(String),

    /// User, namespace or key does not exist
    #[error("{0}")]
    NotFound(String),

    /// Duplicate user or alias, or a lost compare-and-swap race
    #[error("{0}")]
    Conflict(String),

    /// Patch validation failure or unexpected store failure
    #[error("{0}")]
    Internal(String),
}

impl CertgateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CertgateError::InvalidInput(_) => ErrorKind::InvalidInput,
            CertgateError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            CertgateError::Forbidden(_) => ErrorKind::Forbidden,
            CertgateError::NotFound(_) => ErrorKind::NotFound,
            CertgateError::Conflict(_) => ErrorKind::Conflict,
            CertgateError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Client-facing message without any kind prefix
    pub fn message(&self) -> &str {
        match self {
            CertgateError::InvalidInput(msg)
            | CertgateError::Unauthenticated(msg)
            | CertgateError::Forbidden(msg)
            | CertgateError::NotFound(msg)
            | CertgateError::Conflict(msg)
            | CertgateError::Internal(msg) => msg,
        }
    }
}
