//! # Certgate Core
//!
//! Identity, trust and patch primitives for the certgate mutual-TLS
//! identity service.
//!
//! ## Key Concepts
//!
//! - **User ID**: SHA-256 over the base64 text of a client certificate's DER bytes
//! - **Trust verdict**: the transport's decision on whether a certificate chains
//!   to a configured root
//! - **Info document**: the per-user JSON object clients read and patch
//! - **Patch modes**: RFC 6902 JSON Patch, or a merge patch that is converted
//!   into RFC 6902 operations before it is applied
//!
//! Nothing in this crate performs I/O. Storage, transport and HTTP live in
//! `certgate-server`.

pub mod authorization;
pub mod engine;
pub mod error;
pub mod identity;
pub mod keypath;
pub mod patch;
pub mod record;

pub use authorization::{
    authenticate, authorize, is_user_creation, AuthenticatedClient, Decision, PeerCertificate,
};
pub use engine::{InfoPatchEngine, PatchMode, PatchOutcome};
pub use error::{CertgateError, ErrorKind, Result};
pub use identity::{derive_user_id, user_id_from_base64, UserId};
pub use keypath::{project, KeyPath};
pub use patch::{Patch, PatchFailure, PatchOperation};
pub use record::{AliasInput, InfoDocument, UserRecord};
