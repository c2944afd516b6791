//! Certgate Server
//!
//! A mutual-TLS identity gateway. Clients present an X.509 certificate during
//! the handshake; the gateway derives their user ID from it, decides whether
//! the certificate chains to a trusted root, and lets known users read and
//! patch a per-user info document.
//!
//! ## API Endpoints
//!
//! ### Health (no certificate required)
//! - `GET /` - Liveness banner
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness check with user count
//!
//! ### Gated
//! - `POST /users` (also `/user`) - Register the caller's certificate;
//!   reachable with an untrusted certificate
//! - `GET /users/info` - The caller's info, optionally filtered by `keys`
//! - `GET /users/info/{namespace}` - One namespace of the caller's info
//! - `PATCH /users` - JSON Patch or merge patch on info, alias changes

pub mod api;
pub mod config;
pub mod directory;
pub mod storage;
pub mod transport;

pub use api::create_router;
pub use api::handlers::AppState;
pub use config::{GatewayConfig, Zone};
pub use directory::{DirectoryError, PatchRequest, Resolution, UserDirectory};
pub use storage::{MemoryStore, StorageError, UserStore, UserUpdate};
pub use transport::{TlsSetup, TransportError};
