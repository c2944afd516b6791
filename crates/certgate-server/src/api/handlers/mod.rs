//! API request handlers

pub mod info;
pub mod patch;
pub mod users;

pub use info::{get_info, get_namespace_info, InfoQuery};
pub use patch::patch_user;
pub use users::{create_user, CreateUserQuery, CreateUserRequest};

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::api::error::ApiError;
use crate::config::GatewayConfig;
use crate::directory::UserDirectory;

/// Application state shared across handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub directory: UserDirectory,
    pub config: GatewayConfig,
}

/// Decode an optional JSON body; an empty body yields the default value.
pub(crate) fn optional_json<T>(body: &Bytes) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}
