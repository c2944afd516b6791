//! User creation handler
//!
//! The caller's identity comes from the connection's client certificate, so
//! creation is the one route an untrusted certificate may reach.

use axum::{
    body::Bytes,
    extract::{Query, State},
    Extension, Json,
};
use certgate_core::{AliasInput, AuthenticatedClient, UserRecord};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::{optional_json, AppState};
use crate::api::error::ApiError;

/// Optional JSON body of a creation request
#[derive(Debug, Default, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub aliases: Option<AliasInput>,
}

/// Query parameters of a creation request
#[derive(Debug, Default, Deserialize)]
pub struct CreateUserQuery {
    /// Comma-separated aliases
    pub aliases: Option<String>,
}

impl CreateUserQuery {
    fn alias_input(&self) -> Option<AliasInput> {
        self.aliases
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(|raw| AliasInput::Many(raw.split(',').map(str::to_string).collect()))
    }
}

/// Register the caller's certificate as a new user
///
/// POST /users (also /user)
///
/// Aliases come from the body when it names any, otherwise from the
/// `aliases` query parameter. Returns the created record.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<AuthenticatedClient>,
    Query(query): Query<CreateUserQuery>,
    body: Bytes,
) -> Result<Json<UserRecord>, ApiError> {
    let request: CreateUserRequest = optional_json(&body)?;
    let aliases = request.aliases.or_else(|| query.alias_input());

    info!(
        user_id = %client.user_id,
        chain_trusted = client.chain_trusted,
        aliases = ?aliases,
        "Received request to create user"
    );

    let record = state
        .directory
        .create(&client.cert_base64, aliases.as_ref())
        .await?;
    Ok(Json(record))
}
