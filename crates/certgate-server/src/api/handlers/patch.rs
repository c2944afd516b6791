//! Info and alias patch handler

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    Extension, Json,
};
use certgate_core::{AuthenticatedClient, PatchMode};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::{optional_json, AppState};
use crate::api::error::ApiError;
use crate::directory::PatchRequest;

/// Patch the caller's info document and aliases
///
/// PATCH /users
///
/// `Content-Type: application/json-patch+json` treats `info` as RFC 6902
/// operations; `application/merge-patch+json` treats it as an RFC 7386
/// merge patch. `aliases` maps alias names to keep (`true`) or drop
/// (`false`). Returns `{}`.
pub async fn patch_user(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<AuthenticatedClient>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let content_type = match headers.get(CONTENT_TYPE) {
        None => None,
        Some(value) => Some(value.to_str().map_err(|_| {
            ApiError::BadRequest("Content-type header value is invalid".into())
        })?),
    };
    let mode = PatchMode::from_content_type(content_type)?;

    let request: PatchRequest = optional_json(&body)?;
    info!(
        user_id = %client.user_id,
        content_type = mode.content_type(),
        info = request.info.is_some(),
        aliases = request.aliases.is_some(),
        "Received request to patch user"
    );

    state
        .directory
        .patch_user(client.user_id.as_str(), &request, mode)
        .await?;
    Ok(Json(json!({})))
}
