//! Info read handlers

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use certgate_core::{AuthenticatedClient, InfoDocument, KeyPath};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::AppState;
use crate::api::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct InfoQuery {
    /// Dotted key paths separated by spaces or commas
    pub keys: Option<String>,
}

impl InfoQuery {
    fn key_paths(&self) -> Result<Vec<KeyPath>, ApiError> {
        match self.keys.as_deref() {
            Some(raw) => Ok(KeyPath::parse_list(raw)?),
            None => Ok(Vec::new()),
        }
    }
}

/// The caller's info document, optionally projected
///
/// GET /users/info?keys=a.b c
pub async fn get_info(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<AuthenticatedClient>,
    Query(query): Query<InfoQuery>,
) -> Result<Json<InfoDocument>, ApiError> {
    let keys = query.key_paths()?;
    info!(user_id = %client.user_id, keys = keys.len(), "Received request for info");

    let info = state
        .directory
        .get_info(client.user_id.as_str(), &keys)
        .await?;
    Ok(Json(info))
}

/// One namespace of the caller's info document
///
/// GET /users/info/{namespace}?keys=a.b c
pub async fn get_namespace_info(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<AuthenticatedClient>,
    Path(namespace): Path<String>,
    Query(query): Query<InfoQuery>,
) -> Result<Json<Value>, ApiError> {
    let keys = query.key_paths()?;
    info!(
        user_id = %client.user_id,
        namespace = %namespace,
        keys = keys.len(),
        "Received request for info namespace"
    );

    let value = state
        .directory
        .get_namespace(client.user_id.as_str(), &namespace, &keys)
        .await?;
    Ok(Json(value))
}
