//! HTTP surface of the gateway

pub mod error;
pub mod gate;
pub mod handlers;

use axum::{
    extract::State,
    http::Uri,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use error::ApiError;
use handlers::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Readiness check response
#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub zone: String,
    pub user_count: u64,
}

/// Liveness banner
///
/// GET /
pub async fn root() -> &'static str {
    "Up and running"
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Readiness check endpoint
///
/// GET /ready
pub async fn ready(State(state): State<Arc<AppState>>) -> Result<Json<ReadyResponse>, ApiError> {
    let user_count = state.directory.count_users().await?;

    Ok(Json(ReadyResponse {
        ready: true,
        zone: state.config.zone.to_string(),
        user_count,
    }))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("Cannot find {}", uri.path()))
}

/// Create the API router
///
/// `/users` routes sit behind the certificate gate; health endpoints do not.
pub fn create_router(state: Arc<AppState>) -> Router {
    let gated = Router::new()
        .route("/users", post(handlers::create_user).patch(handlers::patch_user))
        .route("/user", post(handlers::create_user))
        .route("/users/info", get(handlers::get_info))
        .route("/users/info/{namespace}", get(handlers::get_namespace_info))
        .route_layer(middleware::from_fn(gate::gate));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .merge(gated)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
