//! Certificate gate middleware
//!
//! Runs in front of every `/users` route. Authentication happens first (401
//! when the connection carried no usable certificate), then the trust check
//! (403 for untrusted chains outside the creation route). On success the
//! caller's [`AuthenticatedClient`](certgate_core::AuthenticatedClient) is
//! stored in the request extensions.

use axum::{extract::Request, middleware::Next, response::Response};
use certgate_core::{authenticate, authorize, PeerCertificate};
use tracing::debug;

use crate::api::error::ApiError;

pub async fn gate(mut request: Request, next: Next) -> Result<Response, ApiError> {
    // A request that never went through the TLS listener has no certificate
    let peer = request
        .extensions()
        .get::<PeerCertificate>()
        .cloned()
        .unwrap_or_default();

    let client = authenticate(Some(&peer))?;
    let decision = authorize(&peer, request.method().as_str(), request.uri().path())?;

    debug!(
        user_id = %client.user_id,
        decision = ?decision,
        path = %request.uri().path(),
        "Client admitted"
    );
    request.extensions_mut().insert(client);
    Ok(next.run(request).await)
}
