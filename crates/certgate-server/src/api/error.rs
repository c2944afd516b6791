//! API error types and responses
//!
//! Every failure leaves the gateway in the same shape:
//!
//! ```json
//! { "statusCode": 404, "message": "User 'x' not found" }
//! ```
//!
//! `stack` is added for server-side failures and carries the error's source
//! chain. `extra` carries structured detail such as the parser position of a
//! malformed JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use certgate_core::CertgateError;
use serde::Serialize;
use serde_json::{error::Category, json, Value};
use std::error::Error as StdError;
use thiserror::Error;
use tracing::{error, warn};

use crate::directory::{DirectoryError, CONCURRENT_MODIFICATION_MESSAGE, DUPLICATE_USER_MESSAGE};
use crate::storage::StorageError;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),

    #[error("{}", body_problem(.0))]
    MalformedBody(#[source] serde_json::Error),

    #[error("Storage failure")]
    Storage(#[source] StorageError),
}

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render the wire body
    pub fn to_body(&self) -> ErrorResponse {
        let status = self.status();
        let (message, extra) = match self {
            ApiError::MalformedBody(e) => (
                format!("{}: {}", self, e),
                Some(json!({ "line": e.line(), "column": e.column() })),
            ),
            ApiError::Storage(e) => (e.to_string(), None),
            other => (other.to_string(), None),
        };

        ErrorResponse {
            status_code: status.as_u16(),
            message,
            stack: status.is_server_error().then(|| error_chain(self)),
            extra,
        }
    }
}

fn body_problem(err: &serde_json::Error) -> &'static str {
    match err.classify() {
        Category::Syntax | Category::Eof => "Request body is not valid JSON",
        Category::Data | Category::Io => "Invalid request body",
    }
}

fn error_chain(err: &dyn StdError) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str("\n    caused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = self.to_body();
        let status = self.status();

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %body.message, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %body.message, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

impl From<CertgateError> for ApiError {
    fn from(err: CertgateError) -> Self {
        match err {
            CertgateError::InvalidInput(msg) => ApiError::BadRequest(msg),
            CertgateError::Unauthenticated(msg) => ApiError::Unauthorized(msg),
            CertgateError::Forbidden(msg) => ApiError::Forbidden(msg),
            CertgateError::NotFound(msg) => ApiError::NotFound(msg),
            CertgateError::Conflict(msg) => ApiError::Conflict(msg),
            CertgateError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => ApiError::NotFound(format!("User '{}' not found", id)),
            StorageError::AlreadyExists(_) => ApiError::Conflict(DUPLICATE_USER_MESSAGE.into()),
            StorageError::AliasTaken(alias) => {
                ApiError::Conflict(format!("Alias '{}' is already taken", alias))
            }
            StorageError::RevisionMismatch { .. } => {
                ApiError::Conflict(CONCURRENT_MODIFICATION_MESSAGE.into())
            }
            other => ApiError::Storage(other),
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Rejected(e) => e.into(),
            DirectoryError::Storage(e) => e.into(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::MalformedBody(err)
    }
}
