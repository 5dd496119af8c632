//! Error taxonomy and the global JSON error response, mirroring
//! `vigil_server.exceptions` in the original Python server.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    #[error("{resource} '{identifier}' not found")]
    NotFound { resource: String, identifier: String },

    #[error("{0}")]
    Validation(String),

    #[error("Missing or invalid Authorization header")]
    AuthMissing,

    #[error("Invalid API key")]
    AuthInvalid,

    #[error("{0}")]
    AuthForbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },

    #[error("{0}")]
    Storage(String),

    #[error("{0}")]
    ProviderFailure(String),

    #[error("Decryption failed — encryption key may have changed")]
    Decryption,

    #[error("Replay run is not in a state that allows this operation")]
    InvalidReplayState,
}

impl VigilError {
    pub fn not_found(resource: impl Into<String>, identifier: impl Into<String>) -> Self {
        VigilError::NotFound {
            resource: resource.into(),
            identifier: identifier.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            VigilError::NotFound { .. } => StatusCode::NOT_FOUND,
            VigilError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            VigilError::AuthMissing | VigilError::AuthInvalid => StatusCode::UNAUTHORIZED,
            VigilError::AuthForbidden(_) => StatusCode::FORBIDDEN,
            VigilError::Conflict(_) => StatusCode::CONFLICT,
            VigilError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            VigilError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            VigilError::ProviderFailure(_) => StatusCode::BAD_GATEWAY,
            VigilError::Decryption => StatusCode::INTERNAL_SERVER_ERROR,
            VigilError::InvalidReplayState => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for VigilError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            VigilError::Storage(msg) => tracing::error!(error = %msg, "storage failure"),
            VigilError::Decryption => tracing::error!("decryption failure"),
            _ => tracing::warn!(error = %self, status = %status.as_u16(), "request error"),
        }

        let body = json!({ "error": self.to_string() });
        let mut resp = (status, Json(body)).into_response();

        if let VigilError::RateLimited { retry_after_secs } = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                resp.headers_mut().insert("Retry-After", value);
            }
        }
        resp
    }
}

pub type VigilResult<T> = Result<T, VigilError>;

/// Maps a rusqlite/r2d2 failure to an opaque storage error — no DB
/// internals are ever leaked to clients, only to the server log.
pub fn storage_err(context: &str, err: impl std::fmt::Display) -> VigilError {
    tracing::error!(error = %err, "{context}");
    VigilError::Storage(format!("Failed to {context}"))
}
