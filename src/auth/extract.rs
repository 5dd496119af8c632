//! Axum extractors resolving a bearer token to a project id, mirroring
//! `dependencies.py::_resolve_project_id`'s order: JWT → dev API key →
//! database API key. JWT subjects and the dev key both resolve to the
//! literal project id `"default"`.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::http::StatusCode;

use super::verify_access_token;
use crate::api::AppState;
use crate::error::VigilError;

pub(crate) const DEFAULT_PROJECT_ID: &str = "default";

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Shared by the `CurrentProject`/`GuestProject` extractors and the
/// websocket handshake, which authenticates via a `?token=` query param
/// instead of an `Authorization` header.
pub(crate) async fn resolve_project_id(token: &str, state: &AppState) -> Option<String> {
    if verify_access_token(token, &state.config.jwt_secret).is_some() {
        return Some(DEFAULT_PROJECT_ID.to_string());
    }
    if token == state.config.api_key {
        return Some(DEFAULT_PROJECT_ID.to_string());
    }
    state.db.resolve_api_key(token).await.ok().flatten()
}

/// Requires a valid bearer credential; rejects with 401 otherwise.
pub struct CurrentProject(pub String);

impl<S> FromRequestParts<S> for CurrentProject
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = VigilError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let token = bearer_token(parts).ok_or(VigilError::AuthMissing)?;
        let project_id = resolve_project_id(token, &app_state)
            .await
            .ok_or(VigilError::AuthInvalid)?;
        Ok(CurrentProject(project_id))
    }
}

/// Falls back to the `"default"` project on missing/invalid bearer, for
/// read-only endpoints that permit anonymous dashboard browsing.
pub struct GuestProject(pub String);

impl<S> FromRequestParts<S> for GuestProject
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let project_id = match bearer_token(parts) {
            Some(token) => resolve_project_id(token, &app_state)
                .await
                .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string()),
            None => DEFAULT_PROJECT_ID.to_string(),
        };
        Ok(GuestProject(project_id))
    }
}
