use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::auth::{create_access_token, hash_password, verify_password};
use crate::error::{VigilError, VigilResult};

#[derive(Deserialize)]
pub struct RegisterRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    id: String,
    email: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> VigilResult<(StatusCode, Json<UserResponse>)> {
    if req.password.len() < 8 {
        return Err(VigilError::Validation("password must be at least 8 characters".to_string()));
    }
    if state.db.get_user_by_email(&req.email).await?.is_some() {
        return Err(VigilError::Conflict("email already registered".to_string()));
    }

    let hashed = hash_password(&req.password)?;
    let user = state.db.create_user(req.email, hashed).await?;

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: user.id,
            email: user.email,
        }),
    ))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    access_token: String,
    token_type: &'static str,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> VigilResult<Json<LoginResponse>> {
    let user = state
        .db
        .get_user_by_email(&req.email)
        .await?
        .ok_or(VigilError::AuthInvalid)?;

    if !verify_password(&req.password, &user.hashed_password) {
        return Err(VigilError::AuthInvalid);
    }
    if !user.is_active {
        return Err(VigilError::AuthForbidden("account is inactive".to_string()));
    }

    let token = create_access_token(&user.id, &state.config.jwt_secret, state.config.jwt_expire_minutes)?;
    Ok(Json(LoginResponse {
        access_token: token,
        token_type: "bearer",
    }))
}
