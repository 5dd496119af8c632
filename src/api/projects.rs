use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::auth::extract::{CurrentProject, GuestProject};
use crate::encryption::mask_key;
use crate::error::VigilResult;

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Serialize)]
pub struct ProjectResponse {
    id: String,
    name: String,
    description: String,
    api_key: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    _auth: CurrentProject,
    Json(req): Json<CreateProjectRequest>,
) -> VigilResult<(StatusCode, Json<ProjectResponse>)> {
    let (project, key) = state.db.create_project(req.name, req.description).await?;
    Ok((
        StatusCode::CREATED,
        Json(ProjectResponse {
            id: project.id,
            name: project.name,
            description: project.description,
            api_key: Some(key.key),
        }),
    ))
}

pub async fn list(State(state): State<AppState>, _guest: GuestProject) -> VigilResult<Json<Vec<ProjectResponse>>> {
    let projects = state.db.list_projects().await?;
    Ok(Json(
        projects
            .into_iter()
            .map(|p| ProjectResponse {
                id: p.id,
                name: p.name,
                description: p.description,
                api_key: None,
            })
            .collect(),
    ))
}

pub async fn get_one(
    State(state): State<AppState>,
    _guest: GuestProject,
    Path(id): Path<String>,
) -> VigilResult<Json<ProjectResponse>> {
    let project = state.db.get_project(&id).await?;
    Ok(Json(ProjectResponse {
        id: project.id,
        name: project.name,
        description: project.description,
        api_key: None,
    }))
}

#[derive(Serialize)]
pub struct RotateKeyResponse {
    api_key: String,
}

pub async fn rotate_key(
    State(state): State<AppState>,
    _auth: CurrentProject,
    Path(id): Path<String>,
) -> VigilResult<(StatusCode, Json<RotateKeyResponse>)> {
    let key = state.db.rotate_key(&id).await?;
    Ok((StatusCode::CREATED, Json(RotateKeyResponse { api_key: key.key })))
}

#[derive(Serialize)]
pub struct SettingsResponse {
    project_id: String,
    openai_key_set: bool,
    openai_key_masked: Option<String>,
    anthropic_key_set: bool,
    anthropic_key_masked: Option<String>,
    default_openai_model: String,
    default_anthropic_model: String,
    drift_check_interval_minutes: i64,
    drift_check_enabled: bool,
}

pub async fn get_settings(
    State(state): State<AppState>,
    _guest: GuestProject,
    Path(id): Path<String>,
) -> VigilResult<Json<SettingsResponse>> {
    let settings = state.db.get_or_create_settings(&id).await?;
    Ok(Json(build_settings_response(&state, settings)))
}

#[derive(Deserialize)]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    openai_api_key: Option<String>,
    #[serde(default)]
    anthropic_api_key: Option<String>,
    #[serde(default)]
    default_openai_model: Option<String>,
    #[serde(default)]
    default_anthropic_model: Option<String>,
    #[serde(default)]
    drift_check_interval_minutes: Option<i64>,
    #[serde(default)]
    drift_check_enabled: Option<bool>,
}

pub async fn update_settings(
    State(state): State<AppState>,
    _auth: CurrentProject,
    Path(id): Path<String>,
    Json(req): Json<UpdateSettingsRequest>,
) -> VigilResult<Json<SettingsResponse>> {
    let openai_encrypted = req
        .openai_api_key
        .map(|k| state.encryptor.encrypt(&k).map(Some))
        .transpose()?;
    let anthropic_encrypted = req
        .anthropic_api_key
        .map(|k| state.encryptor.encrypt(&k).map(Some))
        .transpose()?;

    let settings = state
        .db
        .update_settings(
            &id,
            openai_encrypted,
            anthropic_encrypted,
            req.default_openai_model,
            req.default_anthropic_model,
            req.drift_check_interval_minutes,
            req.drift_check_enabled,
        )
        .await?;
    Ok(Json(build_settings_response(&state, settings)))
}

fn build_settings_response(state: &AppState, settings: crate::db::models::ProjectSettings) -> SettingsResponse {
    let openai_masked = settings
        .openai_api_key_encrypted
        .as_deref()
        .and_then(|c| state.encryptor.decrypt(c).ok())
        .map(|k| mask_key(&k));
    let anthropic_masked = settings
        .anthropic_api_key_encrypted
        .as_deref()
        .and_then(|c| state.encryptor.decrypt(c).ok())
        .map(|k| mask_key(&k));

    SettingsResponse {
        project_id: settings.project_id,
        openai_key_set: openai_masked.is_some(),
        openai_key_masked: openai_masked,
        anthropic_key_set: anthropic_masked.is_some(),
        anthropic_key_masked: anthropic_masked,
        default_openai_model: settings.default_openai_model,
        default_anthropic_model: settings.default_anthropic_model,
        drift_check_interval_minutes: settings.drift_check_interval_minutes,
        drift_check_enabled: settings.drift_check_enabled,
    }
}
