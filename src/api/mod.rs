//! Route wiring and shared application state, generalizing the teacher's
//! `ws.rs::build_router` (routes + CORS layer over one `Arc<AppState>`) to
//! the full REST + WS surface.

pub mod auth;
pub mod drift;
pub mod health;
pub mod notifications;
pub mod projects;
pub mod replay;
pub mod spans;
pub mod traces;
pub mod websocket;

use std::sync::Arc;

use axum::http::Method;
use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::Config;
use crate::db::Db;
use crate::encryption::Encryptor;
use crate::hub::Hub;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::request_id::request_id_middleware;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<Config>,
    pub hub: Arc<Hub>,
    pub encryptor: Encryptor,
}

pub fn build_router(state: AppState) -> Router {
    let cors_origins: Vec<_> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(cors_origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::PUT])
        .allow_headers(tower_http::cors::Any);

    let limiter = Arc::new(RateLimiter::new(
        state.config.rate_limit_requests,
        state.config.rate_limit_window_seconds,
    ));

    let v1 = Router::new()
        .route("/traces", post(traces::ingest_batch).get(traces::list))
        .route(
            "/traces/{id}",
            get(traces::get_one).patch(traces::patch_one),
        )
        .route("/traces/{id}/events/{span_id}", post(traces::append_event))
        .route("/traces/{id}/replay", post(replay::estimate))
        .route("/traces/{id}/replay/{run_id}/confirm", post(replay::confirm))
        .route("/traces/{id}/replay/{run_id}/cancel", post(replay::cancel))
        .route("/traces/{id}/replay/{run_id}", get(replay::status))
        .route("/traces/{id}/replay/{run_id}/diff", get(replay::diff))
        .route("/spans", get(spans::list))
        .route("/projects", post(projects::create).get(projects::list))
        .route("/projects/{id}", get(projects::get_one))
        .route("/projects/{id}/rotate-key", post(projects::rotate_key))
        .route(
            "/projects/{id}/settings",
            get(projects::get_settings).put(projects::update_settings),
        )
        .route("/drift/alerts", get(drift::list_alerts))
        .route("/drift/summary", get(drift::summary))
        .route("/drift/alerts/{id}/resolve", patch(drift::resolve))
        .route(
            "/notifications",
            get(notifications::list).post(notifications::create),
        )
        .route(
            "/notifications/{id}/read",
            patch(notifications::mark_read),
        )
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    Router::new()
        .nest("/v1", v1)
        .route("/ws", get(websocket::handler))
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .layer(cors)
        .with_state(state)
}
