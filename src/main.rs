mod api;
mod auth;
mod config;
mod db;
mod drift;
mod encryption;
mod error;
mod hub;
mod ingest;
mod llm;
mod notifications;
mod query;
mod rate_limit;
mod replay;
mod request_id;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use config::Config;
use db::Db;
use drift::scheduler::DriftScheduler;
use encryption::Encryptor;
use hub::Hub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("vigil_server={},tower_http=info", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = Db::open(&config.database_url)?;

    let recovered = db.fail_stuck_replay_runs().await?;
    if recovered > 0 {
        tracing::warn!(count = recovered, "marked stuck replay runs as failed after restart");
    }

    let hub = Arc::new(Hub::new());
    let encryptor = Encryptor::new(&config.encryption_key);
    let config = Arc::new(config);

    let scheduler = Arc::new(DriftScheduler::new());
    scheduler.start(db.clone(), hub.clone()).await;

    let state = AppState {
        db,
        config: config.clone(),
        hub,
        encryptor,
    };

    let app = api::build_router(state);

    let addr: SocketAddr = config.bind_addr().parse()?;
    info!(%addr, "starting vigil-server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    scheduler.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
