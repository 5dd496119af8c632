//! Live-update websocket endpoint, generalizing the teacher's `ws.rs`
//! single-channel broadcast loop to per-project subscriptions resolved
//! from a `?token=` query credential instead of a fixed global feed.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::debug;

use super::AppState;

/// Close code for a connection that failed websocket-level auth, kept
/// outside the 1000-1015 range reserved by the protocol for transport
/// concerns.
const CLOSE_INVALID_TOKEN: u16 = 4001;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// `token` is mandatory, matching the original websocket route: there is no
/// anonymous/guest path here, only valid-token-connects and invalid-or-
/// missing-token-gets-closed.
pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let project_id = match query.token {
        Some(token) => resolve(&token, &state).await,
        None => None,
    };

    match project_id {
        Some(project_id) => ws.on_upgrade(move |socket| handle_socket(socket, state, project_id)),
        None => ws.on_upgrade(|socket| reject(socket)),
    }
}

async fn resolve(token: &str, state: &AppState) -> Option<String> {
    crate::auth::extract::resolve_project_id(token, state).await
}

async fn reject(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_INVALID_TOKEN,
            reason: "invalid or missing token".into(),
        })))
        .await;
}

async fn handle_socket(mut socket: WebSocket, state: AppState, project_id: String) {
    let mut rx = state.hub.subscribe(&project_id);
    debug!(project_id, "websocket client connected");

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Ok(event) => {
                        if socket.send(Message::Text((*event).to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!(project_id, skipped = n, "websocket client lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    debug!(project_id, "websocket client disconnected");
}
