//! WebSocket upgrade handler and per-connection lifecycle.
//!
//! Each accepted connection gets a bounded outbound queue. The registry holds
//! the only strong sender; a writer task drains the queue into the socket while
//! the reader loop answers client frames and enforces the idle timeout. When
//! the reader exits, the connection's own registry entry is removed, which
//! closes the queue and lets the writer finish.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time;

use crate::AppState;

use super::events::{self, CLOSE_IDLE_TIMEOUT};
use super::handshake::{self, Recipient};

/// How long teardown waits for queued frames to flush before aborting the writer.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/{user_id}", get(ws_upgrade))
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, user_id, query.token))
}

async fn handle_connection(
    socket: WebSocket,
    state: AppState,
    claimed_user_id: i64,
    token: Option<String>,
) {
    let (mut ws_tx, ws_rx) = socket.split();

    let recipient = match handshake::authenticate(
        &state.tokens,
        state.users.as_ref(),
        claimed_user_id,
        token.as_deref(),
    )
    .await
    {
        Ok(recipient) => recipient,
        Err(e) => {
            tracing::debug!(
                claimed_user_id,
                code = e.close_code(),
                reason = %e,
                "connection refused"
            );
            let _ = send_close(&mut ws_tx, e.close_code(), e.reason()).await;
            return;
        }
    };

    run_connection(&state, recipient, ws_tx, ws_rx).await;
}

async fn run_connection(
    state: &AppState,
    recipient: Recipient,
    ws_tx: SplitSink<WebSocket, Message>,
    mut ws_rx: SplitStream<WebSocket>,
) {
    let (tx, rx) = mpsc::channel(state.config.ws_queue_capacity);
    // The reader keeps only a weak handle so that removing the registry entry
    // is enough to close the queue.
    let weak = tx.downgrade();
    let connection_id = state
        .connections
        .register(recipient.user_id, recipient.role, tx);

    tracing::info!(
        user_id = recipient.user_id,
        role = %recipient.role,
        connection_id,
        active_connections = state.connections.count(),
        "connection established"
    );

    let mut writer = tokio::spawn(write_loop(ws_tx, rx));
    let mut writer_done = false;
    let idle = Duration::from_secs(state.config.ws_idle_timeout_secs);

    loop {
        tokio::select! {
            // Writer stopped: socket error, replaced, or purged by a broadcast.
            _ = &mut writer, if !writer_done => {
                writer_done = true;
                break;
            }

            next = time::timeout(idle, ws_rx.next()) => {
                match next {
                    Err(_elapsed) => {
                        tracing::debug!(user_id = recipient.user_id, connection_id, "idle timeout");
                        if let Some(tx) = weak.upgrade() {
                            let _ = tx.try_send(events::close(CLOSE_IDLE_TIMEOUT, "Idle timeout"));
                        }
                        break;
                    }
                    Ok(Some(Ok(Message::Text(_)))) => {
                        let queued = weak
                            .upgrade()
                            .is_some_and(|tx| tx.try_send(events::pong()).is_ok());
                        if !queued {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        tracing::debug!(?e, user_id = recipient.user_id, "ws read error");
                        break;
                    }
                    Ok(Some(Ok(_))) => continue,
                }
            }
        }
    }

    state
        .connections
        .remove_connection(recipient.user_id, connection_id);
    drop(weak);

    if !writer_done && time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }

    tracing::info!(
        user_id = recipient.user_id,
        connection_id,
        active_connections = state.connections.count(),
        "connection ended"
    );
}

/// Drain the outbound queue into the socket. Stops after a close frame, on a
/// send error, or once every sender is gone.
async fn write_loop(mut ws_tx: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if ws_tx.send(msg).await.is_err() || closing {
            return;
        }
    }
    let _ = ws_tx.close().await;
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &'static str,
) -> Result<(), axum::Error> {
    ws_tx.send(events::close(code, reason)).await
}
