//! WebSocket command channel
//!
//! Text frames carry [`ClientCommand`] JSON. Everything the engine sends to
//! the connection (broadcasts, catch-up, replies, errors) is forwarded as
//! [`ServerMessage`] JSON by a dedicated writer task, in queue order.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::sync::Arc;
use teamplay_common::{ClientCommand, ConnectionId};
use tracing::{debug, info, warn};

use crate::api::server::AppContext;
use crate::error::{Error, Result};
use crate::playback::TeamSyncEngine;
use crate::sync::ConnectionHub;

/// Leaves every team and unregisters the connection when dropped
pub(crate) struct ConnectionGuard {
    conn: ConnectionId,
    engine: Arc<TeamSyncEngine>,
    hub: Arc<ConnectionHub>,
}

impl ConnectionGuard {
    pub(crate) fn new(conn: ConnectionId, engine: Arc<TeamSyncEngine>, hub: Arc<ConnectionHub>) -> Self {
        Self { conn, engine, hub }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let teams = self.engine.disconnect(self.conn);
        self.hub.unregister(self.conn);
        debug!(connection = %self.conn, teams = teams.len(), "Connection cleanup");
    }
}

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(ctx): State<AppContext>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: AppContext) {
    let (mut sender, mut receiver) = socket.split();
    let (conn, mut outbound) = ctx.hub.register();
    let _guard = ConnectionGuard::new(conn, Arc::clone(&ctx.engine), Arc::clone(&ctx.hub));

    info!(connection = %conn, "WebSocket connected");

    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let json = match message.to_json() {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize server message");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    // Already reported to the connection
                    let _ = handle_frame(&ctx.engine, conn, &text).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut writer => break,
        }
    }

    writer.abort();
    info!(connection = %conn, "WebSocket disconnected");
}

/// Decode and execute one text frame from `conn`
///
/// Undecodable frames are answered with an `Error` message to `conn` only.
pub async fn handle_frame(engine: &TeamSyncEngine, conn: ConnectionId, text: &str) -> Result<()> {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            let err = Error::MalformedCommand(e.to_string());
            engine.broadcaster().send_error(conn, err.to_payload(None));
            return Err(err);
        }
    };
    debug!(connection = %conn, command = command.name(), "Command received");
    engine.handle_command(conn, command).await
}
