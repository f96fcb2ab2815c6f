// src/server/console.rs

//! The WebSocket console bridge: streams the log tail and forwards RCON
//! commands.
//!
//! On connect the client receives the last chunk of `latest.log`, then every
//! new line as the log monitor reads it. Text frames from the client are run
//! as RCON commands and answered with the command output.

use crate::core::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use serde_json::json;
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

/// How much log history a freshly connected console receives.
const BACKLOG_BYTES: u64 = 64 * 1024;

pub async fn console_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| handle_console(socket, state, id))
}

async fn handle_console(mut socket: WebSocket, state: Arc<AppState>, server_id: String) {
    // Initial backlog from the tail of the log file.
    let log_path = state.docker.get_instance(&server_id).log_path();
    if let Ok(backlog) = read_backlog(&log_path).await
        && !backlog.is_empty()
    {
        let frame = json!({ "type": "log", "content": backlog }).to_string();
        if socket.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }

    let Some(mut lines) = state.log_monitor.subscribe_lines(&server_id) else {
        let frame = json!({ "type": "error", "content": "server is not being monitored" }).to_string();
        let _ = socket.send(Message::Text(frame.into())).await;
        return;
    };

    loop {
        tokio::select! {
            line = lines.recv() => {
                match line {
                    Ok(line) => {
                        let frame = json!({ "type": "log", "content": line }).to_string();
                        if socket.send(Message::Text(frame.into())).await.is_err() {
                            return;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Console for {server_id} lagged, skipped {skipped} lines");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
            message = socket.recv() => {
                let Some(Ok(message)) = message else { return };
                if let Message::Text(command) = message {
                    let command = command.to_string();
                    debug!("Console command on {server_id}: {command}");
                    let frame = match state
                        .docker
                        .get_instance(&server_id)
                        .send_rcon_command(&command)
                        .await
                    {
                        Ok(response) => json!({ "type": "response", "content": response }),
                        Err(e) => json!({ "type": "error", "content": e.to_string() }),
                    };
                    if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Reads up to the last [`BACKLOG_BYTES`] of the log file.
async fn read_backlog(log_path: &std::path::Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(log_path).await?;
    let size = file.metadata().await?.len();
    let start = size.saturating_sub(BACKLOG_BYTES);
    file.seek(SeekFrom::Start(start)).await?;
    let mut buf = Vec::with_capacity((size - start) as usize);
    file.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
