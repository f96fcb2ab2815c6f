// src/core/log_monitor/mod.rs

//! Tails each instance's `logs/latest.log` and feeds lines to the parser and
//! the console bridge.
//!
//! One task per instance owns that instance's byte offset. The task survives
//! log rotation (size shrink resets the offset), deletion/recreation (offset
//! back to 0) and files that do not exist yet (1 Hz existence poll until they
//! appear). Only complete lines are consumed; a trailing partial line stays
//! in the file until its newline arrives.

pub mod parser;

use crate::core::events::*;
use crate::core::instance::DockerMcManager;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parser::{LogParser, ParsedLine};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::errors::McAdminError;

/// Capacity of each instance's raw-line broadcast used by the console bridge.
const LINE_FEED_CAPACITY: usize = 256;

struct WatchedInstance {
    task: JoinHandle<()>,
    cancel: CancellationToken,
    line_feed: broadcast::Sender<String>,
}

/// Monitors Minecraft server log files and emits events.
pub struct LogMonitor {
    dispatcher: Arc<EventDispatcher>,
    parser: Arc<LogParser>,
    watches: DashMap<String, WatchedInstance>,
    shutdown: CancellationToken,
}

impl LogMonitor {
    pub fn new(dispatcher: Arc<EventDispatcher>, parser: Arc<LogParser>) -> Self {
        Self {
            dispatcher,
            parser,
            watches: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Starts watching a server's log file. No-op if already watched.
    pub fn watch_server(self: &Arc<Self>, server_id: &str, log_path: PathBuf) {
        if self.watches.contains_key(server_id) {
            warn!("Already watching logs for server {server_id}");
            return;
        }

        let (line_tx, _) = broadcast::channel(LINE_FEED_CAPACITY);
        let cancel = self.shutdown.child_token();
        let task = tokio::spawn(watch_loop(
            server_id.to_string(),
            log_path,
            self.dispatcher.clone(),
            self.parser.clone(),
            line_tx.clone(),
            cancel.clone(),
        ));

        self.watches.insert(
            server_id.to_string(),
            WatchedInstance {
                task,
                cancel,
                line_feed: line_tx,
            },
        );
        info!("Started watching logs for server {server_id}");
    }

    /// Stops watching a server's log file and drops its offset.
    pub async fn stop_watching(&self, server_id: &str) {
        let Some((_, watched)) = self.watches.remove(server_id) else {
            warn!("Not watching logs for server {server_id}");
            return;
        };
        watched.cancel.cancel();
        let _ = watched.task.await;
        info!("Stopped watching logs for server {server_id}");
    }

    /// A live feed of raw log lines for the console bridge.
    pub fn subscribe_lines(&self, server_id: &str) -> Option<broadcast::Receiver<String>> {
        self.watches
            .get(server_id)
            .map(|watched| watched.line_feed.subscribe())
    }

    /// Stops all watch tasks. Used during shutdown.
    pub async fn stop_all(&self) {
        self.shutdown.cancel();
        let ids: Vec<String> = self.watches.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, watched)) = self.watches.remove(&id) {
                let _ = watched.task.await;
            }
        }
        info!("Stopped all log monitoring");
    }
}

/// Registers new instances with the log monitor as they appear.
pub struct WatchCreatedServers {
    pub monitor: Arc<LogMonitor>,
    pub docker: Arc<DockerMcManager>,
}

#[async_trait]
impl EventHandler<ServerCreated> for WatchCreatedServers {
    fn name(&self) -> &'static str {
        "log_monitor.watch_created"
    }

    async fn handle(&self, event: ServerCreated) -> Result<(), McAdminError> {
        let log_path = self.docker.get_instance(&event.server_id).log_path();
        self.monitor.watch_server(&event.server_id, log_path);
        Ok(())
    }
}

/// Unhooks watchers for instances that disappeared from disk.
pub struct UnwatchRemovedServers {
    pub monitor: Arc<LogMonitor>,
}

#[async_trait]
impl EventHandler<ServerRemoved> for UnwatchRemovedServers {
    fn name(&self) -> &'static str {
        "log_monitor.unwatch_removed"
    }

    async fn handle(&self, event: ServerRemoved) -> Result<(), McAdminError> {
        self.monitor.stop_watching(&event.server_id).await;
        Ok(())
    }
}

async fn watch_loop(
    server_id: String,
    log_path: PathBuf,
    dispatcher: Arc<EventDispatcher>,
    parser: Arc<LogParser>,
    line_feed: broadcast::Sender<String>,
    cancel: CancellationToken,
) {
    // Start at the current end of file so startup does not replay history.
    let mut offset = match tokio::fs::metadata(&log_path).await {
        Ok(metadata) => {
            info!("Log file found for {server_id}, size: {}", metadata.len());
            metadata.len()
        }
        Err(_) => {
            info!("Log file not found for {server_id}, will start from beginning when created");
            0
        }
    };

    loop {
        // Wait (1 Hz) until the log file and its parent exist.
        while !tokio::fs::try_exists(&log_path).await.unwrap_or(false) {
            offset = 0;
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }

        let Some(parent) = log_path.parent().map(Path::to_path_buf) else {
            error!("Log path {log_path:?} has no parent directory");
            return;
        };

        // Bridge notify's callback thread into the async world.
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Result<Event, notify::Error>>();
        let mut watcher = match notify::recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        }) {
            Ok(watcher) => watcher,
            Err(e) => {
                error!("Failed to create filesystem watcher for {server_id}: {e}");
                return;
            }
        };
        if let Err(e) = watcher.watch(&parent, RecursiveMode::NonRecursive) {
            warn!("Failed to watch {parent:?} for {server_id}: {e}; retrying");
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_secs(1)) => continue,
            }
        }

        // Catch up on anything written between the existence check and the
        // watch registration.
        process_log_changes(
            &server_id, &log_path, &mut offset, &dispatcher, &parser, &line_feed,
        )
        .await;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return,
                event = event_rx.recv() => event,
            };
            let Some(event) = event else {
                // Watcher thread went away; rebuild it.
                break;
            };
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!("Watcher error for {server_id}: {e}");
                    break;
                }
            };

            if !event.paths.iter().any(|p| p == &log_path) {
                continue;
            }

            match event.kind {
                EventKind::Remove(_) => {
                    info!("Log file deleted for {server_id}");
                    // Wait for recreation; the outer loop polls existence.
                    continue;
                }
                EventKind::Create(_) => {
                    info!("Log file created for {server_id}");
                    offset = 0;
                }
                _ => {}
            }

            debug!("Processing log changes for {server_id}");
            process_log_changes(
                &server_id, &log_path, &mut offset, &dispatcher, &parser, &line_feed,
            )
            .await;
        }
    }
}

/// Reads from the stored offset to the last complete line and dispatches the
/// parsed events, advancing the offset past what was consumed.
async fn process_log_changes(
    server_id: &str,
    log_path: &Path,
    offset: &mut u64,
    dispatcher: &EventDispatcher,
    parser: &LogParser,
    line_feed: &broadcast::Sender<String>,
) {
    let metadata = match tokio::fs::metadata(log_path).await {
        Ok(metadata) => metadata,
        Err(_) => return,
    };
    let current_size = metadata.len();

    // Truncation or rotation: the file shrank below our offset.
    if current_size < *offset {
        info!("Log file truncated for {server_id}, reading from beginning");
        *offset = 0;
    }
    if current_size == *offset {
        return;
    }

    let mut file = match tokio::fs::File::open(log_path).await {
        Ok(file) => file,
        Err(e) => {
            warn!("Failed to open log file for {server_id}: {e}");
            return;
        }
    };
    if let Err(e) = file.seek(SeekFrom::Start(*offset)).await {
        warn!("Failed to seek log file for {server_id}: {e}");
        return;
    }
    let mut buf = Vec::with_capacity((current_size - *offset) as usize);
    if let Err(e) = file.read_to_end(&mut buf).await {
        warn!("Failed to read log file for {server_id}: {e}");
        return;
    }

    // Only consume up to the last complete line; the rest stays for the next
    // round.
    let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
        return;
    };
    let consumed = &buf[..=last_newline];
    *offset += consumed.len() as u64;

    for raw_line in consumed.split(|&b| b == b'\n') {
        let line = String::from_utf8_lossy(raw_line);
        let line = line.trim_end_matches('\r').trim();
        if line.is_empty() {
            continue;
        }

        // Feed the console bridge regardless of whether the line parses.
        let _ = line_feed.send(line.to_string());

        if let Some(parsed) = parser.parse_line(line) {
            dispatch_parsed(server_id, parsed, dispatcher).await;
        }
    }
}

async fn dispatch_parsed(server_id: &str, parsed: ParsedLine, dispatcher: &EventDispatcher) {
    let timestamp = Utc::now();
    match parsed {
        ParsedLine::UuidDiscovered { player_name, uuid } => {
            dispatcher
                .dispatch_player_uuid_discovered(PlayerUuidDiscovered {
                    server_id: server_id.to_string(),
                    player_name,
                    uuid,
                    timestamp,
                })
                .await;
        }
        ParsedLine::Joined { player_name } => {
            dispatcher
                .dispatch_player_joined(PlayerJoined {
                    server_id: server_id.to_string(),
                    player_name,
                    timestamp,
                })
                .await;
        }
        ParsedLine::Left { player_name, reason } => {
            dispatcher
                .dispatch_player_left(PlayerLeft {
                    server_id: server_id.to_string(),
                    player_name,
                    reason,
                    timestamp,
                })
                .await;
        }
        ParsedLine::Chat { player_name, message } => {
            dispatcher
                .dispatch_player_chat_message(PlayerChatMessage {
                    server_id: server_id.to_string(),
                    player_name,
                    message,
                    timestamp,
                })
                .await;
        }
        ParsedLine::Achievement {
            player_name,
            achievement_name,
        } => {
            dispatcher
                .dispatch_player_achievement(PlayerAchievement {
                    server_id: server_id.to_string(),
                    player_name,
                    achievement_name,
                    timestamp,
                })
                .await;
        }
        ParsedLine::ServerStopping => {
            dispatcher
                .dispatch_server_stopping(ServerStopping {
                    server_id: server_id.to_string(),
                    timestamp,
                })
                .await;
        }
    }
}
