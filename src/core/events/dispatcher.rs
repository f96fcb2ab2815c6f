// src/core/events/dispatcher.rs

//! The in-process event bus.
//!
//! One handler list per event variant gives typed registration surfaces; no
//! dynamic typing survives dispatch. Handlers run concurrently per event and
//! individual failures are logged, never propagated — a misbehaving tracker
//! must not stall the log pipeline.

use super::*;
use crate::core::errors::McAdminError;
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error};

/// An asynchronous handler for a single event variant.
#[async_trait]
pub trait EventHandler<E: Clone + Send + 'static>: Send + Sync {
    /// A short name used when logging handler failures.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: E) -> Result<(), McAdminError>;
}

/// A registration list for one event variant.
struct HandlerList<E: Clone + Send + 'static> {
    handlers: RwLock<Vec<Arc<dyn EventHandler<E>>>>,
}

impl<E: Clone + Send + 'static> HandlerList<E> {
    fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    fn register(&self, handler: Arc<dyn EventHandler<E>>) {
        self.handlers.write().push(handler);
    }

    /// Runs every registered handler concurrently and waits for all of them.
    async fn dispatch(&self, event: E, event_kind: &'static str) {
        // Snapshot the list so the lock is not held across awaits.
        let handlers: Vec<_> = self.handlers.read().iter().cloned().collect();

        if handlers.is_empty() {
            debug!("No handlers registered for event: {event_kind}");
            return;
        }

        let futures = handlers.iter().map(|handler| {
            let event = event.clone();
            async move { (handler.name(), handler.handle(event).await) }
        });

        for (name, result) in join_all(futures).await {
            if let Err(e) = result {
                error!("Handler {name} failed for event {event_kind}: {e}");
            }
        }
    }
}

/// Dispatches events to registered handlers.
///
/// Each event variant has its own registration and dispatch method for type
/// safety. Dispatch awaits handler completion, which is what serializes the
/// events produced by consecutive lines of the same log file.
pub struct EventDispatcher {
    uuid_discovered: HandlerList<PlayerUuidDiscovered>,
    player_joined: HandlerList<PlayerJoined>,
    player_left: HandlerList<PlayerLeft>,
    chat_message: HandlerList<PlayerChatMessage>,
    achievement: HandlerList<PlayerAchievement>,
    skin_update_requested: HandlerList<PlayerSkinUpdateRequested>,
    server_stopping: HandlerList<ServerStopping>,
    server_created: HandlerList<ServerCreated>,
    server_removed: HandlerList<ServerRemoved>,
    crash_detected: HandlerList<SystemCrashDetected>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            uuid_discovered: HandlerList::new(),
            player_joined: HandlerList::new(),
            player_left: HandlerList::new(),
            chat_message: HandlerList::new(),
            achievement: HandlerList::new(),
            skin_update_requested: HandlerList::new(),
            server_stopping: HandlerList::new(),
            server_created: HandlerList::new(),
            server_removed: HandlerList::new(),
            crash_detected: HandlerList::new(),
        }
    }

    // Registration surfaces, one per variant.

    pub fn on_player_uuid_discovered(&self, handler: Arc<dyn EventHandler<PlayerUuidDiscovered>>) {
        self.uuid_discovered.register(handler);
    }

    pub fn on_player_joined(&self, handler: Arc<dyn EventHandler<PlayerJoined>>) {
        self.player_joined.register(handler);
    }

    pub fn on_player_left(&self, handler: Arc<dyn EventHandler<PlayerLeft>>) {
        self.player_left.register(handler);
    }

    pub fn on_player_chat_message(&self, handler: Arc<dyn EventHandler<PlayerChatMessage>>) {
        self.chat_message.register(handler);
    }

    pub fn on_player_achievement(&self, handler: Arc<dyn EventHandler<PlayerAchievement>>) {
        self.achievement.register(handler);
    }

    pub fn on_player_skin_update_requested(
        &self,
        handler: Arc<dyn EventHandler<PlayerSkinUpdateRequested>>,
    ) {
        self.skin_update_requested.register(handler);
    }

    pub fn on_server_stopping(&self, handler: Arc<dyn EventHandler<ServerStopping>>) {
        self.server_stopping.register(handler);
    }

    pub fn on_server_created(&self, handler: Arc<dyn EventHandler<ServerCreated>>) {
        self.server_created.register(handler);
    }

    pub fn on_server_removed(&self, handler: Arc<dyn EventHandler<ServerRemoved>>) {
        self.server_removed.register(handler);
    }

    pub fn on_system_crash_detected(&self, handler: Arc<dyn EventHandler<SystemCrashDetected>>) {
        self.crash_detected.register(handler);
    }

    // Dispatch surfaces, one per variant.

    pub async fn dispatch_player_uuid_discovered(&self, event: PlayerUuidDiscovered) {
        self.uuid_discovered
            .dispatch(event, "player.uuid_discovered")
            .await;
    }

    pub async fn dispatch_player_joined(&self, event: PlayerJoined) {
        self.player_joined.dispatch(event, "player.joined").await;
    }

    pub async fn dispatch_player_left(&self, event: PlayerLeft) {
        self.player_left.dispatch(event, "player.left").await;
    }

    pub async fn dispatch_player_chat_message(&self, event: PlayerChatMessage) {
        self.chat_message.dispatch(event, "player.chat").await;
    }

    pub async fn dispatch_player_achievement(&self, event: PlayerAchievement) {
        self.achievement.dispatch(event, "player.achievement").await;
    }

    pub async fn dispatch_player_skin_update_requested(&self, event: PlayerSkinUpdateRequested) {
        self.skin_update_requested
            .dispatch(event, "player.skin_update_requested")
            .await;
    }

    pub async fn dispatch_server_stopping(&self, event: ServerStopping) {
        self.server_stopping.dispatch(event, "server.stopping").await;
    }

    pub async fn dispatch_server_created(&self, event: ServerCreated) {
        self.server_created.dispatch(event, "server.created").await;
    }

    pub async fn dispatch_server_removed(&self, event: ServerRemoved) {
        self.server_removed.dispatch(event, "server.removed").await;
    }

    pub async fn dispatch_system_crash_detected(&self, event: SystemCrashDetected) {
        self.crash_detected
            .dispatch(event, "system.crash_detected")
            .await;
    }
}
