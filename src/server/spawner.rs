// src/server/spawner.rs

//! Spawns all of the control plane's long-running background tasks.

use super::initialization::ServerContext;
use anyhow::Result;
use tracing::info;

/// Spawns every background task into the context's JoinSet. Each task
/// subscribes to the broadcast shutdown channel.
pub async fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let shutdown_tx = &ctx.shutdown_tx;

    if let Some(heartbeat) = ctx.heartbeat.take() {
        let shutdown_rx = shutdown_tx.subscribe();
        ctx.background_tasks.spawn(async move {
            heartbeat.run(shutdown_rx).await;
        });
    }

    if let Some(reconciler) = ctx.reconciler.take() {
        let shutdown_rx = shutdown_tx.subscribe();
        ctx.background_tasks.spawn(async move {
            reconciler.run(shutdown_rx).await;
        });
    }

    if let Some(server_tracker) = ctx.server_tracker.take() {
        let shutdown_rx = shutdown_tx.subscribe();
        ctx.background_tasks.spawn(async move {
            server_tracker.run(shutdown_rx).await;
        });
    }

    info!("All background tasks spawned");
    Ok(())
}
