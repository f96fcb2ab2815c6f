// src/server/mod.rs

use crate::config::Settings;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, reload};

mod console;
mod initialization;
mod spawner;

pub mod routes;

/// The main startup function, orchestrating all setup phases.
pub async fn run(
    settings: Settings,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<()> {
    // 1. Initialize state, wire event handlers, recover cron jobs, run the
    //    crash check.
    let mut server_context = initialization::setup(settings, log_reload_handle).await?;

    // 2. Spawn all background tasks.
    spawner::spawn_all(&mut server_context).await?;

    // 3. Serve the HTTP API until shutdown.
    let state = server_context.state.clone();
    let listener = tokio::net::TcpListener::bind((
        state.settings.host.as_str(),
        state.settings.port,
    ))
    .await?;
    info!(
        "MC-Admin listening on {}:{}",
        state.settings.host, state.settings.port
    );

    let router = routes::api_router(state.clone());
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // 4. Graceful teardown: stop timers and watchers, give in-flight
    //    handlers a bounded grace period.
    let _ = server_context.shutdown_tx.send(());
    state.cron.shutdown();
    state.log_monitor.stop_all().await;

    let drain = async {
        while server_context.background_tasks.join_next().await.is_some() {}
    };
    if tokio::time::timeout(Duration::from_secs(10), drain).await.is_err() {
        warn!("Background tasks did not finish within the grace period");
        server_context.background_tasks.abort_all();
    }

    info!("Shutdown complete");
    Ok(())
}
