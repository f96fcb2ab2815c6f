// src/server/routes.rs

//! The thin HTTP surface. Handlers translate between JSON and the core
//! components; no business logic lives here.

use super::console;
use crate::core::cron::{CronJobConfig, CronJobFilter, JobParams};
use crate::core::db::models::CronJobStatus;
use crate::core::errors::{ErrorClass, McAdminError};
use crate::core::players::crud;
use crate::core::state::AppState;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Wrapper giving `McAdminError` an HTTP shape.
pub struct ApiError(McAdminError);

impl From<McAdminError> for ApiError {
    fn from(err: McAdminError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.class() {
            ErrorClass::Validation => StatusCode::BAD_REQUEST,
            ErrorClass::NotFound => StatusCode::NOT_FOUND,
            ErrorClass::Conflict => StatusCode::CONFLICT,
            ErrorClass::External => StatusCode::BAD_GATEWAY,
            ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, axum::Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

type ApiResult = Result<axum::Json<Value>, ApiError>;

pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/servers", get(list_servers).post(create_server))
        .route("/api/servers/{id}", get(get_server).delete(remove_server))
        .route("/api/servers/{id}/compose", get(get_compose).put(update_compose))
        .route("/api/servers/{id}/operations", post(server_operation))
        .route("/api/servers/{id}/rebuild", post(rebuild_server))
        .route("/api/servers/{id}/rcon", post(send_rcon))
        .route("/api/servers/{id}/players", get(list_server_players))
        .route("/api/servers/{id}/resources", get(server_resources))
        .route("/api/servers/{id}/console", get(console::console_ws))
        .route("/api/players/online", get(online_players))
        .route("/api/system/info", get(system_info))
        .route("/api/cron", get(list_cronjobs).post(create_cronjob))
        .route("/api/cron/restart-schedule", post(create_restart_schedule))
        .route("/api/cron/{id}", get(get_cronjob).put(update_cronjob))
        .route("/api/cron/{id}/pause", post(pause_cronjob))
        .route("/api/cron/{id}/resume", post(resume_cronjob))
        .route("/api/cron/{id}/cancel", post(cancel_cronjob))
        .route("/api/cron/{id}/executions", get(cronjob_executions))
        .route("/api/cron/{id}/next-run", get(cronjob_next_run))
        .route("/api/dns/status", get(dns_status))
        .route("/api/dns/update", post(dns_update))
        .route("/api/config", get(all_configs))
        .route("/api/config/{module}", put(update_config).delete(reset_config))
        .route("/api/snapshots", get(list_snapshots).post(create_snapshot))
        .route("/api/snapshots/{id}/restore-preview", post(restore_preview))
        .route("/api/snapshots/{id}/restore", post(restore_snapshot))
        .with_state(state)
}

// --- Servers ---

async fn list_servers(State(state): State<Arc<AppState>>) -> ApiResult {
    let mut servers = Vec::new();
    for name in state.docker.list_instance_ids().await? {
        let instance = state.docker.get_instance(&name);
        let status = instance.status().await?;
        let info = match instance.get_server_info().await {
            Ok(info) => Some(info),
            Err(_) => None,
        };
        servers.push(json!({ "id": name, "status": status, "info": info }));
    }
    Ok(axum::Json(json!({ "servers": servers })))
}

#[derive(Deserialize)]
struct CreateServerRequest {
    server_id: String,
    compose_yaml: String,
}

async fn create_server(
    State(state): State<Arc<AppState>>,
    axum::Json(request): axum::Json<CreateServerRequest>,
) -> ApiResult {
    let compose = crate::core::instance::compose::McCompose::parse(&request.compose_yaml)?;
    state
        .docker
        .check_port_conflicts(&request.server_id, &compose)
        .await?;
    let instance = state.docker.get_instance(&request.server_id);
    instance.create(&request.compose_yaml).await?;
    Ok(axum::Json(json!({ "id": request.server_id, "status": "EXISTS" })))
}

async fn get_server(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let instance = state.docker.get_instance(&id);
    if !instance.exists().await? {
        return Err(McAdminError::ServerNotFound(id).into());
    }
    let status = instance.status().await?;
    let info = instance.get_server_info().await?;
    Ok(axum::Json(json!({ "id": id, "status": status, "info": info })))
}

async fn remove_server(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    state.docker.get_instance(&id).remove().await?;
    Ok(axum::Json(json!({ "removed": id })))
}

async fn get_compose(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let yaml = state.docker.get_instance(&id).get_compose_yaml().await?;
    Ok(axum::Json(json!({ "compose_yaml": yaml })))
}

#[derive(Deserialize)]
struct ComposeUpdateRequest {
    compose_yaml: String,
}

async fn update_compose(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<ComposeUpdateRequest>,
) -> ApiResult {
    state
        .docker
        .get_instance(&id)
        .update_compose(&request.compose_yaml)
        .await?;
    Ok(axum::Json(json!({ "updated": id })))
}

#[derive(Deserialize)]
struct OperationRequest {
    operation: String,
}

async fn server_operation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<OperationRequest>,
) -> ApiResult {
    let instance = state.docker.get_instance(&id);
    if !instance.exists().await? {
        return Err(McAdminError::ServerNotFound(id).into());
    }
    match request.operation.as_str() {
        "up" => instance.up().await?,
        "down" => instance.down().await?,
        "start" => instance.start().await?,
        "stop" => instance.stop().await?,
        "restart" => instance.restart().await?,
        other => {
            return Err(McAdminError::Validation(format!("unknown operation '{other}'")).into());
        }
    }
    Ok(axum::Json(json!({ "operation": request.operation, "id": id })))
}

/// Starts a down → update → up rebuild in the background. Progress is logged
/// as it happens; the call returns as soon as the rebuild is underway.
async fn rebuild_server(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<ComposeUpdateRequest>,
) -> ApiResult {
    let instance = state.docker.get_instance(&id);
    if !instance.exists().await? {
        return Err(McAdminError::ServerNotFound(id).into());
    }

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel(8);
    let cancel = tokio_util::sync::CancellationToken::new();
    let server_id = id.clone();
    tokio::spawn(async move {
        while let Some(phase) = progress_rx.recv().await {
            tracing::info!("Rebuild of {server_id}: {phase:?}");
        }
    });
    let server_id = id.clone();
    tokio::spawn(async move {
        if let Err(e) = instance
            .rebuild(&request.compose_yaml, &progress_tx, &cancel)
            .await
        {
            tracing::error!("Rebuild of {server_id} failed: {e}");
        }
    });

    Ok(axum::Json(json!({ "rebuilding": id })))
}

#[derive(Deserialize)]
struct RconRequest {
    command: String,
}

async fn send_rcon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<RconRequest>,
) -> ApiResult {
    let response = state
        .docker
        .get_instance(&id)
        .send_rcon_command(&request.command)
        .await?;
    Ok(axum::Json(json!({ "response": response })))
}

async fn list_server_players(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let query_config = state.dynamic_config.players().query.clone();
    let players = state
        .docker
        .get_instance(&id)
        .list_players(&query_config)
        .await?;
    Ok(axum::Json(json!({ "players": players })))
}

async fn server_resources(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let instance = state.docker.get_instance(&id);
    let disk = instance.disk_space_info().await?;
    let memory = instance.memory_usage().await.ok();
    let cpu = instance.cpu_percent().await.ok();
    let disk_io = instance.disk_io().await.ok();
    let network_io = instance.network_io().await.ok();
    Ok(axum::Json(json!({
        "cpu_percent": cpu,
        "memory_bytes": memory.map(|m| m.total_bytes()),
        "disk": {
            "used_bytes": disk.used_bytes,
            "total_bytes": disk.total_bytes,
            "available_bytes": disk.available_bytes,
        },
        "disk_io": disk_io.map(|io| json!({ "read_bytes": io.read_bytes, "write_bytes": io.write_bytes })),
        "network_io": network_io.map(|io| json!({ "receive_bytes": io.receive_bytes, "send_bytes": io.send_bytes })),
    })))
}

// --- Players ---

async fn online_players(State(state): State<Arc<AppState>>) -> ApiResult {
    let grouped = crud::get_online_players_grouped_by_server(&state.db).await?;
    Ok(axum::Json(serde_json::to_value(grouped).map_err(McAdminError::from)?))
}

// --- System ---

async fn system_info(State(_state): State<Arc<AppState>>) -> ApiResult {
    let info = tokio::task::spawn_blocking(|| {
        use sysinfo::System;
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu_usage();
        json!({
            "cpu_percent": sys.global_cpu_usage(),
            "total_memory_bytes": sys.total_memory(),
            "used_memory_bytes": sys.used_memory(),
        })
    })
    .await
    .map_err(|e| McAdminError::Internal(e.to_string()))?;
    Ok(axum::Json(info))
}

// --- Cron ---

fn cronjob_to_json(config: &CronJobConfig) -> Result<Value, McAdminError> {
    Ok(json!({
        "cronjob_id": config.cronjob_id,
        "identifier": config.identifier,
        "name": config.name,
        "cron": config.cron,
        "second": config.second,
        "params": config.params.to_value()?,
        "execution_count": config.execution_count,
        "status": config.status,
        "created_at": config.created_at,
        "updated_at": config.updated_at,
    }))
}

#[derive(Deserialize)]
struct CronListQuery {
    identifier: Option<String>,
    /// Comma-separated status list.
    status: Option<String>,
    name: Option<String>,
}

async fn list_cronjobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CronListQuery>,
) -> ApiResult {
    let statuses = match &query.status {
        None => None,
        Some(raw) => {
            let mut parsed = Vec::new();
            for part in raw.split(',').filter(|s| !s.is_empty()) {
                let status = CronJobStatus::from_str(part).map_err(|_| {
                    McAdminError::Validation(format!("unknown status '{part}'"))
                })?;
                parsed.push(status);
            }
            Some(parsed)
        }
    };
    let filter = CronJobFilter {
        identifier: query.identifier,
        statuses,
        name: query.name,
    };
    let configs = state.cron.get_all_cronjobs(&filter).await?;
    let jobs: Result<Vec<Value>, McAdminError> = configs.iter().map(cronjob_to_json).collect();
    Ok(axum::Json(json!({ "cronjobs": jobs? })))
}

#[derive(Deserialize)]
struct CreateCronJobRequest {
    identifier: String,
    params: Value,
    cron: String,
    cronjob_id: Option<String>,
    name: Option<String>,
    second: Option<String>,
}

async fn create_cronjob(
    State(state): State<Arc<AppState>>,
    axum::Json(request): axum::Json<CreateCronJobRequest>,
) -> ApiResult {
    let params = JobParams::from_value(&request.identifier, request.params)?;
    let cronjob_id = state
        .cron
        .create_cronjob(
            params,
            &request.cron,
            request.cronjob_id,
            request.name,
            request.second,
        )
        .await?;
    Ok(axum::Json(json!({ "cronjob_id": cronjob_id })))
}

/// Creates (or reschedules) the automatic restart job for a server. Without
/// an explicit cron the conflict-aware slot finder picks one.
#[derive(Deserialize)]
struct RestartScheduleRequest {
    server_id: String,
    cron: Option<String>,
}

async fn create_restart_schedule(
    State(state): State<Arc<AppState>>,
    axum::Json(request): axum::Json<RestartScheduleRequest>,
) -> ApiResult {
    if !state.docker.get_instance(&request.server_id).exists().await? {
        return Err(McAdminError::ServerNotFound(request.server_id).into());
    }

    let cron = match request.cron {
        Some(cron) => cron,
        None => {
            state
                .restart_scheduler()
                .generate_restart_cron("*", "*", "*")
                .await?
        }
    };

    let params = JobParams::RestartServer(crate::core::cron::params::RestartServerParams {
        server_id: request.server_id.clone(),
    });
    let cronjob_id = state
        .cron
        .create_cronjob(
            params,
            &cron,
            Some(format!("restart_server_{}", request.server_id)),
            Some(format!("Restart {}", request.server_id)),
            None,
        )
        .await?;
    Ok(axum::Json(json!({ "cronjob_id": cronjob_id, "cron": cron })))
}

async fn get_cronjob(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let config = state.cron.get_cronjob_config(&id).await?;
    Ok(axum::Json(cronjob_to_json(&config)?))
}

#[derive(Deserialize)]
struct UpdateCronJobRequest {
    identifier: String,
    params: Value,
    cron: String,
    second: Option<String>,
}

async fn update_cronjob(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<UpdateCronJobRequest>,
) -> ApiResult {
    let params = JobParams::from_value(&request.identifier, request.params)?;
    state
        .cron
        .update_cronjob(&id, params, &request.cron, request.second)
        .await?;
    Ok(axum::Json(json!({ "updated": id })))
}

async fn pause_cronjob(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    state.cron.pause_cronjob(&id).await?;
    Ok(axum::Json(json!({ "paused": id })))
}

async fn resume_cronjob(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    state.cron.resume_cronjob(&id).await?;
    Ok(axum::Json(json!({ "resumed": id })))
}

async fn cancel_cronjob(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    state.cron.cancel_cronjob(&id).await?;
    Ok(axum::Json(json!({ "cancelled": id })))
}

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    limit: u32,
}

fn default_history_limit() -> u32 {
    50
}

async fn cronjob_executions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult {
    let records = state.cron.get_execution_history(&id, query.limit).await?;
    let executions: Vec<Value> = records
        .iter()
        .map(|record| {
            json!({
                "execution_id": record.execution_id,
                "cronjob_id": record.cronjob_id,
                "started_at": record.started_at,
                "ended_at": record.ended_at,
                "duration_ms": record.duration_ms,
                "status": record.status,
                "messages": record.messages,
            })
        })
        .collect();
    Ok(axum::Json(json!({ "executions": executions })))
}

async fn cronjob_next_run(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let next_run = state.cron.get_next_run_time(&id).await?;
    Ok(axum::Json(json!({ "next_run_time": next_run })))
}

// --- DNS ---

async fn dns_status(State(state): State<Arc<AppState>>) -> ApiResult {
    let status = state.dns.get_current_diff().await;
    let dns_diff = status.dns_diff.map(|diff| {
        json!({
            "to_add": diff.to_add,
            "to_remove": diff.to_remove,
            "to_update": diff.to_update.iter().map(|record| json!({
                "sub_domain": record.sub_domain,
                "record_type": record.record_type,
                "value": record.value,
                "ttl": record.ttl,
                "record_id": record.record_id,
            })).collect::<Vec<_>>(),
        })
    });
    let router_diff = status.router_diff.map(|diff| {
        json!({
            "to_add": diff.to_add,
            "to_remove": diff.to_remove,
            "to_update": diff.to_update,
        })
    });
    Ok(axum::Json(json!({
        "enabled": status.enabled,
        "dns_diff": dns_diff,
        "router_diff": router_diff,
        "errors": status.errors,
    })))
}

async fn dns_update(State(state): State<Arc<AppState>>) -> ApiResult {
    state.dns.update().await?;
    Ok(axum::Json(json!({ "updated": true })))
}

// --- Dynamic config ---

async fn all_configs(State(state): State<Arc<AppState>>) -> ApiResult {
    let modules = state.dynamic_config.all_modules()?;
    Ok(axum::Json(Value::Object(modules)))
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    Path(module): Path<String>,
    axum::Json(data): axum::Json<Value>,
) -> ApiResult {
    state.dynamic_config.update_module(&module, data).await?;
    Ok(axum::Json(json!({ "updated": module })))
}

async fn reset_config(State(state): State<Arc<AppState>>, Path(module): Path<String>) -> ApiResult {
    state.dynamic_config.reset_module(&module).await?;
    Ok(axum::Json(json!({ "reset": module })))
}

// --- Snapshots ---

fn restic_of(state: &AppState) -> Result<Arc<crate::core::snapshots::ResticManager>, McAdminError> {
    state
        .restic
        .clone()
        .ok_or_else(|| McAdminError::Validation("restic is not configured".to_string()))
}

#[derive(Deserialize)]
struct SnapshotListQuery {
    server_id: Option<String>,
}

async fn list_snapshots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SnapshotListQuery>,
) -> ApiResult {
    let restic = restic_of(&state)?;
    let filter: Option<PathBuf> = query
        .server_id
        .map(|id| state.docker.get_instance(&id).project_path().to_path_buf());
    let snapshots = restic.list_snapshots(filter.as_deref()).await?;
    let snapshots: Vec<Value> = snapshots
        .iter()
        .map(|snapshot| {
            json!({
                "id": snapshot.id,
                "short_id": snapshot.short_id,
                "time": snapshot.time,
                "paths": snapshot.paths,
                "hostname": snapshot.hostname,
            })
        })
        .collect();
    Ok(axum::Json(json!({ "snapshots": snapshots })))
}

#[derive(Deserialize)]
struct CreateSnapshotRequest {
    server_id: Option<String>,
}

async fn create_snapshot(
    State(state): State<Arc<AppState>>,
    axum::Json(request): axum::Json<CreateSnapshotRequest>,
) -> ApiResult {
    let restic = restic_of(&state)?;
    let path = match request.server_id {
        Some(id) => state.docker.get_instance(&id).project_path().to_path_buf(),
        None => state.settings.servers_path.clone(),
    };
    let result = restic.backup(&path).await?;
    Ok(axum::Json(json!({
        "snapshot_id": result.snapshot.id,
        "short_id": result.snapshot.short_id,
        "total_bytes_processed": result.summary.total_bytes_processed,
    })))
}

#[derive(Deserialize)]
struct RestoreRequest {
    #[serde(default)]
    include_path: Option<String>,
}

async fn restore_preview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<RestoreRequest>,
) -> ApiResult {
    let restic = restic_of(&state)?;
    let include = request.include_path.map(PathBuf::from);
    let actions = restic
        .restore_preview(&id, std::path::Path::new("/"), include.as_deref())
        .await?;
    let actions: Vec<Value> = actions
        .iter()
        .map(|action| {
            json!({
                "action": action.action,
                "item": action.item,
                "size": action.size,
            })
        })
        .collect();
    Ok(axum::Json(json!({ "actions": actions })))
}

async fn restore_snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<RestoreRequest>,
) -> ApiResult {
    let restic = restic_of(&state)?;
    let include = request.include_path.map(PathBuf::from);
    restic
        .restore(&id, std::path::Path::new("/"), include.as_deref())
        .await?;
    Ok(axum::Json(json!({ "restored": id })))
}
