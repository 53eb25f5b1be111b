//! Route handlers.

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;
use apelite_core::{BackupEntry, BackupReport, ConflictRecord, SyncSettings};
use apelite_sync_engine::{ConflictChoice, StatusReport, SyncReport};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

/// Query string of the conflict listing.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct ConflictQuery {
    /// Include resolved conflicts.
    #[serde(default)]
    pub all: bool,
}

/// Body of a conflict resolution request.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ResolveRequest {
    /// Which side to keep.
    pub keep: ConflictChoice,
}

pub(crate) async fn status(State(state): State<AppState>) -> ApiResult<Json<StatusReport>> {
    Ok(Json(state.engine.system_status().await?))
}

pub(crate) async fn sync(State(state): State<AppState>) -> ApiResult<Json<SyncReport>> {
    info!("sync requested");
    Ok(Json(state.engine.full_sync().await?))
}

pub(crate) async fn backup(State(state): State<AppState>) -> (StatusCode, Json<BackupReport>) {
    info!("backup requested");
    let report = state.engine.backup().await;
    let code = if report.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (code, Json(report))
}

pub(crate) async fn backups(State(state): State<AppState>) -> ApiResult<Json<Vec<BackupEntry>>> {
    let manager = state.engine.backups().clone();
    let entries = tokio::task::spawn_blocking(move || manager.list())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(entries))
}

pub(crate) async fn get_config(State(state): State<AppState>) -> Json<SyncSettings> {
    Json(state.engine.config().get())
}

pub(crate) async fn put_config(
    State(state): State<AppState>,
    Json(patch): Json<Map<String, Value>>,
) -> ApiResult<Json<SyncSettings>> {
    let settings = state.engine.config().update(&patch)?;
    info!("settings updated");
    Ok(Json(settings))
}

pub(crate) async fn conflicts(
    State(state): State<AppState>,
    Query(query): Query<ConflictQuery>,
) -> ApiResult<Json<Vec<ConflictRecord>>> {
    Ok(Json(state.engine.conflicts(query.all).await?))
}

pub(crate) async fn resolve_conflict(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<ConflictRecord>> {
    Ok(Json(
        state.engine.resolve_conflict(&id, request.keep).await?,
    ))
}
