// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run lifecycle routes (UI auth).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use drover_protocol::events::{EventRecord, RunStatus};
use drover_protocol::workers::WorkerKind;

use crate::auth::require_ui;
use crate::error::{internal, ApiError, ApiResult};
use crate::state::Gateway;
use crate::store::artifacts::ArtifactRow;
use crate::store::runs::{NewRun, RunRow};
use crate::store::sessions::{AuditEntry, Role};

// -- Wire views ---------------------------------------------------------------

/// A run as returned to the UI. The capability token never appears here;
/// it is returned exactly once at creation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    pub id: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub worker_type: WorkerKind,
    pub metadata: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl From<&RunRow> for RunView {
    fn from(run: &RunRow) -> Self {
        Self {
            id: run.id.clone(),
            status: run.status,
            command: run.command.clone(),
            worker_type: run.worker_type,
            metadata: run.metadata.clone(),
            client_id: run.client_id.clone(),
            created_at: run.created_at,
            started_at: run.started_at,
            finished_at: run.finished_at,
            exit_code: run.exit_code,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactView {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub size: i64,
    pub created_at: i64,
}

impl From<&ArtifactRow> for ArtifactView {
    fn from(row: &ArtifactRow) -> Self {
        Self {
            id: row.id.clone(),
            name: row.name.clone(),
            kind: row.kind.clone(),
            size: row.size,
            created_at: row.created_at,
        }
    }
}

// -- Create -------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub autonomous: bool,
    #[serde(default)]
    pub worker_type: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunResponse {
    pub id: String,
    pub capability_token: String,
    pub status: RunStatus,
    pub autonomous: bool,
}

/// `POST /api/runs` — create a run. The capability token in the response
/// is the only copy that will ever exist.
pub async fn create_run(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Json(req): Json<CreateRunRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = require_ui(&gw, &headers, Role::Operator).await?;

    let worker_type = match req.worker_type.as_deref() {
        None => None,
        Some(raw) => Some(WorkerKind::parse(raw).ok_or_else(|| {
            ApiError::BadRequest.to_http_response(format!("unknown worker type: {raw}"))
        })?),
    };
    if req.metadata.as_ref().is_some_and(|m| !m.is_object()) {
        return Err(ApiError::BadRequest.to_http_response("metadata must be an object"));
    }

    let run = gw
        .store
        .create_run(NewRun {
            command: req.command,
            working_dir: req.working_dir,
            autonomous: req.autonomous,
            worker_type,
            model: req.model,
            metadata: req.metadata,
        })
        .await
        .map_err(internal)?;

    gw.store
        .audit(AuditEntry {
            user_id: Some(&session.user_id),
            action: "run.create",
            object_type: "run",
            object_id: Some(&run.id),
            ..AuditEntry::default()
        })
        .await;
    tracing::info!(run_id = %run.id, worker = %run.worker_type, "run created");

    Ok((
        StatusCode::CREATED,
        Json(CreateRunResponse {
            id: run.id,
            capability_token: run.capability_token,
            status: run.status,
            autonomous: req.autonomous,
        }),
    ))
}

// -- List ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRunsResponse {
    pub runs: Vec<RunView>,
    pub total: i64,
    pub has_more: bool,
}

/// `GET /api/runs` — list with filter and pagination.
pub async fn list_runs(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Query(query): Query<ListRunsQuery>,
) -> ApiResult<impl IntoResponse> {
    require_ui(&gw, &headers, Role::Viewer).await?;

    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(RunStatus::parse(raw).ok_or_else(|| {
            ApiError::BadRequest.to_http_response(format!("unknown status: {raw}"))
        })?),
    };
    let limit = query.limit.unwrap_or(100);
    if !(1..=1000).contains(&limit) {
        return Err(ApiError::BadRequest.to_http_response("limit must be in [1,1000]"));
    }
    let offset = query.offset.unwrap_or(0).max(0);

    let (runs, total) = gw
        .store
        .list_runs(status, query.search.as_deref(), limit, offset)
        .await
        .map_err(internal)?;
    let has_more = offset + (runs.len() as i64) < total;
    Ok(Json(ListRunsResponse {
        runs: runs.iter().map(RunView::from).collect(),
        total,
        has_more,
    }))
}

// -- Get / delete -------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDetailResponse {
    #[serde(flatten)]
    pub run: RunView,
    pub artifacts: Vec<ArtifactView>,
}

/// `GET /api/runs/{id}` — run with its artifact list.
pub async fn get_run(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_ui(&gw, &headers, Role::Viewer).await?;
    let run = fetch_run(&gw, &id).await?;
    let artifacts = gw.store.list_artifacts(&id).await.map_err(internal)?;
    Ok(Json(RunDetailResponse {
        run: RunView::from(&run),
        artifacts: artifacts.iter().map(ArtifactView::from).collect(),
    }))
}

/// `DELETE /api/runs/{id}` — cascade delete (admin only).
pub async fn delete_run(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = require_ui(&gw, &headers, Role::Admin).await?;

    let Some(paths) = gw.store.delete_run(&id).await.map_err(internal)? else {
        return Err(ApiError::NotFound.to_http_response("run not found"));
    };
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!(path, err = %e, "artifact file already gone");
        }
    }
    let _ = tokio::fs::remove_dir(gw.config.artifacts_dir().join(&id)).await;

    gw.store
        .audit(AuditEntry {
            user_id: Some(&session.user_id),
            action: "run.delete",
            object_type: "run",
            object_id: Some(&id),
            ..AuditEntry::default()
        })
        .await;
    Ok(StatusCode::NO_CONTENT)
}

// -- Events -------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    #[serde(default)]
    pub after: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListEventsResponse {
    pub events: Vec<EventRecord>,
}

/// `GET /api/runs/{id}/events` — paginated tail, `WHERE id > after`.
pub async fn list_events(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<ListEventsQuery>,
) -> ApiResult<impl IntoResponse> {
    require_ui(&gw, &headers, Role::Viewer).await?;
    fetch_run(&gw, &id).await?;

    let limit = query.limit.unwrap_or(200);
    if !(1..=1000).contains(&limit) {
        return Err(ApiError::BadRequest.to_http_response("limit must be in [1,1000]"));
    }
    let events = gw
        .store
        .list_events(&id, query.after.unwrap_or(0), limit)
        .await
        .map_err(internal)?;
    Ok(Json(ListEventsResponse { events }))
}

// -- Resume state -------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStateResponse {
    #[serde(flatten)]
    pub run: RunView,
    pub state: Option<Value>,
    pub events: Vec<EventRecord>,
    pub can_resume: bool,
}

/// `GET /api/runs/{id}/state` — run, saved wrapper state, and the recent
/// event tail for resume.
pub async fn get_state(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_ui(&gw, &headers, Role::Viewer).await?;
    let run = fetch_run(&gw, &id).await?;
    let state = gw.store.get_run_state(&id).await.map_err(internal)?;
    let events = gw.store.recent_events(&id, 50).await.map_err(internal)?;

    let state_json = state.map(|s| {
        serde_json::json!({
            "workingDir": s.working_dir,
            "originalCommand": s.original_command,
            "lastSequence": s.last_sequence,
            "stdinBuffer": s.stdin_buffer,
            "environment": s.environment,
            "updatedAt": s.updated_at,
        })
    });
    Ok(Json(RunStateResponse {
        can_resume: run.status.can_resume(),
        run: RunView::from(&run),
        state: state_json,
        events,
    }))
}

// -- Restart ------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartRequest {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
}

/// `POST /api/runs/{id}/restart` — new run inheriting from the origin.
pub async fn restart(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RestartRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = require_ui(&gw, &headers, Role::Operator).await?;
    let origin = fetch_run(&gw, &id).await?;

    let run = gw
        .store
        .restart_run(&origin, req.command, req.working_dir)
        .await
        .map_err(internal)?;
    gw.store
        .audit(AuditEntry {
            user_id: Some(&session.user_id),
            action: "run.restart",
            object_type: "run",
            object_id: Some(&run.id),
            detail: Some(&origin.id),
            ..AuditEntry::default()
        })
        .await;
    tracing::info!(run_id = %run.id, origin = %origin.id, "run restarted");

    Ok((
        StatusCode::CREATED,
        Json(CreateRunResponse {
            id: run.id,
            capability_token: run.capability_token,
            status: run.status,
            autonomous: run
                .metadata
                .get("autonomous")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }),
    ))
}

// -- Shared -------------------------------------------------------------------

pub(crate) async fn fetch_run(gw: &Gateway, id: &str) -> ApiResult<RunRow> {
    gw.store
        .get_run(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound.to_http_response("run not found"))
}
