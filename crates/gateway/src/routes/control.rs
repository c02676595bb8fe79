// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator command control: allowlisted commands and sentinel endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use drover_protocol::events::RunStatus;
use drover_protocol::frames::ServerFrame;
use drover_protocol::sentinel::{self, Sentinel};

use crate::auth::require_ui;
use crate::error::{internal, ApiError, ApiResult};
use crate::routes::runs::fetch_run;
use crate::state::Gateway;
use crate::store::commands::CommandRow;
use crate::store::runs::RunRow;
use crate::store::sessions::{AuditEntry, Role};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedResponse {
    pub queued: bool,
    pub command_id: String,
}

fn queued(command: &CommandRow) -> Json<QueuedResponse> {
    Json(QueuedResponse { queued: true, command_id: command.id.clone() })
}

/// Enqueue with the broker's validation rules. Non-sentinels require a
/// running run and an allowlist match. Sentinels bypass the allowlist;
/// `__STOP__` is also accepted while the run is still pending (debounce
/// covers the window where a stop lands just before the started marker).
/// Pending stop/halt duplicates short-circuit to the existing command.
async fn enqueue_checked(
    gw: &Gateway,
    run: &RunRow,
    command: &str,
) -> ApiResult<CommandRow> {
    match Sentinel::parse(command) {
        Some(Sentinel::Stop) => {
            if run.status.is_terminal() {
                return Err(ApiError::BadRequest.to_http_response("run already finished"));
            }
            if let Some(existing) =
                gw.store.pending_duplicate(&run.id, command).await.map_err(internal)?
            {
                return Ok(existing);
            }
        }
        Some(Sentinel::Halt) => {
            require_running(run)?;
            if let Some(existing) =
                gw.store.pending_duplicate(&run.id, command).await.map_err(internal)?
            {
                return Ok(existing);
            }
        }
        Some(Sentinel::Escape) | Some(Sentinel::Input(_)) => require_running(run)?,
        None => {
            require_running(run)?;
            if !gw.allowlist.matches(command) {
                return Err(ApiError::BadRequest.to_http_response("Command not in allowlist"));
            }
        }
    }
    gw.store.enqueue_command(&run.id, command).await.map_err(internal)
}

fn require_running(run: &RunRow) -> ApiResult<()> {
    if run.status != RunStatus::Running {
        return Err(ApiError::BadRequest
            .to_http_response(format!("run is {}, not running", run.status)));
    }
    Ok(())
}

// -- Routes -------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub command: String,
}

/// `POST /api/runs/{id}/command` — enqueue an allowlisted command.
pub async fn enqueue_command(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<EnqueueRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = require_ui(&gw, &headers, Role::Operator).await?;
    let run = fetch_run(&gw, &id).await?;

    // Sentinels have dedicated endpoints; the generic route takes only
    // literal commands.
    if sentinel::is_sentinel(&req.command) {
        return Err(ApiError::BadRequest.to_http_response("reserved command"));
    }

    let command = enqueue_checked(&gw, &run, &req.command).await?;
    gw.hub.broadcast(&id, &ServerFrame::CommandQueued {
        run_id: id.clone(),
        command_id: command.id.clone(),
        command: command.command.clone(),
    });
    gw.store
        .audit(AuditEntry {
            user_id: Some(&session.user_id),
            action: "command.enqueue",
            object_type: "command",
            object_id: Some(&command.id),
            detail: Some(&command.command),
            ..AuditEntry::default()
        })
        .await;
    Ok(queued(&command))
}

/// `POST /api/runs/{id}/stop` — graceful stop via `__STOP__`.
pub async fn stop(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = require_ui(&gw, &headers, Role::Operator).await?;
    let run = fetch_run(&gw, &id).await?;

    let command = enqueue_checked(&gw, &run, sentinel::STOP).await?;
    gw.store.set_stop_requested(&id).await.map_err(internal)?;
    gw.hub.broadcast(&id, &ServerFrame::StopRequested { run_id: id.clone() });
    gw.store
        .audit(AuditEntry {
            user_id: Some(&session.user_id),
            action: "run.stop",
            object_type: "run",
            object_id: Some(&id),
            ..AuditEntry::default()
        })
        .await;
    tracing::info!(run_id = %id, "stop requested");
    Ok(queued(&command))
}

/// `POST /api/runs/{id}/halt` — hard halt via `__HALT__` (requires a
/// running run; a duplicate concurrent halt is a no-op).
pub async fn halt(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = require_ui(&gw, &headers, Role::Operator).await?;
    let run = fetch_run(&gw, &id).await?;

    let command = enqueue_checked(&gw, &run, sentinel::HALT).await?;
    gw.store.set_stop_requested(&id).await.map_err(internal)?;
    gw.hub.broadcast(&id, &ServerFrame::HaltRequested { run_id: id.clone() });
    gw.store
        .audit(AuditEntry {
            user_id: Some(&session.user_id),
            action: "run.halt",
            object_type: "run",
            object_id: Some(&id),
            ..AuditEntry::default()
        })
        .await;
    tracing::info!(run_id = %id, "halt requested");
    Ok(queued(&command))
}

/// `POST /api/runs/{id}/escape` — SIGINT without teardown.
pub async fn escape(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = require_ui(&gw, &headers, Role::Operator).await?;
    let run = fetch_run(&gw, &id).await?;

    let command = enqueue_checked(&gw, &run, sentinel::ESCAPE).await?;
    gw.hub.broadcast(&id, &ServerFrame::EscapeSent { run_id: id.clone() });
    gw.store
        .audit(AuditEntry {
            user_id: Some(&session.user_id),
            action: "run.escape",
            object_type: "run",
            object_id: Some(&id),
            ..AuditEntry::default()
        })
        .await;
    Ok(queued(&command))
}

#[derive(Debug, Deserialize)]
pub struct InputRequest {
    pub text: String,
    /// Prefix the payload with `\x03` so the worker first receives an
    /// interrupt, then the text.
    #[serde(default)]
    pub escape: bool,
}

/// `POST /api/runs/{id}/input` — deliver text to the worker.
pub async fn input(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<InputRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = require_ui(&gw, &headers, Role::Operator).await?;
    let run = fetch_run(&gw, &id).await?;

    let payload =
        if req.escape { format!("\u{3}{}", req.text) } else { req.text.clone() };
    let command = Sentinel::Input(payload).as_command();
    let command = enqueue_checked(&gw, &run, &command).await?;
    gw.hub.broadcast(&id, &ServerFrame::InputSent { run_id: id.clone() });
    gw.store
        .audit(AuditEntry {
            user_id: Some(&session.user_id),
            action: "run.input",
            object_type: "run",
            object_id: Some(&id),
            ..AuditEntry::default()
        })
        .await;
    Ok(queued(&command))
}
