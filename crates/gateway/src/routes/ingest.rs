// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wrapper ingress: event append, command polling and ack, run-state
//! upsert, artifact upload. Every route here is HMAC-authenticated and
//! run-scoped through the capability token.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use drover_protocol::events::{CommandRecord, EventKind, Marker};
use drover_protocol::frames::ServerFrame;
use drover_protocol::sign;

use crate::artifacts::{artifact_kind, new_artifact_id, sanitize_name};
use crate::auth::{begin_wrapper, finish_wrapper, verify_wrapper, WrapperContext};
use crate::error::{internal, ApiError, ApiResult};
use crate::state::Gateway;
use crate::store::commands::AckOutcome;
use crate::store::runs::{RunRow, RunStatePatch};

/// The bound run, also cross-checked against the path parameter so a
/// capability for run A can never touch run B's resources.
fn bound_run<'a>(ctx: &'a WrapperContext, path_id: &str) -> ApiResult<&'a RunRow> {
    let run = ctx.run()?;
    if run.id != path_id {
        return Err(ApiError::Forbidden.to_http_response("forbidden"));
    }
    Ok(run)
}

// -- Event ingest -------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct IngestEventRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
    #[serde(default)]
    pub sequence: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct IngestEventResponse {
    pub id: i64,
}

/// `POST /api/ingest/event` — append one event.
///
/// Marker payloads drive run transitions: `started` flips pending →
/// running, `finished` resolves the final status. Fan-out happens right
/// after the insert commits, so WS subscribers observe id order.
pub async fn ingest_event(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> ApiResult<impl IntoResponse> {
    let ctx = verify_wrapper(&gw, &headers, "POST", "/api/ingest/event", &body).await?;
    let run = ctx.run()?;

    let req: IngestEventRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest.to_http_response(format!("invalid body: {e}")))?;
    let kind = EventKind::parse(&req.kind)
        .ok_or_else(|| {
            ApiError::BadRequest.to_http_response(format!("unknown event type: {}", req.kind))
        })?;

    let data = gw.redactor.apply(&req.data);
    let event = gw
        .store
        .append_event(&run.id, kind, &data, req.sequence)
        .await
        .map_err(internal)?;

    if kind == EventKind::Marker {
        match Marker::parse(&data) {
            Some(Marker::Started) => {
                gw.store.mark_started(&run.id).await.map_err(internal)?;
                tracing::info!(run_id = %run.id, "run started");
            }
            Some(Marker::Finished { exit_code }) => {
                let status = gw.store.mark_finished(&run.id, exit_code).await.map_err(internal)?;
                tracing::info!(run_id = %run.id, exit_code, status = ?status, "run finished");
            }
            None => {}
        }
    }

    gw.hub.broadcast(&run.id, &ServerFrame::Event { event: event.clone() });
    Ok((StatusCode::CREATED, Json(IngestEventResponse { id: event.id })))
}

// -- Command polling ----------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct PollCommandsResponse {
    pub commands: Vec<CommandRecord>,
}

/// `GET /api/runs/{id}/commands` — pending commands, oldest first.
pub async fn poll_commands(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let path = format!("/api/runs/{id}/commands");
    let ctx = verify_wrapper(&gw, &headers, "GET", &path, b"").await?;
    let run = bound_run(&ctx, &id)?;

    let commands = gw.store.pending_commands(&run.id).await.map_err(internal)?;
    Ok(Json(PollCommandsResponse { commands }))
}

// -- Ack ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AckRequest {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub acked: bool,
}

/// `POST /api/runs/{id}/commands/{cid}/ack` — idempotent completion.
pub async fn ack_command(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path((id, cid)): Path<(String, String)>,
    body: bytes::Bytes,
) -> ApiResult<impl IntoResponse> {
    let path = format!("/api/runs/{id}/commands/{cid}/ack");
    let ctx = verify_wrapper(&gw, &headers, "POST", &path, &body).await?;
    let run = bound_run(&ctx, &id)?;

    let req: AckRequest = if body.is_empty() {
        AckRequest { result: None, error: None }
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest.to_http_response(format!("invalid body: {e}")))?
    };

    // The command must belong to the bound run.
    let command = gw.store.get_command(&cid).await.map_err(internal)?;
    if command.as_ref().is_none_or(|c| c.run_id != run.id) {
        return Err(ApiError::NotFound.to_http_response("command not found"));
    }

    let outcome = gw
        .store
        .ack_command(&cid, req.result.as_deref(), req.error.as_deref())
        .await
        .map_err(internal)?;
    match outcome {
        AckOutcome::First(row) => {
            gw.hub.broadcast(&run.id, &ServerFrame::CommandCompleted {
                run_id: run.id.clone(),
                command_id: row.id,
                result: row.result,
                error: row.error,
            });
        }
        // Retries are success with no side effect.
        AckOutcome::AlreadyAcked => {}
        AckOutcome::NotFound => {
            return Err(ApiError::NotFound.to_http_response("command not found"));
        }
    }
    Ok(Json(AckResponse { acked: true }))
}

// -- Run state ----------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertStateRequest {
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub original_command: Option<String>,
    #[serde(default)]
    pub last_sequence: Option<i64>,
    #[serde(default)]
    pub stdin_buffer: Option<String>,
    #[serde(default)]
    pub environment: Option<Value>,
}

/// `POST /api/runs/{id}/state` — COALESCE upsert of wrapper resume state.
pub async fn upsert_state(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: bytes::Bytes,
) -> ApiResult<impl IntoResponse> {
    let path = format!("/api/runs/{id}/state");
    let ctx = verify_wrapper(&gw, &headers, "POST", &path, &body).await?;
    let run = bound_run(&ctx, &id)?;

    let req: UpsertStateRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest.to_http_response(format!("invalid body: {e}")))?;
    gw.store
        .upsert_run_state(&run.id, RunStatePatch {
            working_dir: req.working_dir,
            original_command: req.original_command,
            last_sequence: req.last_sequence,
            stdin_buffer: req.stdin_buffer,
            environment: req.environment,
        })
        .await
        .map_err(internal)?;
    Ok(Json(serde_json::json!({ "saved": true })))
}

// -- Artifact upload ----------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: String,
    pub name: String,
    pub size: i64,
}

/// `POST /api/ingest/artifact` — streamed multipart upload.
///
/// The body is consumed as a stream, so the signature binds the header
/// fields with the empty-body hash; content integrity rides on TLS plus
/// the capability binding. The running byte count aborts the write the
/// moment the cap is exceeded and the partial file is deleted.
pub async fn ingest_artifact(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let pending = begin_wrapper(&gw, &headers).await?;
    let ctx = finish_wrapper(
        &gw,
        pending,
        "POST",
        "/api/ingest/artifact",
        &sign::body_sha256_hex(b""),
    )
    .await?;
    let run = ctx.run()?.clone();

    let mut name: Option<String> = None;
    let mut kind: Option<String> = None;
    let mut stored: Option<(String, std::path::PathBuf, i64)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                cleanup(&stored).await;
                return Err(ApiError::BadRequest.to_http_response(format!("malformed upload: {e}")));
            }
        };
        let field_name = field.name().unwrap_or("").to_owned();
        match field_name.as_str() {
            "name" => {
                name = field.text().await.ok().map(|t| t.trim().to_owned());
            }
            "type" => {
                kind = field.text().await.ok();
            }
            "file" => {
                let file_name = field.file_name().map(str::to_owned).unwrap_or_default();
                match stream_to_disk(&gw, &run.id, field).await {
                    Ok((artifact_id, path, size)) => {
                        if name.is_none() && !file_name.is_empty() {
                            name = Some(file_name);
                        }
                        stored = Some((artifact_id, path, size));
                    }
                    Err(resp) => {
                        cleanup(&stored).await;
                        return Err(resp);
                    }
                }
            }
            _ => {}
        }
    }

    let Some((artifact_id, tmp_path, size)) = stored else {
        return Err(ApiError::BadRequest.to_http_response("missing file field"));
    };
    let safe_name = sanitize_name(name.as_deref().unwrap_or("artifact"));
    let kind = artifact_kind(kind.as_deref(), &safe_name);

    let final_path = gw
        .config
        .artifacts_dir()
        .join(&run.id)
        .join(format!("{artifact_id}_{safe_name}"));
    if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(internal(anyhow::anyhow!("finalize artifact: {e}")));
    }

    let row = gw
        .store
        .insert_artifact(
            &artifact_id,
            &run.id,
            &safe_name,
            kind,
            size,
            &final_path.to_string_lossy(),
        )
        .await
        .map_err(internal)?;

    gw.hub.broadcast(&run.id, &ServerFrame::ArtifactUploaded {
        run_id: run.id.clone(),
        artifact_id: row.id.clone(),
        name: row.name.clone(),
        size: row.size,
    });
    tracing::info!(run_id = %run.id, artifact = %row.name, size, "artifact uploaded");
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse { id: row.id, name: row.name, size: row.size }),
    ))
}

/// Stream one multipart file field to a temp path, enforcing the size cap
/// with a running byte count. The partial file is removed on any failure.
async fn stream_to_disk(
    gw: &Gateway,
    run_id: &str,
    mut field: axum::extract::multipart::Field<'_>,
) -> ApiResult<(String, std::path::PathBuf, i64)> {
    let dir = gw.config.artifacts_dir().join(run_id);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| internal(anyhow::anyhow!("create artifact dir: {e}")))?;

    let artifact_id = new_artifact_id();
    let tmp_path = dir.join(format!(".upload-{artifact_id}"));
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .map_err(|e| internal(anyhow::anyhow!("create artifact file: {e}")))?;

    let cap = gw.config.max_artifact_size;
    let mut written: u64 = 0;
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(ApiError::BadRequest.to_http_response(format!("upload aborted: {e}")));
            }
        };
        written += chunk.len() as u64;
        if written > cap {
            drop(file);
            let _ = tokio::fs::remove_file(&tmp_path).await;
            tracing::warn!(run_id, written, cap, "artifact upload over size cap");
            return Err(ApiError::PayloadTooLarge.to_http_response("artifact too large"));
        }
        if let Err(e) = file.write_all(&chunk).await {
            drop(file);
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(internal(anyhow::anyhow!("write artifact: {e}")));
        }
    }
    if let Err(e) = file.flush().await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(internal(anyhow::anyhow!("flush artifact: {e}")));
    }
    Ok((artifact_id, tmp_path, written as i64))
}

async fn cleanup(stored: &Option<(String, std::path::PathBuf, i64)>) {
    if let Some((_, path, _)) = stored {
        let _ = tokio::fs::remove_file(path).await;
    }
}
