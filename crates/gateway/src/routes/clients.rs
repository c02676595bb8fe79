// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-host client provisioning (UI admin) and self-registration /
//! run claiming (wrapper HMAC + client token).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use drover_protocol::workers::WorkerKind;

use crate::auth::{require_client, require_ui, verify_wrapper};
use crate::error::{internal, ApiError, ApiResult};
use crate::state::Gateway;
use crate::store::clients::ClientRegistration;
use crate::store::epoch_ms;
use crate::store::sessions::{AuditEntry, Role};

// -- UI provisioning ----------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    pub display_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTokenResponse {
    pub id: String,
    /// Plaintext token — shown exactly once; only its hash is stored.
    pub token: String,
}

/// `POST /api/clients/create` — provision a client and issue its token.
pub async fn create_client(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Json(req): Json<CreateClientRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = require_ui(&gw, &headers, Role::Admin).await?;
    let display_name = req.display_name.trim();
    if display_name.is_empty() {
        return Err(ApiError::BadRequest.to_http_response("displayName is required"));
    }

    let Some((row, token)) = gw.store.create_client(display_name).await.map_err(internal)?
    else {
        return Err(ApiError::Conflict.to_http_response("client already exists"));
    };
    gw.store
        .audit(AuditEntry {
            user_id: Some(&session.user_id),
            action: "client.create",
            object_type: "client",
            object_id: Some(&row.id),
            detail: Some(display_name),
            ..AuditEntry::default()
        })
        .await;
    tracing::info!(client_id = %row.id, name = display_name, "client provisioned");
    Ok((StatusCode::CREATED, Json(ClientTokenResponse { id: row.id, token })))
}

/// `POST /api/clients/{id}/token` — rotate, invalidating the old token.
pub async fn rotate_token(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = require_ui(&gw, &headers, Role::Admin).await?;
    let Some(token) = gw.store.rotate_client_token(&id).await.map_err(internal)? else {
        return Err(ApiError::NotFound.to_http_response("client not found"));
    };
    gw.store
        .audit(AuditEntry {
            user_id: Some(&session.user_id),
            action: "client.rotate_token",
            object_type: "client",
            object_id: Some(&id),
            ..AuditEntry::default()
        })
        .await;
    Ok(Json(ClientTokenResponse { id, token }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientView {
    pub id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub capabilities: Vec<String>,
    pub created_at: i64,
}

/// `GET /api/clients` — list with derived liveness status.
pub async fn list_clients(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    require_ui(&gw, &headers, Role::Viewer).await?;
    let now = epoch_ms();
    let clients = gw.store.list_clients().await.map_err(internal)?;
    let views: Vec<ClientView> = clients
        .into_iter()
        .map(|c| ClientView {
            status: c.status(now),
            id: c.id,
            display_name: c.display_name,
            agent_id: c.agent_id,
            last_seen_at: c.last_seen_at,
            version: c.version,
            capabilities: c.capabilities,
            created_at: c.created_at,
        })
        .collect();
    Ok(Json(serde_json::json!({ "clients": views })))
}

// -- Wrapper self-service -----------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
}

/// `POST /api/clients/register` — self-register or heartbeat. Requires a
/// valid HMAC *and* a valid client token; a good signature with a bad
/// token is still 403.
pub async fn register(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> ApiResult<impl IntoResponse> {
    verify_wrapper(&gw, &headers, "POST", "/api/clients/register", &body).await?;
    let client = require_client(&gw, &headers).await?;

    let req: RegisterRequest = if body.is_empty() {
        RegisterRequest { agent_id: None, version: None, capabilities: None }
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest.to_http_response(format!("invalid body: {e}")))?
    };
    gw.store
        .register_client(&client.id, ClientRegistration {
            agent_id: req.agent_id,
            version: req.version,
            capabilities: req.capabilities,
        })
        .await
        .map_err(internal)?;
    Ok(Json(serde_json::json!({ "id": client.id, "registered": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    #[serde(default)]
    pub worker_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub id: String,
    pub capability_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub worker_type: WorkerKind,
    pub metadata: serde_json::Value,
}

/// `POST /api/runs/claim` — claim the oldest matching pending run. The
/// capability token is handed to the claiming client; this is the one
/// path besides creation where it leaves the gateway.
pub async fn claim_run(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> ApiResult<impl IntoResponse> {
    verify_wrapper(&gw, &headers, "POST", "/api/runs/claim", &body).await?;
    let client = require_client(&gw, &headers).await?;

    let req: ClaimRequest = if body.is_empty() {
        ClaimRequest { worker_type: None }
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest.to_http_response(format!("invalid body: {e}")))?
    };
    let worker_type = match req.worker_type.as_deref() {
        None => None,
        Some(raw) => Some(WorkerKind::parse(raw).ok_or_else(|| {
            ApiError::BadRequest.to_http_response(format!("unknown worker type: {raw}"))
        })?),
    };

    let Some(run) =
        gw.store.claim_pending_run(&client.id, worker_type).await.map_err(internal)?
    else {
        return Err(ApiError::NotFound.to_http_response("no pending runs"));
    };
    tracing::info!(run_id = %run.id, client_id = %client.id, "run claimed");
    Ok(Json(ClaimResponse {
        id: run.id,
        capability_token: run.capability_token,
        command: run.command,
        worker_type: run.worker_type,
        metadata: run.metadata,
    }))
}
