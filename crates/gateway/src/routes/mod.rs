// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket routes.
//!
//! Request-body policy, stated once for every route: unknown JSON fields
//! are ignored; unknown *values* (bad enums, out-of-range numbers) are 400.

pub mod artifacts;
pub mod clients;
pub mod control;
pub mod ingest;
pub mod runs;
pub mod ws;

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::Gateway;
use crate::store::epoch_ms;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    clients: usize,
    #[serde(rename = "serverTime")]
    server_time: i64,
}

/// `GET /api/health` — unauthenticated liveness.
async fn health(State(gw): State<Arc<Gateway>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        clients: gw.hub.client_count(),
        server_time: epoch_ms(),
    })
}

/// Build the axum `Router` with all gateway routes.
pub fn build_router(gw: Arc<Gateway>) -> Router {
    let artifact_body_cap =
        usize::try_from(gw.config.max_artifact_size).unwrap_or(usize::MAX).saturating_add(1 << 20);

    Router::new()
        // Health (no auth)
        .route("/api/health", get(health))
        // Runs (UI)
        .route("/api/runs", post(runs::create_run).get(runs::list_runs))
        .route("/api/runs/{id}", get(runs::get_run).delete(runs::delete_run))
        .route("/api/runs/{id}/events", get(runs::list_events))
        .route("/api/runs/{id}/state", get(runs::get_state).post(ingest::upsert_state))
        .route("/api/runs/{id}/restart", post(runs::restart))
        // Command control (UI)
        .route("/api/runs/{id}/command", post(control::enqueue_command))
        .route("/api/runs/{id}/stop", post(control::stop))
        .route("/api/runs/{id}/halt", post(control::halt))
        .route("/api/runs/{id}/escape", post(control::escape))
        .route("/api/runs/{id}/input", post(control::input))
        // Wrapper ingress
        .route("/api/ingest/event", post(ingest::ingest_event))
        .route(
            "/api/ingest/artifact",
            post(ingest::ingest_artifact).layer(DefaultBodyLimit::max(artifact_body_cap)),
        )
        .route("/api/runs/{id}/commands", get(ingest::poll_commands))
        .route("/api/runs/{id}/commands/{cid}/ack", post(ingest::ack_command))
        // Clients
        .route("/api/clients", get(clients::list_clients))
        .route("/api/clients/create", post(clients::create_client))
        .route("/api/clients/{id}/token", post(clients::rotate_token))
        .route("/api/clients/register", post(clients::register))
        .route("/api/runs/claim", post(clients::claim_run))
        // Artifacts (UI)
        .route(
            "/api/artifacts/{id}",
            get(artifacts::download).delete(artifacts::delete_artifact),
        )
        // WebSocket hub
        .route("/ws", get(ws::ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(gw)
}
