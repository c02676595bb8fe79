// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the gateway HTTP API.
//!
//! Uses `axum_test::TestServer` — no real TCP needed.

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;

use droverhub::routes::build_router;
use droverhub::store::sessions::Role;
use droverhub::test_support::{session_token, test_gateway};

struct Ui {
    server: TestServer,
    gw: std::sync::Arc<droverhub::state::Gateway>,
}

impl Ui {
    async fn new() -> anyhow::Result<Self> {
        let gw = test_gateway();
        let server = TestServer::new(build_router(std::sync::Arc::clone(&gw)))
            .map_err(|e| anyhow::anyhow!("test server: {e}"))?;
        Ok(Self { server, gw })
    }

    async fn token(&self, role: Role) -> String {
        session_token(&self.gw, role).await
    }
}

fn bearer(token: &str) -> (axum::http::HeaderName, axum::http::HeaderValue) {
    (
        axum::http::header::AUTHORIZATION,
        axum::http::HeaderValue::from_str(&format!("Bearer {token}"))
            .unwrap_or(axum::http::HeaderValue::from_static("Bearer invalid")),
    )
}

#[tokio::test]
async fn health_needs_no_auth() -> anyhow::Result<()> {
    let ui = Ui::new().await?;
    let resp = ui.server.get("/api/health").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
    Ok(())
}

#[tokio::test]
async fn runs_require_a_session() -> anyhow::Result<()> {
    let ui = Ui::new().await?;
    let resp = ui.server.get("/api/runs").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);

    let token = ui.token(Role::Viewer).await;
    let (name, value) = bearer(&token);
    let resp = ui.server.get("/api/runs").add_header(name, value).await;
    resp.assert_status_ok();
    Ok(())
}

#[tokio::test]
async fn create_run_enforces_role_and_validation() -> anyhow::Result<()> {
    let ui = Ui::new().await?;

    // Viewers cannot create runs.
    let viewer = ui.token(Role::Viewer).await;
    let (name, value) = bearer(&viewer);
    let resp =
        ui.server.post("/api/runs").add_header(name, value).json(&json!({})).await;
    resp.assert_status(StatusCode::FORBIDDEN);

    // Operators can; unknown worker types are rejected.
    let operator = ui.token(Role::Operator).await;
    let (name, value) = bearer(&operator);
    let resp = ui
        .server
        .post("/api/runs")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "workerType": "emacs" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    let resp = ui
        .server
        .post("/api/runs")
        .add_header(name, value)
        .json(&json!({ "command": "npm test", "workerType": "codex", "autonomous": true }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["autonomous"], true);
    assert!(body["capabilityToken"].as_str().is_some_and(|t| t.len() >= 42));
    Ok(())
}

#[tokio::test]
async fn list_runs_validates_limits() -> anyhow::Result<()> {
    let ui = Ui::new().await?;
    let token = ui.token(Role::Viewer).await;

    for bad in ["limit=0", "limit=2000", "status=sideways"] {
        let (name, value) = bearer(&token);
        let resp = ui.server.get(&format!("/api/runs?{bad}")).add_header(name, value).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    let (name, value) = bearer(&token);
    let resp =
        ui.server.get("/api/runs?limit=10&status=pending").add_header(name, value).await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["total"], 0);
    assert_eq!(body["hasMore"], false);
    Ok(())
}

#[tokio::test]
async fn unknown_run_is_404() -> anyhow::Result<()> {
    let ui = Ui::new().await?;
    let token = ui.token(Role::Viewer).await;
    let (name, value) = bearer(&token);
    let resp = ui.server.get("/api/runs/nosuchrun123").add_header(name, value).await;
    resp.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn command_enqueue_enforces_state_and_allowlist() -> anyhow::Result<()> {
    let ui = Ui::new().await?;
    let token = ui.token(Role::Operator).await;
    let run = ui.gw.store.create_run(Default::default()).await?;

    // Pending run: not running yet.
    let (name, value) = bearer(&token);
    let resp = ui
        .server
        .post(&format!("/api/runs/{}/command", run.id))
        .add_header(name, value)
        .json(&json!({ "command": "ls" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    ui.gw.store.mark_started(&run.id).await?;

    // Allowlist rejection carries the fixed message the UI matches on.
    let (name, value) = bearer(&token);
    let resp = ui
        .server
        .post(&format!("/api/runs/{}/command", run.id))
        .add_header(name, value)
        .json(&json!({ "command": "rm -rf /" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"], "Command not in allowlist");

    // Sentinels cannot come through the generic route.
    let (name, value) = bearer(&token);
    let resp = ui
        .server
        .post(&format!("/api/runs/{}/command", run.id))
        .add_header(name, value)
        .json(&json!({ "command": "__HALT__" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    // An allowlisted command goes through and is audited.
    let (name, value) = bearer(&token);
    let resp = ui
        .server
        .post(&format!("/api/runs/{}/command", run.id))
        .add_header(name, value)
        .json(&json!({ "command": "git diff HEAD~1" }))
        .await;
    resp.assert_status_ok();
    assert_eq!(ui.gw.store.count_audit("command.enqueue").await?, 1);
    Ok(())
}

#[tokio::test]
async fn halt_requires_running_and_debounces() -> anyhow::Result<()> {
    let ui = Ui::new().await?;
    let token = ui.token(Role::Operator).await;
    let run = ui.gw.store.create_run(Default::default()).await?;

    let (name, value) = bearer(&token);
    let resp =
        ui.server.post(&format!("/api/runs/{}/halt", run.id)).add_header(name, value).await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    ui.gw.store.mark_started(&run.id).await?;
    let (name, value) = bearer(&token);
    let first = ui
        .server
        .post(&format!("/api/runs/{}/halt", run.id))
        .add_header(name.clone(), value.clone())
        .await;
    first.assert_status_ok();
    let first: serde_json::Value = first.json();

    // Concurrent duplicate halt is a no-op on the same pending command.
    let second =
        ui.server.post(&format!("/api/runs/{}/halt", run.id)).add_header(name, value).await;
    second.assert_status_ok();
    let second: serde_json::Value = second.json();
    assert_eq!(first["commandId"], second["commandId"]);
    Ok(())
}

#[tokio::test]
async fn input_route_builds_the_sentinel() -> anyhow::Result<()> {
    let ui = Ui::new().await?;
    let token = ui.token(Role::Operator).await;
    let run = ui.gw.store.create_run(Default::default()).await?;
    ui.gw.store.mark_started(&run.id).await?;

    let (name, value) = bearer(&token);
    let resp = ui
        .server
        .post(&format!("/api/runs/{}/input", run.id))
        .add_header(name, value)
        .json(&json!({ "text": "hello", "escape": true }))
        .await;
    resp.assert_status_ok();

    let pending = ui.gw.store.pending_commands(&run.id).await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].command, "__INPUT__:\u{3}hello");
    Ok(())
}

#[tokio::test]
async fn delete_run_is_admin_only() -> anyhow::Result<()> {
    let ui = Ui::new().await?;
    let run = ui.gw.store.create_run(Default::default()).await?;

    let operator = ui.token(Role::Operator).await;
    let (name, value) = bearer(&operator);
    let resp =
        ui.server.delete(&format!("/api/runs/{}", run.id)).add_header(name, value).await;
    resp.assert_status(StatusCode::FORBIDDEN);

    let admin = ui.token(Role::Admin).await;
    let (name, value) = bearer(&admin);
    let resp = ui
        .server
        .delete(&format!("/api/runs/{}", run.id))
        .add_header(name.clone(), value.clone())
        .await;
    resp.assert_status(StatusCode::NO_CONTENT);

    let resp =
        ui.server.delete(&format!("/api/runs/{}", run.id)).add_header(name, value).await;
    resp.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn restart_inherits_and_links_back() -> anyhow::Result<()> {
    let ui = Ui::new().await?;
    let token = ui.token(Role::Operator).await;
    let run = ui
        .gw
        .store
        .create_run(droverhub::store::runs::NewRun {
            command: Some("npm test".to_owned()),
            ..Default::default()
        })
        .await?;

    let (name, value) = bearer(&token);
    let resp = ui
        .server
        .post(&format!("/api/runs/{}/restart", run.id))
        .add_header(name.clone(), value.clone())
        .json(&json!({}))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = resp.json();
    let new_id = body["id"].as_str().unwrap_or_default().to_owned();
    assert_ne!(new_id, run.id);

    let resp = ui.server.get(&format!("/api/runs/{new_id}")).add_header(name, value).await;
    resp.assert_status_ok();
    let detail: serde_json::Value = resp.json();
    assert_eq!(detail["metadata"]["restartedFrom"], run.id.as_str());
    assert_eq!(detail["command"], "npm test");
    Ok(())
}

#[tokio::test]
async fn client_provisioning_conflicts_and_rotation() -> anyhow::Result<()> {
    let ui = Ui::new().await?;
    let admin = ui.token(Role::Admin).await;

    let (name, value) = bearer(&admin);
    let resp = ui
        .server
        .post("/api/clients/create")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "displayName": "build-host" }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = resp.json();
    let client_id = body["id"].as_str().unwrap_or_default().to_owned();
    assert!(body["token"].as_str().is_some());

    // Duplicate name conflicts.
    let resp = ui
        .server
        .post("/api/clients/create")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "displayName": "build-host" }))
        .await;
    resp.assert_status(StatusCode::CONFLICT);

    // Rotation returns a fresh token once.
    let resp = ui
        .server
        .post(&format!("/api/clients/{client_id}/token"))
        .add_header(name.clone(), value.clone())
        .await;
    resp.assert_status_ok();

    let resp = ui
        .server
        .post("/api/clients/unknown/token")
        .add_header(name, value)
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}
