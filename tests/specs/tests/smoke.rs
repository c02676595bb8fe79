// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end protocol tests: the real gateway router served over TCP,
//! driven by signed wrapper requests, UI requests, a WebSocket client,
//! and (for the full loop) a live runner supervisor in listener mode.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

use drover::client::GatewayClient;
use drover::supervisor::{self, SupervisorSetup};
use drover_protocol::workers::WorkerKind;
use drover_specs::{signed_get, signed_post, ui_get, ui_post, GatewayHarness, WrapperSigner};
use droverhub::store::sessions::Role;
use droverhub::test_support::TEST_SECRET;

const TIMEOUT: Duration = Duration::from_secs(10);

async fn create_run(
    harness: &GatewayHarness,
    token: &str,
    body: serde_json::Value,
) -> anyhow::Result<(String, String)> {
    let resp = ui_post(harness, token, "/api/runs", body).await?;
    anyhow::ensure!(resp.status() == 201, "create failed: {}", resp.status());
    let json: serde_json::Value = resp.json().await?;
    let id = json["id"].as_str().unwrap_or_default().to_owned();
    let cap = json["capabilityToken"].as_str().unwrap_or_default().to_owned();
    anyhow::ensure!(!id.is_empty() && !cap.is_empty(), "missing id or token: {json}");
    Ok((id, cap))
}

/// Poll a UI endpoint until `check` passes or the deadline expires.
async fn wait_for<F>(
    harness: &GatewayHarness,
    token: &str,
    path: &str,
    check: F,
) -> anyhow::Result<serde_json::Value>
where
    F: Fn(&serde_json::Value) -> bool,
{
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let resp = ui_get(harness, token, path).await?;
        if resp.status().is_success() {
            let json: serde_json::Value = resp.json().await?;
            if check(&json) {
                return Ok(json);
            }
        }
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "timed out waiting on {path}");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

// -- Scenario: create, ingest, finish -----------------------------------------

#[tokio::test]
async fn create_then_ingest_completes_the_run() -> anyhow::Result<()> {
    let harness = GatewayHarness::start().await?;
    let token = harness.token(Role::Operator).await;
    let (run_id, cap) = create_run(&harness, &token, json!({ "command": "echo hi" })).await?;

    let signer = WrapperSigner::for_run(&run_id, &cap);
    for (kind, data) in [
        ("marker", r#"{"event":"started","command":"echo hi"}"#),
        ("stdout", "hi\n"),
        ("marker", r#"{"event":"finished","exitCode":0}"#),
    ] {
        let resp = signed_post(&harness, &signer, "/api/ingest/event", json!({
            "type": kind,
            "data": data,
        }))
        .await?;
        assert_eq!(resp.status(), 201, "{kind}");
    }

    let run = ui_get(&harness, &token, &format!("/api/runs/{run_id}")).await?;
    let run: serde_json::Value = run.json().await?;
    assert_eq!(run["status"], "done");
    assert_eq!(run["exitCode"], 0);

    let events = ui_get(&harness, &token, &format!("/api/runs/{run_id}/events")).await?;
    let events: serde_json::Value = events.json().await?;
    let events = events["events"].as_array().cloned().unwrap_or_default();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["type"], "marker");
    assert_eq!(events[1]["data"], "hi\n");
    assert_eq!(events[2]["type"], "marker");
    let mut last = 0;
    for event in &events {
        let id = event["id"].as_i64().unwrap_or_default();
        assert!(id > last, "ids must increase: {events:?}");
        last = id;
    }
    Ok(())
}

// -- Scenario: stop debounce --------------------------------------------------

#[tokio::test]
async fn triple_stop_enqueues_a_single_sentinel() -> anyhow::Result<()> {
    let harness = GatewayHarness::start().await?;
    let token = harness.token(Role::Operator).await;
    let (run_id, cap) = create_run(&harness, &token, json!({})).await?;

    let signer = WrapperSigner::for_run(&run_id, &cap);
    signed_post(&harness, &signer, "/api/ingest/event", json!({
        "type": "marker",
        "data": r#"{"event":"started"}"#,
    }))
    .await?;

    let mut command_ids = Vec::new();
    for _ in 0..3 {
        let resp =
            ui_post(&harness, &token, &format!("/api/runs/{run_id}/stop"), json!({})).await?;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await?;
        command_ids.push(body["commandId"].as_str().unwrap_or_default().to_owned());
    }
    // All three stops collapse onto the same pending command.
    assert_eq!(command_ids[0], command_ids[1]);
    assert_eq!(command_ids[1], command_ids[2]);

    let resp = signed_get(&harness, &signer, &format!("/api/runs/{run_id}/commands")).await?;
    let body: serde_json::Value = resp.json().await?;
    let commands = body["commands"].as_array().cloned().unwrap_or_default();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0]["command"], "__STOP__");
    Ok(())
}

// -- Scenario: capability mismatch --------------------------------------------

#[tokio::test]
async fn forged_capability_is_rejected_without_side_effects() -> anyhow::Result<()> {
    let harness = GatewayHarness::start().await?;
    let token = harness.token(Role::Operator).await;
    let (run_id, _cap) = create_run(&harness, &token, json!({})).await?;

    let forged = WrapperSigner::for_run(&run_id, "forged-capability-token");
    let poll = signed_get(&harness, &forged, &format!("/api/runs/{run_id}/commands")).await?;
    assert_eq!(poll.status(), 403);

    let append = signed_post(&harness, &forged, "/api/ingest/event", json!({
        "type": "stdout",
        "data": "sneaky",
    }))
    .await?;
    assert_eq!(append.status(), 403);

    // No rows were read or written for the run.
    let events = harness.gw.store.list_events(&run_id, 0, 100).await?;
    assert!(events.is_empty());
    let commands = harness.gw.store.pending_commands(&run_id).await?;
    assert!(commands.is_empty());
    Ok(())
}

// -- Scenario: replay ----------------------------------------------------------

#[tokio::test]
async fn replayed_request_is_rejected_and_audited() -> anyhow::Result<()> {
    let harness = GatewayHarness::start().await?;
    let token = harness.token(Role::Operator).await;
    let (run_id, cap) = create_run(&harness, &token, json!({})).await?;

    // Capture one signed request and send the exact bytes twice.
    let signer = WrapperSigner::for_run(&run_id, &cap);
    let path = "/api/ingest/event";
    let raw = serde_json::to_vec(&json!({ "type": "stdout", "data": "once" }))?;
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let nonce = drover_protocol::sign::new_nonce();
    let headers = signer.headers_at("POST", path, &raw, timestamp, &nonce);

    let client = reqwest::Client::new();
    let send = |headers: Vec<(String, String)>, raw: Vec<u8>| {
        let client = client.clone();
        let url = format!("{}{path}", harness.base_url());
        async move {
            let mut req = client.post(url).header("content-type", "application/json").body(raw);
            for (name, value) in headers {
                req = req.header(name, value);
            }
            req.send().await
        }
    };

    let first = send(headers.clone(), raw.clone()).await?;
    assert_eq!(first.status(), 201);

    let replayed = send(headers, raw).await?;
    assert_eq!(replayed.status(), 401);

    // The audit trail shows exactly one replay event.
    assert_eq!(harness.gw.store.count_audit("hmac.replay").await?, 1);
    Ok(())
}

// -- Scenario: artifact upload and overflow -----------------------------------

async fn upload(
    harness: &GatewayHarness,
    signer: &WrapperSigner,
    name: &str,
    bytes: Vec<u8>,
) -> anyhow::Result<reqwest::Response> {
    let form = reqwest::multipart::Form::new()
        .text("name", name.to_owned())
        .part("file", reqwest::multipart::Part::bytes(bytes).file_name(name.to_owned()));
    let client = reqwest::Client::new();
    let mut req = client.post(format!("{}/api/ingest/artifact", harness.base_url()));
    for (header, value) in signer.headers("POST", "/api/ingest/artifact", b"") {
        req = req.header(header, value);
    }
    Ok(req.multipart(form).send().await?)
}

#[tokio::test]
async fn artifact_round_trip_and_size_cap() -> anyhow::Result<()> {
    let harness = GatewayHarness::start().await?;
    let token = harness.token(Role::Operator).await;
    let (run_id, cap) = create_run(&harness, &token, json!({})).await?;
    let signer = WrapperSigner::for_run(&run_id, &cap);

    // Happy path.
    let resp = upload(&harness, &signer, "report.log", b"all green\n".to_vec()).await?;
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await?;
    let artifact_id = body["id"].as_str().unwrap_or_default().to_owned();
    assert_eq!(body["size"], 10);

    let download = ui_get(&harness, &token, &format!("/api/artifacts/{artifact_id}")).await?;
    assert_eq!(download.status(), 200);
    assert_eq!(download.text().await?, "all green\n");

    // Overflow: the test gateway caps uploads at 1 MiB.
    let oversized = vec![b'x'; 2 * 1024 * 1024];
    let resp = upload(&harness, &signer, "huge.bin", oversized).await?;
    assert_eq!(resp.status(), 413);

    // No row, and no partial file left on disk.
    let artifacts = harness.gw.store.list_artifacts(&run_id).await?;
    assert_eq!(artifacts.len(), 1);
    let dir = harness.gw.config.artifacts_dir().join(&run_id);
    let leftovers: Vec<_> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".upload-"))
        .collect();
    assert!(leftovers.is_empty(), "partial upload left behind");
    Ok(())
}

// -- WebSocket fan-out ---------------------------------------------------------

#[tokio::test]
async fn ws_subscribers_receive_events_in_order() -> anyhow::Result<()> {
    let harness = GatewayHarness::start().await?;
    let token = harness.token(Role::Viewer).await;
    let op_token = harness.token(Role::Operator).await;
    let (run_id, cap) = create_run(&harness, &op_token, json!({})).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(harness.ws_url(&token)).await?;

    // connected frame, then subscribe handshake.
    let hello = recv_json(&mut ws).await?;
    assert_eq!(hello["type"], "connected");
    ws.send(Message::text(json!({ "type": "subscribe", "runId": run_id }).to_string()))
        .await?;
    let sub = recv_json(&mut ws).await?;
    assert_eq!(sub["type"], "subscribed");

    let signer = WrapperSigner::for_run(&run_id, &cap);
    for i in 0..3 {
        signed_post(&harness, &signer, "/api/ingest/event", json!({
            "type": "stdout",
            "data": format!("line {i}\n"),
        }))
        .await?;
    }

    let mut last_id = 0;
    for i in 0..3 {
        let frame = recv_json(&mut ws).await?;
        assert_eq!(frame["type"], "event");
        assert_eq!(frame["event"]["data"], format!("line {i}\n"));
        let id = frame["event"]["id"].as_i64().unwrap_or_default();
        assert!(id > last_id);
        last_id = id;
    }

    // App-level ping still answered.
    ws.send(Message::text(json!({ "type": "ping" }).to_string())).await?;
    let pong = recv_json(&mut ws).await?;
    assert_eq!(pong["type"], "pong");
    Ok(())
}

async fn recv_json<S>(ws: &mut S) -> anyhow::Result<serde_json::Value>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "ws receive timed out");
        match tokio::time::timeout(TIMEOUT, ws.next()).await? {
            Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(text.as_str())?),
            Some(Ok(_)) => continue,
            Some(Err(e)) => anyhow::bail!("ws error: {e}"),
            None => anyhow::bail!("ws closed"),
        }
    }
}

// -- Full loop: gateway + supervisor in listener mode -------------------------

#[tokio::test]
async fn listener_supervisor_full_loop() -> anyhow::Result<()> {
    let harness = GatewayHarness::start().await?;
    let token = harness.token(Role::Operator).await;
    let (run_id, cap) = create_run(&harness, &token, json!({ "workerType": "claude" })).await?;

    let work_dir = tempfile::tempdir()?;
    let runs_dir = tempfile::tempdir()?;
    let mut client = GatewayClient::new(&harness.base_url(), TEST_SECRET, None, false)?;
    client.bind_run(&run_id, &cap);

    let setup = SupervisorSetup {
        run_id: run_id.clone(),
        working_dir: work_dir.path().to_path_buf(),
        worker: WorkerKind::Claude,
        autonomous: false,
        model: None,
        initial_prompt: None,
        original_command: None,
        runs_dir: runs_dir.path().to_path_buf(),
        poll_interval: Duration::from_millis(100),
        heartbeat_interval: Duration::from_millis(500),
    };
    let supervisor = tokio::spawn(supervisor::run(setup, client));

    // The listener-mode started marker flips the run to running.
    wait_for(&harness, &token, &format!("/api/runs/{run_id}"), |run| {
        run["status"] == "running"
    })
    .await?;

    // Inject an allowlisted command; the supervisor executes and acks it.
    let resp = ui_post(&harness, &token, &format!("/api/runs/{run_id}/command"), json!({
        "command": "pwd",
    }))
    .await?;
    assert_eq!(resp.status(), 200);
    let queued: serde_json::Value = resp.json().await?;
    let command_id = queued["commandId"].as_str().unwrap_or_default().to_owned();

    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let command = harness.gw.store.get_command(&command_id).await?;
        if let Some(command) = command {
            if command.acked_at.is_some() {
                assert_eq!(command.result.as_deref(), Some("."));
                break;
            }
        }
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "command never acked");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // Stop: the supervisor finishes and the run resolves to stopped.
    let resp = ui_post(&harness, &token, &format!("/api/runs/{run_id}/stop"), json!({})).await?;
    assert_eq!(resp.status(), 200);

    let exit_code = tokio::time::timeout(TIMEOUT, supervisor).await???;
    assert_eq!(exit_code, 0);

    wait_for(&harness, &token, &format!("/api/runs/{run_id}"), |run| {
        run["status"] == "stopped"
    })
    .await?;

    // Crash-resume state made it to the gateway.
    let state = ui_get(&harness, &token, &format!("/api/runs/{run_id}/state")).await?;
    let state: serde_json::Value = state.json().await?;
    assert!(state["state"]["workingDir"].as_str().is_some());
    assert_eq!(state["canResume"], false);
    Ok(())
}
