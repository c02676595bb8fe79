// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signed HTTP client for runner → gateway traffic.
//!
//! Every request carries the HMAC headers from the shared protocol crate.
//! Gateway responses split into two classes: *fatal* (401/403/404/429 —
//! the run is gone or this wrapper is no longer welcome; the supervisor
//! exits) and *transient* (everything else; idempotent calls retry once).

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use drover_protocol::events::{CommandRecord, EventKind};
use drover_protocol::sign;
use drover_protocol::workers::WorkerKind;

/// Failure classification for gateway calls.
#[derive(Debug)]
pub enum GatewayError {
    /// The gateway rejected this wrapper for good; retire the run.
    Fatal { status: u16, message: String },
    /// Network or server hiccup; safe to retry idempotent calls.
    Transient(anyhow::Error),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal { status, message } => write!(f, "gateway rejected request ({status}): {message}"),
            Self::Transient(e) => write!(f, "gateway unreachable: {e}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl GatewayError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

fn classify(status: StatusCode, message: String) -> GatewayError {
    match status.as_u16() {
        401 | 403 | 404 | 429 => GatewayError::Fatal { status: status.as_u16(), message },
        _ => GatewayError::Transient(anyhow::anyhow!("status {status}: {message}")),
    }
}

/// Run binding for capability-scoped calls.
#[derive(Debug, Clone)]
pub struct RunBinding {
    pub run_id: String,
    pub capability_token: String,
}

pub struct GatewayClient {
    base_url: String,
    secret: Vec<u8>,
    run: Option<RunBinding>,
    client_token: Option<String>,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct IngestEventResponse {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct PollCommandsResponse {
    commands: Vec<CommandRecord>,
}

/// A run claimed via the client token.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedRun {
    pub id: String,
    pub capability_token: String,
    #[serde(default)]
    pub command: Option<String>,
    pub worker_type: WorkerKind,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl GatewayClient {
    pub fn new(
        base_url: &str,
        secret: &str,
        client_token: Option<String>,
        allow_self_signed: bool,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(allow_self_signed)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            secret: secret.as_bytes().to_vec(),
            run: None,
            client_token,
            http,
        })
    }

    /// Bind subsequent calls to a run.
    pub fn bind_run(&mut self, run_id: &str, capability_token: &str) {
        self.run = Some(RunBinding {
            run_id: run_id.to_owned(),
            capability_token: capability_token.to_owned(),
        });
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run.as_ref().map(|r| r.run_id.as_str())
    }

    /// Signed request builder. The signature binds method, path, body, and
    /// the run binding when present.
    fn signed(&self, method: reqwest::Method, path: &str, body: &[u8]) -> reqwest::RequestBuilder {
        let timestamp = now_secs();
        let nonce = sign::new_nonce();
        let (run_id, capability) = match self.run {
            Some(ref binding) => {
                (Some(binding.run_id.as_str()), Some(binding.capability_token.as_str()))
            }
            None => (None, None),
        };
        let signature = sign::sign(&self.secret, &sign::SignInput {
            method: method.as_str(),
            path,
            body,
            timestamp,
            nonce: &nonce,
            run_id,
            capability_token: capability,
        });

        let mut req = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header(sign::HDR_TIMESTAMP, timestamp.to_string())
            .header(sign::HDR_NONCE, nonce)
            .header(sign::HDR_SIGNATURE, signature);
        if let Some(id) = run_id {
            req = req.header(sign::HDR_RUN_ID, id);
        }
        if let Some(cap) = capability {
            req = req.header(sign::HDR_CAPABILITY, cap);
        }
        if let Some(ref token) = self.client_token {
            req = req.header(sign::HDR_CLIENT_TOKEN, token);
        }
        req
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, GatewayError> {
        let raw = match body {
            Some(value) => serde_json::to_vec(value)
                .map_err(|e| GatewayError::Transient(e.into()))?,
            None => Vec::new(),
        };
        let mut req = self.signed(method, path, &raw);
        if body.is_some() {
            req = req.header("content-type", "application/json").body(raw);
        }

        let resp = req.send().await.map_err(|e| GatewayError::Transient(e.into()))?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(classify(status, message));
        }
        resp.json::<T>().await.map_err(|e| GatewayError::Transient(e.into()))
    }

    /// Append one event. Not retried: the gateway assigns ids and a blind
    /// retry could double-append.
    pub async fn append_event(
        &self,
        kind: EventKind,
        data: &str,
        sequence: i64,
    ) -> Result<i64, GatewayError> {
        let body = json!({ "type": kind.as_str(), "data": data, "sequence": sequence });
        let resp: IngestEventResponse = self
            .send_json(reqwest::Method::POST, "/api/ingest/event", Some(&body))
            .await?;
        Ok(resp.id)
    }

    /// Poll pending commands; one transparent retry on transient failure.
    pub async fn poll_commands(&self) -> Result<Vec<CommandRecord>, GatewayError> {
        let path = match self.run {
            Some(ref binding) => format!("/api/runs/{}/commands", binding.run_id),
            None => return Ok(vec![]),
        };
        let first = self
            .send_json::<PollCommandsResponse>(reqwest::Method::GET, &path, None)
            .await;
        let resp = match first {
            Err(GatewayError::Transient(e)) => {
                tracing::debug!(err = %e, "command poll failed, retrying once");
                self.send_json::<PollCommandsResponse>(reqwest::Method::GET, &path, None).await?
            }
            other => other?,
        };
        Ok(resp.commands)
    }

    /// Ack a command. The gateway treats repeats as success, so a retry
    /// here is safe too.
    pub async fn ack_command(
        &self,
        command_id: &str,
        result: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), GatewayError> {
        let Some(ref binding) = self.run else {
            return Ok(());
        };
        let path = format!("/api/runs/{}/commands/{command_id}/ack", binding.run_id);
        let body = json!({ "result": result, "error": error });
        let first = self
            .send_json::<serde_json::Value>(reqwest::Method::POST, &path, Some(&body))
            .await;
        match first {
            Err(GatewayError::Transient(e)) => {
                tracing::debug!(err = %e, "ack failed, retrying once");
                self.send_json::<serde_json::Value>(reqwest::Method::POST, &path, Some(&body))
                    .await
                    .map(|_| ())
            }
            other => other.map(|_| ()),
        }
    }

    /// Upsert resume state; one retry (COALESCE upsert is idempotent).
    pub async fn upsert_state(
        &self,
        working_dir: Option<&str>,
        original_command: Option<&str>,
        last_sequence: Option<i64>,
    ) -> Result<(), GatewayError> {
        let Some(ref binding) = self.run else {
            return Ok(());
        };
        let path = format!("/api/runs/{}/state", binding.run_id);
        let body = json!({
            "workingDir": working_dir,
            "originalCommand": original_command,
            "lastSequence": last_sequence,
        });
        let first = self
            .send_json::<serde_json::Value>(reqwest::Method::POST, &path, Some(&body))
            .await;
        match first {
            Err(GatewayError::Transient(e)) => {
                tracing::debug!(err = %e, "state upsert failed, retrying once");
                self.send_json::<serde_json::Value>(reqwest::Method::POST, &path, Some(&body))
                    .await
                    .map(|_| ())
            }
            other => other.map(|_| ()),
        }
    }

    /// Register (or heartbeat) this host in the client registry. Requires
    /// the client token; silently skipped without one.
    pub async fn register_client(
        &self,
        agent_id: &str,
        capabilities: &[&str],
    ) -> Result<(), GatewayError> {
        if self.client_token.is_none() {
            return Ok(());
        }
        let body = json!({
            "agentId": agent_id,
            "version": env!("CARGO_PKG_VERSION"),
            "capabilities": capabilities,
        });
        self.send_json::<serde_json::Value>(
            reqwest::Method::POST,
            "/api/clients/register",
            Some(&body),
        )
        .await
        .map(|_| ())
    }

    /// Claim a pending run. `None` when the queue is empty.
    pub async fn claim_run(
        &self,
        worker_type: Option<WorkerKind>,
    ) -> Result<Option<ClaimedRun>, GatewayError> {
        let body = json!({ "workerType": worker_type.map(|w| w.as_str()) });
        match self
            .send_json::<ClaimedRun>(reqwest::Method::POST, "/api/runs/claim", Some(&body))
            .await
        {
            Ok(run) => Ok(Some(run)),
            Err(GatewayError::Fatal { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Upload an artifact. The multipart body streams, so the signature
    /// binds the header fields with the empty-body hash (matching the
    /// gateway's verifier for this route).
    pub async fn upload_artifact(
        &self,
        name: &str,
        kind: &str,
        contents: Vec<u8>,
    ) -> Result<(), GatewayError> {
        let form = reqwest::multipart::Form::new()
            .text("name", name.to_owned())
            .text("type", kind.to_owned())
            .part("file", reqwest::multipart::Part::bytes(contents).file_name(name.to_owned()));
        let resp = self
            .signed(reqwest::Method::POST, "/api/ingest/artifact", b"")
            .multipart(form)
            .send()
            .await
            .map_err(|e| GatewayError::Transient(e.into()))?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(classify(status, message));
        }
        Ok(())
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
