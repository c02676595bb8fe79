// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end protocol tests.
//!
//! Serves the real gateway router on a loopback listener and exposes
//! signed-request helpers, so both halves of the protocol — HTTP ingress
//! and WebSocket fan-out — are exercised exactly as a wrapper and a
//! browser would.

use std::net::SocketAddr;
use std::sync::Arc;

use droverhub::routes::build_router;
use droverhub::state::Gateway;
use droverhub::store::sessions::Role;
use droverhub::test_support::{session_token, test_gateway};

pub use droverhub::test_support::WrapperSigner;

/// A gateway served on a random loopback port, shut down on drop.
pub struct GatewayHarness {
    pub gw: Arc<Gateway>,
    pub addr: SocketAddr,
    server: tokio::task::JoinHandle<()>,
}

impl GatewayHarness {
    pub async fn start() -> anyhow::Result<Self> {
        let gw = test_gateway();
        let router = build_router(Arc::clone(&gw));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(Self { gw, addr, server })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?token={token}", self.addr)
    }

    /// Issue a UI session and return its bearer token.
    pub async fn token(&self, role: Role) -> String {
        session_token(&self.gw, role).await
    }
}

impl Drop for GatewayHarness {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Send a signed wrapper request through the HTTP surface.
pub async fn signed_post(
    harness: &GatewayHarness,
    signer: &WrapperSigner,
    path: &str,
    body: serde_json::Value,
) -> anyhow::Result<reqwest::Response> {
    let raw = serde_json::to_vec(&body)?;
    let client = reqwest::Client::new();
    let mut req = client
        .post(format!("{}{path}", harness.base_url()))
        .header("content-type", "application/json")
        .body(raw.clone());
    for (name, value) in signer.headers("POST", path, &raw) {
        req = req.header(name, value);
    }
    Ok(req.send().await?)
}

pub async fn signed_get(
    harness: &GatewayHarness,
    signer: &WrapperSigner,
    path: &str,
) -> anyhow::Result<reqwest::Response> {
    let client = reqwest::Client::new();
    let mut req = client.get(format!("{}{path}", harness.base_url()));
    for (name, value) in signer.headers("GET", path, b"") {
        req = req.header(name, value);
    }
    Ok(req.send().await?)
}

/// UI-authenticated JSON POST.
pub async fn ui_post(
    harness: &GatewayHarness,
    token: &str,
    path: &str,
    body: serde_json::Value,
) -> anyhow::Result<reqwest::Response> {
    let client = reqwest::Client::new();
    Ok(client
        .post(format!("{}{path}", harness.base_url()))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await?)
}

pub async fn ui_get(
    harness: &GatewayHarness,
    token: &str,
    path: &str,
) -> anyhow::Result<reqwest::Response> {
    let client = reqwest::Client::new();
    Ok(client
        .get(format!("{}{path}", harness.base_url()))
        .bearer_auth(token)
        .send()
        .await?)
}
