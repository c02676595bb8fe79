// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: gateway builder and wrapper-request signer.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use drover_protocol::sign;

use crate::config::GatewayConfig;
use crate::state::Gateway;
use crate::store::sessions::Role;
use crate::store::Store;

/// HMAC secret used across tests.
pub const TEST_SECRET: &str = "test-secret-0123456789abcdef";

/// Config pointing at a throwaway data directory.
pub fn test_config() -> GatewayConfig {
    let scratch = std::env::temp_dir()
        .join("droverhub-test")
        .join(uuid::Uuid::new_v4().to_string());
    GatewayConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        hmac_secret: TEST_SECRET.to_owned(),
        data_dir: scratch,
        database_path: None,
        artifacts_dir: None,
        max_artifact_size: 1024 * 1024,
        extra_allowed_commands: None,
        redact_patterns: None,
        ws_ping_ms: 30_000,
    }
}

/// Gateway over an in-memory store.
pub fn test_gateway() -> Arc<Gateway> {
    test_gateway_with(test_config())
}

pub fn test_gateway_with(config: GatewayConfig) -> Arc<Gateway> {
    // OK to panic in test-only code — infra setup failure is fatal.
    #[allow(clippy::expect_used)]
    let store = Store::open_in_memory().expect("open in-memory store");
    #[allow(clippy::expect_used)]
    std::fs::create_dir_all(config.artifacts_dir()).expect("create artifacts dir");
    Arc::new(Gateway::new(config, store, CancellationToken::new()))
}

/// Issue a UI session and return its bearer token.
pub async fn session_token(gw: &Gateway, role: Role) -> String {
    #[allow(clippy::expect_used)]
    let session = gw
        .store
        .create_session("test-user", role, 3_600_000)
        .await
        .expect("create session");
    session.id
}

/// Signed-header builder for wrapper requests.
pub struct WrapperSigner {
    pub secret: String,
    pub run: Option<(String, String)>,
}

impl WrapperSigner {
    pub fn unbound() -> Self {
        Self { secret: TEST_SECRET.to_owned(), run: None }
    }

    pub fn for_run(run_id: &str, capability: &str) -> Self {
        Self { secret: TEST_SECRET.to_owned(), run: Some((run_id.to_owned(), capability.to_owned())) }
    }

    /// Header pairs for one request. Each call burns a fresh nonce.
    pub fn headers(&self, method: &str, path: &str, body: &[u8]) -> Vec<(String, String)> {
        let timestamp = crate::store::epoch_ms() / 1_000;
        let nonce = sign::new_nonce();
        self.headers_at(method, path, body, timestamp, &nonce)
    }

    /// Fully pinned variant for skew and replay tests.
    pub fn headers_at(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
        timestamp: i64,
        nonce: &str,
    ) -> Vec<(String, String)> {
        let (run_id, capability) = match self.run {
            Some((ref id, ref cap)) => (Some(id.as_str()), Some(cap.as_str())),
            None => (None, None),
        };
        let signature = sign::sign(self.secret.as_bytes(), &sign::SignInput {
            method,
            path,
            body,
            timestamp,
            nonce,
            run_id,
            capability_token: capability,
        });

        let mut headers = vec![
            (sign::HDR_TIMESTAMP.to_owned(), timestamp.to_string()),
            (sign::HDR_NONCE.to_owned(), nonce.to_owned()),
            (sign::HDR_SIGNATURE.to_owned(), signature),
        ];
        if let Some(id) = run_id {
            headers.push((sign::HDR_RUN_ID.to_owned(), id.to_owned()));
        }
        if let Some(cap) = capability {
            headers.push((sign::HDR_CAPABILITY.to_owned(), cap.to_owned()));
        }
        headers
    }
}
