// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The gateway's three auth surfaces.
//!
//! UI routes carry a bearer session token; wrapper routes carry an HMAC
//! signature (optionally bound to a run via its capability token); client
//! routes additionally carry `X-Client-Token`. Failure responses say only
//! "unauthorized" or "forbidden" — which sub-check failed is recorded in
//! the audit trail, never returned to the caller.

use axum::http::HeaderMap;

use drover_protocol::sign;

use crate::error::{ApiError, ApiResult};
use crate::state::Gateway;
use crate::store::clients::ClientRow;
use crate::store::epoch_ms;
use crate::store::runs::RunRow;
use crate::store::sessions::{AuditEntry, Role, SessionRow};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Extract the bearer token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    header(headers, "authorization")?.strip_prefix("Bearer ")
}

/// Validate the UI session and gate on `required` role.
pub async fn require_ui(
    gw: &Gateway,
    headers: &HeaderMap,
    required: Role,
) -> ApiResult<SessionRow> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::Unauthorized.to_http_response("unauthorized"))?;
    require_ui_token(gw, token, required).await
}

/// Token-based variant shared with the WebSocket upgrade path, where the
/// browser passes the session token as a query parameter.
pub async fn require_ui_token(gw: &Gateway, token: &str, required: Role) -> ApiResult<SessionRow> {
    let session = gw
        .store
        .get_session(token)
        .await
        .map_err(crate::error::internal)?
        .ok_or_else(|| ApiError::Unauthorized.to_http_response("unauthorized"))?;
    if !session.role.allows(required) {
        return Err(ApiError::Forbidden.to_http_response("forbidden"));
    }
    Ok(session)
}

/// A verified wrapper request, with its bound run when `X-Run-Id` was sent.
#[derive(Debug)]
pub struct WrapperContext {
    pub run: Option<RunRow>,
}

impl WrapperContext {
    /// The bound run, required by run-scoped ingest routes.
    pub fn run(&self) -> ApiResult<&RunRow> {
        self.run
            .as_ref()
            .ok_or_else(|| ApiError::Unauthorized.to_http_response("unauthorized"))
    }
}

/// Header material parsed and replay-checked before the body is consumed.
/// Streaming routes hash the body as it arrives and call [`finish_wrapper`]
/// with the final digest.
#[derive(Debug)]
pub struct PendingHmac {
    timestamp: i64,
    nonce: String,
    signature: String,
    run_id: Option<String>,
    capability: Option<String>,
}

/// Phase one: parse headers, check clock skew, record the nonce.
pub async fn begin_wrapper(gw: &Gateway, headers: &HeaderMap) -> ApiResult<PendingHmac> {
    let unauthorized = || ApiError::Unauthorized.to_http_response("unauthorized");

    let timestamp: i64 = header(headers, sign::HDR_TIMESTAMP)
        .and_then(|v| v.parse().ok())
        .ok_or_else(unauthorized)?;
    let nonce = header(headers, sign::HDR_NONCE).ok_or_else(unauthorized)?;
    let signature = header(headers, sign::HDR_SIGNATURE).ok_or_else(unauthorized)?;
    if nonce.len() < sign::MIN_NONCE_BYTES * 2 {
        return Err(unauthorized());
    }

    let now_secs = epoch_ms() / 1_000;
    if (now_secs - timestamp).abs() > sign::SKEW_WINDOW_SECS {
        return Err(unauthorized());
    }

    let fresh = gw.store.insert_nonce(nonce).await.map_err(crate::error::internal)?;
    if !fresh {
        gw.store
            .audit(AuditEntry {
                action: "hmac.replay",
                object_type: "request",
                detail: Some(nonce),
                ..AuditEntry::default()
            })
            .await;
        return Err(unauthorized());
    }

    Ok(PendingHmac {
        timestamp,
        nonce: nonce.to_owned(),
        signature: signature.to_owned(),
        run_id: header(headers, sign::HDR_RUN_ID).map(str::to_owned),
        capability: header(headers, sign::HDR_CAPABILITY).map(str::to_owned),
    })
}

/// Phase two: constant-time signature check, then capability binding.
pub async fn finish_wrapper(
    gw: &Gateway,
    pending: PendingHmac,
    method: &str,
    path: &str,
    body_hash: &str,
) -> ApiResult<WrapperContext> {
    let canonical = sign::canonical_with_hash(
        method,
        path,
        body_hash,
        pending.timestamp,
        &pending.nonce,
        pending.run_id.as_deref(),
        pending.capability.as_deref(),
    );
    let expected = sign::sign_canonical(gw.config.hmac_secret.as_bytes(), &canonical);
    if expected.is_empty() || !sign::constant_time_eq(&expected, &pending.signature) {
        return Err(ApiError::Unauthorized.to_http_response("unauthorized"));
    }

    let run = match pending.run_id {
        None => None,
        Some(ref run_id) => {
            let run = gw.store.get_run(run_id).await.map_err(crate::error::internal)?;
            let matched = run.as_ref().is_some_and(|r| {
                pending
                    .capability
                    .as_deref()
                    .is_some_and(|cap| sign::constant_time_eq(cap, &r.capability_token))
            });
            if !matched {
                return Err(ApiError::Forbidden.to_http_response("forbidden"));
            }
            run
        }
    };

    Ok(WrapperContext { run })
}

/// One-shot wrapper verification for routes with buffered bodies.
pub async fn verify_wrapper(
    gw: &Gateway,
    headers: &HeaderMap,
    method: &str,
    path: &str,
    body: &[u8],
) -> ApiResult<WrapperContext> {
    let pending = begin_wrapper(gw, headers).await?;
    finish_wrapper(gw, pending, method, path, &sign::body_sha256_hex(body)).await
}

/// Validate `X-Client-Token` against the stored hash. Runs *in addition*
/// to HMAC verification on register/claim routes.
pub async fn require_client(gw: &Gateway, headers: &HeaderMap) -> ApiResult<ClientRow> {
    let token = header(headers, sign::HDR_CLIENT_TOKEN)
        .ok_or_else(|| ApiError::Forbidden.to_http_response("forbidden"))?;
    gw.store
        .get_client_by_token_hash(&sign::token_sha256_hex(token))
        .await
        .map_err(crate::error::internal)?
        .ok_or_else(|| ApiError::Forbidden.to_http_response("forbidden"))
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
