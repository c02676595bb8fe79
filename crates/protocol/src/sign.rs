// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HMAC request signing for wrapper → gateway traffic.
//!
//! The signature covers method, path, body hash, timestamp, nonce, run id,
//! and capability token, joined with `\n`. Both sides build the exact same
//! canonical string; any drift breaks every wrapper in the field, so the
//! canonical form is pinned by tests here.

use hmac::{Hmac, Mac};
use rand::distr::Alphanumeric;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed clock drift between wrapper and gateway, seconds.
pub const SKEW_WINDOW_SECS: i64 = 300;

/// Minimum nonce entropy in bytes (transmitted hex-encoded).
pub const MIN_NONCE_BYTES: usize = 16;

pub const HDR_TIMESTAMP: &str = "x-timestamp";
pub const HDR_NONCE: &str = "x-nonce";
pub const HDR_SIGNATURE: &str = "x-signature";
pub const HDR_RUN_ID: &str = "x-run-id";
pub const HDR_CAPABILITY: &str = "x-capability-token";
pub const HDR_CLIENT_TOKEN: &str = "x-client-token";

/// Everything the signature binds for one request.
#[derive(Debug, Clone)]
pub struct SignInput<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub body: &'a [u8],
    pub timestamp: i64,
    pub nonce: &'a str,
    pub run_id: Option<&'a str>,
    pub capability_token: Option<&'a str>,
}

/// Lowercase hex SHA-256 of the raw request body (empty body included).
pub fn body_sha256_hex(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Build the canonical string from an already-computed body hash.
#[allow(clippy::too_many_arguments)]
pub fn canonical_with_hash(
    method: &str,
    path: &str,
    body_hash: &str,
    timestamp: i64,
    nonce: &str,
    run_id: Option<&str>,
    capability_token: Option<&str>,
) -> String {
    [
        method.to_ascii_uppercase().as_str(),
        path,
        body_hash,
        timestamp.to_string().as_str(),
        nonce,
        run_id.unwrap_or(""),
        capability_token.unwrap_or(""),
    ]
    .join("\n")
}

/// Build the canonical string the HMAC covers.
pub fn canonical_string(input: &SignInput<'_>) -> String {
    canonical_with_hash(
        input.method,
        input.path,
        &body_sha256_hex(input.body),
        input.timestamp,
        input.nonce,
        input.run_id,
        input.capability_token,
    )
}

/// HMAC a canonical string, returning the lowercase hex signature.
pub fn sign_canonical(secret: &[u8], canonical: &str) -> String {
    // new_from_slice only fails for unusable key lengths, which HMAC does
    // not have; map to an empty signature that can never verify.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return String::new();
    };
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Sign a request, returning the lowercase hex signature.
pub fn sign(secret: &[u8], input: &SignInput<'_>) -> String {
    sign_canonical(secret, &canonical_string(input))
}

/// Verify a signature in constant time.
pub fn verify(secret: &[u8], input: &SignInput<'_>, provided_hex: &str) -> bool {
    let expected = sign(secret, input);
    !expected.is_empty() && constant_time_eq(&expected, provided_hex)
}

/// Constant-time string comparison to prevent timing side-channel attacks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Lowercase hex SHA-256 of a token, as stored in `clients.token_hash`.
pub fn token_sha256_hex(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Fresh random nonce: `MIN_NONCE_BYTES` bytes, hex-encoded.
pub fn new_nonce() -> String {
    let mut buf = [0u8; MIN_NONCE_BYTES];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Fresh capability or client token: 32 random bytes, URL-safe base64.
pub fn new_token() -> String {
    use base64::Engine;
    let mut buf = [0u8; 32];
    rand::rng().fill_bytes(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Short opaque run id: 12 lowercase alphanumeric characters.
pub fn new_run_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .map(|b| (b as char).to_ascii_lowercase())
        .take(12)
        .collect()
}

#[cfg(test)]
#[path = "sign_tests.rs"]
mod tests;
