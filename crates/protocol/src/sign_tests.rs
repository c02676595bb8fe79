// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn input<'a>(body: &'a [u8], run_id: Option<&'a str>, cap: Option<&'a str>) -> SignInput<'a> {
    SignInput {
        method: "POST",
        path: "/api/ingest/event",
        body,
        timestamp: 1_700_000_000,
        nonce: "a1b2c3d4e5f60718293a4b5c6d7e8f90",
        run_id,
        capability_token: cap,
    }
}

#[test]
fn canonical_string_is_pinned() {
    let canon = canonical_string(&input(b"", None, None));
    // Seven fields joined by \n; empty-body hash is the SHA-256 of "".
    let fields: Vec<&str> = canon.split('\n').collect();
    assert_eq!(fields.len(), 7);
    assert_eq!(fields[0], "POST");
    assert_eq!(fields[1], "/api/ingest/event");
    assert_eq!(
        fields[2],
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(fields[3], "1700000000");
    assert_eq!(fields[5], "");
    assert_eq!(fields[6], "");
}

#[test]
fn method_is_uppercased() {
    let mut i = input(b"x", None, None);
    i.method = "post";
    assert_eq!(canonical_string(&i), {
        let mut j = input(b"x", None, None);
        j.method = "POST";
        canonical_string(&j)
    });
}

#[test]
fn sign_and_verify_round_trip() {
    let i = input(b"{\"type\":\"stdout\"}", Some("run123"), Some("cap-token"));
    let sig = sign(b"secret", &i);
    assert_eq!(sig.len(), 64);
    assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert!(verify(b"secret", &i, &sig));
}

#[yare::parameterized(
    wrong_secret = { b"other".as_slice(), None },
    wrong_body   = { b"secret".as_slice(), Some(b"tampered".as_slice()) },
)]
fn verify_rejects_mismatch(secret: &[u8], body_override: Option<&[u8]>) {
    let i = input(b"payload", Some("run123"), Some("cap"));
    let sig = sign(b"secret", &i);
    let check = match body_override {
        Some(body) => input(body, Some("run123"), Some("cap")),
        None => i,
    };
    assert!(!verify(secret, &check, &sig));
}

#[test]
fn run_binding_changes_signature() {
    let unbound = sign(b"s", &input(b"", None, None));
    let bound = sign(b"s", &input(b"", Some("r1"), Some("cap")));
    assert_ne!(unbound, bound);
}

#[test]
fn constant_time_eq_basic() {
    assert!(constant_time_eq("abc", "abc"));
    assert!(!constant_time_eq("abc", "abd"));
    assert!(!constant_time_eq("abc", "abcd"));
}

#[test]
fn generated_material_has_expected_shape() {
    let nonce = new_nonce();
    assert_eq!(nonce.len(), MIN_NONCE_BYTES * 2);
    assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));

    let token = new_token();
    assert!(token.len() >= 42);
    assert!(!token.contains('='));
    assert!(!token.contains('+'));
    assert!(!token.contains('/'));

    let id = new_run_id();
    assert_eq!(id.len(), 12);
    assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));

    assert_ne!(new_nonce(), new_nonce());
}

#[test]
fn token_hash_matches_sha256() {
    assert_eq!(
        token_sha256_hex("abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}
