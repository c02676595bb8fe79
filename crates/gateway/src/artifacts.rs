// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact disk layout helpers: name sanitization, kind validation, and
//! content-type inference. Files land at
//! `<artifacts>/<run_id>/<id>_<name>`.

use rand::distr::Alphanumeric;
use rand::Rng;

/// Valid artifact kinds.
const KINDS: &[&str] = &["log", "text", "json", "diff", "patch", "markdown", "file"];

/// Random 12-char artifact id, also used as the stored filename prefix.
pub fn new_artifact_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .map(|b| (b as char).to_ascii_lowercase())
        .take(12)
        .collect()
}

/// Reduce an upload name to a safe basename: strip directories, replace
/// anything outside `[A-Za-z0-9._-]`, and never return an empty name.
pub fn sanitize_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "artifact".to_owned()
    } else {
        cleaned
    }
}

/// Validate a caller-provided kind, falling back to extension inference.
pub fn artifact_kind(provided: Option<&str>, name: &str) -> &'static str {
    if let Some(kind) = provided {
        if let Some(known) = KINDS.iter().find(|k| **k == kind) {
            return known;
        }
    }
    match extension(name) {
        "log" => "log",
        "txt" => "text",
        "json" => "json",
        "diff" => "diff",
        "patch" => "patch",
        "md" | "markdown" => "markdown",
        _ => "file",
    }
}

/// Content type for download responses, inferred from the extension.
pub fn content_type(name: &str) -> &'static str {
    match extension(name) {
        "log" | "txt" | "text" | "diff" | "patch" => "text/plain; charset=utf-8",
        "json" => "application/json",
        "md" | "markdown" => "text/markdown; charset=utf-8",
        "html" => "text/html; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gz" => "application/gzip",
        _ => "application/octet-stream",
    }
}

fn extension(name: &str) -> &str {
    name.rsplit('.').next().filter(|ext| *ext != name).unwrap_or("")
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
