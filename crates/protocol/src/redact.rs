// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret scrubbing for outbound event payloads.
//!
//! Applied twice per event in the normal path (runner before send, gateway
//! before store), so redaction must be idempotent: the replacement marker
//! never matches any pattern. Replacements never contain CR/LF.

use regex::Regex;

/// Marker substituted for every match.
pub const MARKER: &str = "[redacted]";

/// Built-in patterns. Each covers one secret family end to end so that the
/// whole credential, not just its tail, is replaced.
const DEFAULT_PATTERNS: &[&str] = &[
    // Anthropic / OpenAI style API keys.
    r"sk-[A-Za-z0-9_-]{16,}",
    // GitHub tokens.
    r"gh[pousr]_[A-Za-z0-9]{20,}",
    // Slack tokens.
    r"xox[baprs]-[A-Za-z0-9-]{10,}",
    // AWS access key ids.
    r"AKIA[0-9A-Z]{16}",
    // Authorization headers, scheme and value.
    r"(?i)authorization:[ \t]*[A-Za-z]+[ \t]+[A-Za-z0-9._~+/=-]+",
    // Bare bearer credentials.
    r"(?i)\bbearer[ \t]+[A-Za-z0-9._~+/=-]{8,}",
    // key=value / key: value assignments for common secret names.
    r#"(?i)\b(?:api[_-]?key|secret|token|password|passwd)\b[ \t]*[=:][ \t]*["']?[A-Za-z0-9._~+/-]{8,}["']?"#,
    // PEM private key blocks, including the body.
    r"-----BEGIN [A-Z ]*PRIVATE KEY-----[A-Za-z0-9+/=\s]*?-----END [A-Z ]*PRIVATE KEY-----",
];

/// Regex-driven secret scrubber.
pub struct Redactor {
    patterns: Vec<Regex>,
}

impl Redactor {
    /// Build with the built-in pattern set.
    pub fn new() -> Self {
        Self::with_extra(std::iter::empty::<String>())
    }

    /// Build with the built-in set plus extra operator-supplied patterns.
    /// Invalid extras are skipped with a warning; the built-in set always
    /// stays active.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns = Vec::with_capacity(DEFAULT_PATTERNS.len());
        for src in DEFAULT_PATTERNS {
            match Regex::new(src) {
                Ok(re) => patterns.push(re),
                Err(e) => tracing::warn!(pattern = src, err = %e, "invalid built-in redaction pattern"),
            }
        }
        for src in extra {
            let src = src.as_ref().trim();
            if src.is_empty() {
                continue;
            }
            match Regex::new(src) {
                Ok(re) => patterns.push(re),
                Err(e) => tracing::warn!(pattern = src, err = %e, "skipping invalid redaction pattern"),
            }
        }
        Self { patterns }
    }

    /// Scrub `text`, replacing every match of every pattern with [`MARKER`].
    pub fn apply(&self, text: &str) -> String {
        let mut out = std::borrow::Cow::Borrowed(text);
        for re in &self.patterns {
            if re.is_match(&out) {
                out = std::borrow::Cow::Owned(re.replace_all(&out, MARKER).into_owned());
            }
        }
        out.into_owned()
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
