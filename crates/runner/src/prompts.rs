// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt detection over worker output.
//!
//! Two classes: *trust* dialogs (numbered options, auto-answered `1\n`)
//! and plain *confirm* questions (auto-answered `y\n`). Trust patterns
//! win when both match — trust dialogs usually end in a `[y/N]` tail that
//! would otherwise read as a confirm.

use std::time::Duration;

use regex::Regex;

/// Terminal-settle delay before an auto-answer is written.
pub const ANSWER_DELAY: Duration = Duration::from_millis(500);

const TRUST_NEEDLES: &[&str] = &[
    "Do you trust the files in this folder",
    "Is this a project you created or one you trust",
    "Yes, I trust this folder",
    "trust this workspace",
];

const CONFIRM_PATTERNS: &[&str] = &[
    r"\[y/N\]",
    r"\[Y/n\]",
    r"\(y/n\)",
    r"(?i)do you want to (?:continue|proceed)\?",
    r"(?i)are you sure\?",
    r"(?i)proceed\? \[",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptClass {
    Trust,
    Confirm,
}

impl PromptClass {
    /// The bytes written to the worker to resolve the prompt.
    pub fn answer(&self) -> &'static str {
        match self {
            Self::Trust => "1\n",
            Self::Confirm => "y\n",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trust => "trust",
            Self::Confirm => "confirm",
        }
    }
}

/// A detected prompt: its class and the line that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedPrompt {
    pub class: PromptClass,
    pub excerpt: String,
}

pub struct PromptDetector {
    confirm: Vec<Regex>,
}

impl PromptDetector {
    pub fn new() -> Self {
        let confirm = CONFIRM_PATTERNS
            .iter()
            .filter_map(|src| match Regex::new(src) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(pattern = src, err = %e, "invalid confirm pattern");
                    None
                }
            })
            .collect();
        Self { confirm }
    }

    /// Scan a chunk of (already redacted) output. Returns the first
    /// prompt found, trust class first.
    pub fn detect(&self, text: &str) -> Option<DetectedPrompt> {
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            if TRUST_NEEDLES.iter().any(|needle| line.contains(needle)) {
                return Some(DetectedPrompt {
                    class: PromptClass::Trust,
                    excerpt: line.trim().to_owned(),
                });
            }
        }
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            if self.confirm.iter().any(|re| re.is_match(line)) {
                return Some(DetectedPrompt {
                    class: PromptClass::Confirm,
                    excerpt: line.trim().to_owned(),
                });
            }
        }
        None
    }
}

impl Default for PromptDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "prompts_tests.rs"]
mod tests;
