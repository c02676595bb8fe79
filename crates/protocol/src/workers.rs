// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker registry: one row of data per worker kind instead of a class
//! hierarchy. Argv shaping is a pure function over (prompt, model,
//! autonomous) so the supervisor never needs kind-specific branches beyond
//! the interactive/non-interactive split.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Worker kinds the control plane knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerKind {
    Claude,
    Codex,
    Gemini,
    Ollama,
    OllamaLaunch,
    Rev,
    Vnc,
    HandsOn,
}

impl WorkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
            Self::OllamaLaunch => "ollama-launch",
            Self::Rev => "rev",
            Self::Vnc => "vnc",
            Self::HandsOn => "hands-on",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "claude" => Some(Self::Claude),
            "codex" => Some(Self::Codex),
            "gemini" => Some(Self::Gemini),
            "ollama" => Some(Self::Ollama),
            "ollama-launch" => Some(Self::OllamaLaunch),
            "rev" => Some(Self::Rev),
            "vnc" => Some(Self::Vnc),
            "hands-on" => Some(Self::HandsOn),
            _ => None,
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry row for one worker kind.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSpec {
    pub kind: WorkerKind,
    /// CLI executable name.
    pub command: &'static str,
    /// Injected before user argv (e.g. `exec`, `run`).
    pub subcommand: Option<&'static str>,
    /// Used when the caller does not pick a model.
    pub default_model: Option<&'static str>,
    /// Whether `--model <name>` style selection applies.
    pub supports_model_selection: bool,
    /// argv fragment added in autonomous mode.
    pub autonomous_args: &'static [&'static str],
    /// Interactive workers receive `__INPUT__` text on stdin; the rest get
    /// a fresh process per input.
    pub interactive: bool,
    /// `vnc` and `hands-on` never execute text commands.
    pub executes_commands: bool,
}

const REGISTRY: &[WorkerSpec] = &[
    WorkerSpec {
        kind: WorkerKind::Claude,
        command: "claude",
        subcommand: None,
        default_model: None,
        supports_model_selection: true,
        autonomous_args: &["--dangerously-skip-permissions"],
        interactive: true,
        executes_commands: true,
    },
    WorkerSpec {
        kind: WorkerKind::Codex,
        command: "codex",
        subcommand: Some("exec"),
        default_model: None,
        supports_model_selection: true,
        autonomous_args: &["--full-auto"],
        interactive: false,
        executes_commands: true,
    },
    WorkerSpec {
        kind: WorkerKind::Gemini,
        command: "gemini",
        subcommand: None,
        default_model: None,
        supports_model_selection: true,
        autonomous_args: &["--yolo"],
        interactive: false,
        executes_commands: true,
    },
    WorkerSpec {
        kind: WorkerKind::Ollama,
        command: "ollama",
        subcommand: Some("run"),
        default_model: Some("llama3.2"),
        supports_model_selection: true,
        autonomous_args: &[],
        interactive: false,
        executes_commands: true,
    },
    WorkerSpec {
        kind: WorkerKind::OllamaLaunch,
        command: "ollama",
        subcommand: Some("serve"),
        default_model: None,
        supports_model_selection: false,
        autonomous_args: &[],
        interactive: false,
        executes_commands: true,
    },
    WorkerSpec {
        kind: WorkerKind::Rev,
        command: "rev",
        subcommand: None,
        default_model: None,
        supports_model_selection: false,
        autonomous_args: &[],
        interactive: false,
        executes_commands: true,
    },
    WorkerSpec {
        kind: WorkerKind::Vnc,
        command: "x11vnc",
        subcommand: None,
        default_model: None,
        supports_model_selection: false,
        autonomous_args: &[],
        interactive: false,
        executes_commands: false,
    },
    WorkerSpec {
        kind: WorkerKind::HandsOn,
        command: "",
        subcommand: None,
        default_model: None,
        supports_model_selection: false,
        autonomous_args: &[],
        interactive: false,
        executes_commands: false,
    },
];

/// Look up the registry row for a kind.
pub fn spec(kind: WorkerKind) -> &'static WorkerSpec {
    // The registry covers every variant; the fallback is unreachable but
    // keeps the lookup total without panicking.
    REGISTRY.iter().find(|s| s.kind == kind).unwrap_or(&REGISTRY[0])
}

/// Build the argv (sans executable) for one worker invocation.
///
/// Model resolution: explicit `model` wins, then the registry default.
/// Ollama takes the model as a positional after `run`; everything else
/// uses `--model <name>` when selection is supported.
pub fn build_argv(
    kind: WorkerKind,
    prompt: &str,
    model: Option<&str>,
    autonomous: bool,
) -> Vec<String> {
    let spec = spec(kind);
    let mut argv: Vec<String> = Vec::new();
    if let Some(sub) = spec.subcommand {
        argv.push(sub.to_owned());
    }

    let resolved_model = model.or(spec.default_model);
    if spec.supports_model_selection {
        if let Some(m) = resolved_model {
            match kind {
                WorkerKind::Ollama => argv.push(m.to_owned()),
                _ => {
                    argv.push("--model".to_owned());
                    argv.push(m.to_owned());
                }
            }
        }
    }

    if autonomous {
        argv.extend(spec.autonomous_args.iter().map(|s| (*s).to_owned()));
    }

    // vnc / hands-on / ollama-launch take no prompt text.
    if spec.executes_commands && kind != WorkerKind::OllamaLaunch && !prompt.is_empty() {
        argv.push(prompt.to_owned());
    }

    argv
}

#[cfg(test)]
#[path = "workers_tests.rs"]
mod tests;
