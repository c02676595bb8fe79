// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event, run, and command types shared by both halves of the protocol.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of an appended event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Stdout,
    Stderr,
    Marker,
    Info,
    Error,
    Assist,
    PromptWaiting,
    PromptResolved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Marker => "marker",
            Self::Info => "info",
            Self::Error => "error",
            Self::Assist => "assist",
            Self::PromptWaiting => "prompt_waiting",
            Self::PromptResolved => "prompt_resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stdout" => Some(Self::Stdout),
            "stderr" => Some(Self::Stderr),
            "marker" => Some(Self::Marker),
            "info" => Some(Self::Info),
            "error" => Some(Self::Error),
            "assist" => Some(Self::Assist),
            "prompt_waiting" => Some(Self::PromptWaiting),
            "prompt_resolved" => Some(Self::PromptResolved),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Done,
    Failed,
    Stopped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Stopped)
    }

    /// A run can be resumed by a fresh wrapper only after a clean finish.
    pub fn can_resume(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle markers the wrapper embeds in `marker` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Started,
    Finished { exit_code: i32 },
}

impl Marker {
    /// Parse a marker event payload. Payloads that are not valid marker
    /// JSON are plain informational markers and drive no transition.
    pub fn parse(data: &str) -> Option<Self> {
        let json: Value = serde_json::from_str(data).ok()?;
        match json.get("event").and_then(Value::as_str) {
            Some("started") => Some(Self::Started),
            Some("finished") => {
                let exit_code =
                    json.get("exitCode").and_then(Value::as_i64).unwrap_or(1) as i32;
                Some(Self::Finished { exit_code })
            }
            _ => None,
        }
    }

    /// Wire form for the wrapper to send.
    pub fn to_payload(&self, extra: Option<Value>) -> String {
        let mut json = match self {
            Self::Started => serde_json::json!({ "event": "started" }),
            Self::Finished { exit_code } => {
                serde_json::json!({ "event": "finished", "exitCode": exit_code })
            }
        };
        if let (Some(obj), Some(Value::Object(extra))) = (json.as_object_mut(), extra) {
            for (k, v) in extra {
                obj.entry(k).or_insert(v);
            }
        }
        json.to_string()
    }
}

/// An event as it travels over the wire (ingest response, pagination, WS).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: i64,
    pub run_id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
    pub created_at: i64,
}

/// A pending command as handed to a polling wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub id: String,
    pub run_id: String,
    pub command: String,
    pub created_at: i64,
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
