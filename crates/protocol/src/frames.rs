// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket frame types for the gateway's UI-facing hub.
//!
//! Frames are internally tagged (`{"type": "subscribe", ...}`) with
//! snake_case tags and camelCase fields, matching the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::events::EventRecord;

/// Client → hub frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    Subscribe { run_id: String },
    Unsubscribe,
    Ping,
}

/// Hub → client frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    #[serde(rename_all = "camelCase")]
    Connected { server_time: i64 },
    #[serde(rename_all = "camelCase")]
    Subscribed { run_id: String },
    Unsubscribed,
    Pong,
    Error {
        message: String,
    },
    Event {
        event: EventRecord,
    },
    #[serde(rename_all = "camelCase")]
    CommandQueued { run_id: String, command_id: String, command: String },
    #[serde(rename_all = "camelCase")]
    CommandCompleted {
        run_id: String,
        command_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ArtifactUploaded { run_id: String, artifact_id: String, name: String, size: i64 },
    #[serde(rename_all = "camelCase")]
    StopRequested { run_id: String },
    #[serde(rename_all = "camelCase")]
    HaltRequested { run_id: String },
    #[serde(rename_all = "camelCase")]
    InputSent { run_id: String },
    #[serde(rename_all = "camelCase")]
    EscapeSent { run_id: String },
}

#[cfg(test)]
#[path = "frames_tests.rs"]
mod tests;
