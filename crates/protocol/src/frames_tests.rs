// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::events::EventKind;

#[test]
fn client_frames_parse_wire_shapes() -> anyhow::Result<()> {
    let sub: ClientFrame = serde_json::from_str(r#"{"type":"subscribe","runId":"r1"}"#)?;
    assert!(matches!(sub, ClientFrame::Subscribe { ref run_id } if run_id == "r1"));

    let unsub: ClientFrame = serde_json::from_str(r#"{"type":"unsubscribe"}"#)?;
    assert!(matches!(unsub, ClientFrame::Unsubscribe));

    let ping: ClientFrame = serde_json::from_str(r#"{"type":"ping"}"#)?;
    assert!(matches!(ping, ClientFrame::Ping));
    Ok(())
}

#[test]
fn unknown_client_frame_is_rejected() {
    assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"shutdown"}"#).is_err());
}

#[test]
fn event_frame_carries_wire_event() -> anyhow::Result<()> {
    let frame = ServerFrame::Event {
        event: EventRecord {
            id: 12,
            run_id: "r9".to_owned(),
            kind: EventKind::Stdout,
            data: "hi\n".to_owned(),
            sequence: None,
            created_at: 5,
        },
    };
    let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&frame)?)?;
    assert_eq!(json["type"], "event");
    assert_eq!(json["event"]["runId"], "r9");
    assert_eq!(json["event"]["type"], "stdout");
    Ok(())
}

#[test]
fn fanout_frames_use_snake_case_tags() -> anyhow::Result<()> {
    let frame = ServerFrame::CommandCompleted {
        run_id: "r1".to_owned(),
        command_id: "c1".to_owned(),
        result: Some("ok".to_owned()),
        error: None,
    };
    let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&frame)?)?;
    assert_eq!(json["type"], "command_completed");
    assert_eq!(json["commandId"], "c1");
    assert!(json.get("error").is_none());

    let halt = ServerFrame::HaltRequested { run_id: "r1".to_owned() };
    let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&halt)?)?;
    assert_eq!(json["type"], "halt_requested");
    Ok(())
}
