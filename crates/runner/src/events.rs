// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed event stream from the supervisor to the gateway forwarder.
//!
//! Everything the wrapper reports — output chunks, prompts, markers —
//! flows through one channel in emission order; the forwarder attaches
//! the producer-side sequence counter and ships each event upstream.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use drover_protocol::events::EventKind;

use crate::client::{GatewayClient, GatewayError};

/// One event emitted by the supervisor or an output pump.
#[derive(Debug, Clone)]
pub struct RunnerEvent {
    pub kind: EventKind,
    pub data: String,
}

impl RunnerEvent {
    pub fn output(kind: EventKind, data: impl Into<String>) -> Self {
        Self { kind, data: data.into() }
    }

    pub fn info(data: impl Into<String>) -> Self {
        Self { kind: EventKind::Info, data: data.into() }
    }

    pub fn error(data: impl Into<String>) -> Self {
        Self { kind: EventKind::Error, data: data.into() }
    }

    pub fn marker(payload: impl Into<String>) -> Self {
        Self { kind: EventKind::Marker, data: payload.into() }
    }
}

/// Consecutive transient append failures tolerated before the run is
/// retired.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Forward events to the gateway in order, attaching sequence numbers.
///
/// A fatal gateway response (401/403/404/429) cancels the token so the
/// supervisor exits promptly; repeated transient failures do the same
/// after [`MAX_CONSECUTIVE_FAILURES`] events in a row are lost.
pub fn spawn_forwarder(
    client: Arc<GatewayClient>,
    mut rx: mpsc::Receiver<RunnerEvent>,
    sequence: Arc<AtomicI64>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut consecutive_failures = 0u32;
        while let Some(event) = rx.recv().await {
            let seq = sequence.fetch_add(1, Ordering::SeqCst) + 1;
            match client.append_event(event.kind, &event.data, seq).await {
                Ok(_) => consecutive_failures = 0,
                Err(e @ GatewayError::Fatal { .. }) => {
                    tracing::error!(err = %e, "gateway retired this run; shutting down");
                    cancel.cancel();
                    break;
                }
                Err(GatewayError::Transient(e)) => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        err = %e,
                        consecutive_failures,
                        kind = %event.kind,
                        "event append failed"
                    );
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        tracing::error!("gateway unreachable; shutting down");
                        cancel.cancel();
                        break;
                    }
                }
            }
        }
    })
}
