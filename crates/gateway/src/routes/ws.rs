// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UI WebSocket endpoint feeding the hub.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use drover_protocol::frames::{ClientFrame, ServerFrame};

use crate::auth::{bearer_token, require_ui_token};
use crate::state::Gateway;
use crate::store::epoch_ms;
use crate::store::sessions::Role;

#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    /// Session token for browsers, which cannot set headers on upgrades.
    pub token: Option<String>,
}

/// `GET /ws` — upgrade to the hub protocol.
pub async fn ws_handler(
    State(gw): State<Arc<Gateway>>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = query.token.as_deref().or_else(|| bearer_token(&headers)).map(str::to_owned);
    let authed = match token {
        Some(ref token) => require_ui_token(&gw, token, Role::Viewer).await.is_ok(),
        None => false,
    };
    if !authed {
        return axum::http::Response::builder()
            .status(401)
            .body(axum::body::Body::from("unauthorized"))
            .unwrap_or_default()
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_connection(gw, socket)).into_response()
}

/// Per-connection loop: a writer task drains the hub channel onto the
/// socket (serializing frames per socket); the reader handles the small
/// client protocol and low-level pongs.
async fn handle_connection(gw: Arc<Gateway>, socket: WebSocket) {
    let (client_id, mut outbound_rx) = gw.hub.register();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    gw.hub.send_to(client_id, &ServerFrame::Connected { server_time: epoch_ms() });
    tracing::debug!(client_id, "ws client connected");

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_frame(&gw, client_id, text.as_str()).await,
            Ok(Message::Pong(_)) => gw.hub.mark_alive(client_id),
            Ok(Message::Ping(payload)) => {
                // axum answers pings itself; still counts as liveness.
                let _ = payload;
                gw.hub.mark_alive(client_id);
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(Message::Binary(_)) => {
                gw.hub.send_to(client_id, &ServerFrame::Error {
                    message: "binary frames are not supported".to_owned(),
                });
            }
        }
    }

    gw.hub.deregister(client_id);
    writer.abort();
    tracing::debug!(client_id, "ws client disconnected");
}

async fn handle_frame(gw: &Gateway, client_id: u64, text: &str) {
    gw.hub.mark_alive(client_id);
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            gw.hub.send_to(client_id, &ServerFrame::Error {
                message: format!("invalid frame: {e}"),
            });
            return;
        }
    };

    match frame {
        ClientFrame::Subscribe { run_id } => {
            let known = matches!(gw.store.get_run(&run_id).await, Ok(Some(_)));
            if !known {
                gw.hub.send_to(client_id, &ServerFrame::Error {
                    message: "run not found".to_owned(),
                });
                return;
            }
            gw.hub.subscribe(client_id, &run_id);
            gw.hub.send_to(client_id, &ServerFrame::Subscribed { run_id });
        }
        ClientFrame::Unsubscribe => {
            gw.hub.unsubscribe(client_id);
            gw.hub.send_to(client_id, &ServerFrame::Unsubscribed);
        }
        ClientFrame::Ping => {
            gw.hub.send_to(client_id, &ServerFrame::Pong);
        }
    }
}

/// Keep-alive sweeper: every interval, close sockets that missed the last
/// ping and ping the rest. Owned by the server lifetime, stopped by the
/// shutdown token.
pub fn spawn_ping_loop(gw: Arc<Gateway>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(gw.config.ws_ping_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = gw.shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let closed = gw.hub.sweep();
                    if closed > 0 {
                        tracing::debug!(closed, "closed unresponsive ws clients");
                    }
                }
            }
        }
    });
}
