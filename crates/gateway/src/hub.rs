// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket hub: live sockets, per-run subscription sets, keep-alive.
//!
//! All mutable maps sit behind one mutex whose critical sections are
//! lookups and inserts only — frames are serialized outside the lock and
//! delivery goes through each socket's unbounded channel, so no I/O ever
//! happens under the lock. A dedicated writer task per socket serializes
//! frames onto the wire.

use std::collections::{HashMap, HashSet};

use axum::extract::ws::Message;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use drover_protocol::frames::ServerFrame;

pub struct Hub {
    inner: Mutex<HubInner>,
}

struct HubInner {
    next_id: u64,
    clients: HashMap<u64, ClientHandle>,
    run_subscriptions: HashMap<String, HashSet<u64>>,
}

struct ClientHandle {
    tx: mpsc::UnboundedSender<Message>,
    alive: bool,
    run_id: Option<String>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner {
                next_id: 0,
                clients: HashMap::new(),
                run_subscriptions: HashMap::new(),
            }),
        }
    }

    /// Add a socket; the receiver end feeds its writer task.
    pub fn register(&self) -> (u64, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.clients.insert(id, ClientHandle { tx, alive: true, run_id: None });
        (id, rx)
    }

    /// Remove a socket and its subscription.
    pub fn deregister(&self, id: u64) {
        let mut inner = self.inner.lock();
        remove_client(&mut inner, id);
    }

    /// Point a socket's subscription at `run_id` (replacing any previous).
    pub fn subscribe(&self, id: u64, run_id: &str) {
        let mut inner = self.inner.lock();
        detach_subscription(&mut inner, id);
        if let Some(client) = inner.clients.get_mut(&id) {
            client.run_id = Some(run_id.to_owned());
        } else {
            return;
        }
        inner.run_subscriptions.entry(run_id.to_owned()).or_default().insert(id);
    }

    pub fn unsubscribe(&self, id: u64) {
        let mut inner = self.inner.lock();
        detach_subscription(&mut inner, id);
    }

    /// Record a pong (or any inbound traffic) as liveness.
    pub fn mark_alive(&self, id: u64) {
        let mut inner = self.inner.lock();
        if let Some(client) = inner.clients.get_mut(&id) {
            client.alive = true;
        }
    }

    /// Send one frame to one socket.
    pub fn send_to(&self, id: u64, frame: &ServerFrame) {
        let Ok(text) = serde_json::to_string(frame) else {
            return;
        };
        let inner = self.inner.lock();
        if let Some(client) = inner.clients.get(&id) {
            let _ = client.tx.send(Message::Text(text.into()));
        }
    }

    /// Fan a frame out to every socket subscribed to `run_id`, in the
    /// order events were committed (the caller broadcasts immediately
    /// after its store transaction returns).
    pub fn broadcast(&self, run_id: &str, frame: &ServerFrame) {
        let Ok(text) = serde_json::to_string(frame) else {
            return;
        };
        let inner = self.inner.lock();
        let Some(subscribers) = inner.run_subscriptions.get(run_id) else {
            return;
        };
        for id in subscribers {
            if let Some(client) = inner.clients.get(id) {
                let _ = client.tx.send(Message::Text(text.clone().into()));
            }
        }
    }

    /// Keep-alive pass: close sockets that missed the previous ping, then
    /// ping the rest. Returns how many were closed.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.lock();
        let dead: Vec<u64> = inner
            .clients
            .iter()
            .filter(|(_, c)| !c.alive)
            .map(|(id, _)| *id)
            .collect();
        for id in &dead {
            remove_client(&mut inner, *id);
        }
        for client in inner.clients.values_mut() {
            client.alive = false;
            let _ = client.tx.send(Message::Ping(Vec::new().into()));
        }
        dead.len()
    }

    pub fn client_count(&self) -> usize {
        self.inner.lock().clients.len()
    }

    #[cfg(test)]
    pub fn subscriber_count(&self, run_id: &str) -> usize {
        self.inner.lock().run_subscriptions.get(run_id).map_or(0, HashSet::len)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

fn detach_subscription(inner: &mut HubInner, id: u64) {
    let Some(client) = inner.clients.get_mut(&id) else {
        return;
    };
    let Some(run_id) = client.run_id.take() else {
        return;
    };
    if let Some(set) = inner.run_subscriptions.get_mut(&run_id) {
        set.remove(&id);
        if set.is_empty() {
            inner.run_subscriptions.remove(&run_id);
        }
    }
}

fn remove_client(inner: &mut HubInner, id: u64) {
    detach_subscription(inner, id);
    // Dropping the sender ends the writer task, which closes the socket.
    inner.clients.remove(&id);
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
