// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Processed-command set: at-most-once execution even when ack delivery
//! fails, persisted to disk so a resumed wrapper does not re-execute
//! commands acked before a crash.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default expiry for processed entries.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSet {
    /// command id → expiry, epoch millis.
    entries: HashMap<String, i64>,
}

pub struct ProcessedSet {
    entries: HashMap<String, i64>,
    window_ms: i64,
    path: Option<PathBuf>,
}

impl ProcessedSet {
    /// Load from `path` (pruning expired entries); a missing or corrupt
    /// file starts empty.
    pub fn open(path: Option<PathBuf>, window: Duration) -> Self {
        let mut entries = HashMap::new();
        if let Some(ref path) = path {
            if let Ok(raw) = std::fs::read_to_string(path) {
                if let Ok(persisted) = serde_json::from_str::<PersistedSet>(&raw) {
                    entries = persisted.entries;
                }
            }
        }
        let mut set =
            Self { entries, window_ms: window.as_millis() as i64, path };
        set.prune(now_ms());
        set
    }

    pub fn contains(&self, command_id: &str) -> bool {
        let now = now_ms();
        self.entries.get(command_id).is_some_and(|expiry| *expiry > now)
    }

    /// Record a command as handed to its dispatcher. Persisted before the
    /// handler runs, so a crash mid-execution still suppresses a rerun.
    pub fn insert(&mut self, command_id: &str) {
        let now = now_ms();
        self.entries.insert(command_id.to_owned(), now + self.window_ms);
        self.prune(now);
        self.persist();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn prune(&mut self, now: i64) {
        self.entries.retain(|_, expiry| *expiry > now);
    }

    fn persist(&self) {
        let Some(ref path) = self.path else {
            return;
        };
        let persisted = PersistedSet { entries: self.entries.clone() };
        let Ok(raw) = serde_json::to_vec(&persisted) else {
            return;
        };
        let tmp = path.with_extension("tmp");
        if std::fs::write(&tmp, raw).and_then(|()| std::fs::rename(&tmp, path)).is_err() {
            tracing::warn!(path = %path.display(), "failed to persist processed set");
        }
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
#[path = "dedupe_tests.rs"]
mod tests;
