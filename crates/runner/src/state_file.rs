// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local crash-resume state, written atomically (temp + rename) on every
//! heartbeat and read back when a wrapper resumes a run.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunnerState {
    pub run_id: String,
    pub working_dir: String,
    #[serde(default)]
    pub original_command: Option<String>,
    pub last_sequence: i64,
    pub worker_type: String,
    pub autonomous: bool,
    pub updated_at: i64,
}

pub fn save(path: &Path, state: &RunnerState) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create state dir {}", parent.display()))?;
    }
    let raw = serde_json::to_vec_pretty(state).context("serialize state")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, raw).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))?;
    Ok(())
}

/// Load saved state; `None` when absent. A corrupt file is an error — the
/// caller decides whether to resume blind or start fresh.
pub fn load(path: &Path) -> anyhow::Result<Option<RunnerState>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    let state = serde_json::from_str(&raw).context("parse state.json")?;
    Ok(Some(state))
}

#[cfg(test)]
#[path = "state_file_tests.rs"]
mod tests;
