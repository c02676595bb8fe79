// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run rows, status transitions, and crash-resume state.

use anyhow::Context;
use drover_protocol::events::RunStatus;
use drover_protocol::sign;
use drover_protocol::workers::WorkerKind;
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

use super::{epoch_ms, Store};

#[derive(Debug, Clone)]
pub struct RunRow {
    pub id: String,
    pub status: RunStatus,
    pub command: Option<String>,
    pub capability_token: String,
    pub worker_type: WorkerKind,
    pub metadata: Value,
    pub client_id: Option<String>,
    pub stop_requested: bool,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct NewRun {
    pub command: Option<String>,
    pub working_dir: Option<String>,
    pub autonomous: bool,
    pub worker_type: Option<WorkerKind>,
    pub model: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct RunStateRow {
    pub run_id: String,
    pub working_dir: Option<String>,
    pub original_command: Option<String>,
    pub last_sequence: Option<i64>,
    pub stdin_buffer: Option<String>,
    pub environment: Option<Value>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct RunStatePatch {
    pub working_dir: Option<String>,
    pub original_command: Option<String>,
    pub last_sequence: Option<i64>,
    pub stdin_buffer: Option<String>,
    pub environment: Option<Value>,
}

const RUN_COLUMNS: &str = "id, status, command, capability_token, worker_type, metadata, \
                           client_id, stop_requested, created_at, started_at, finished_at, \
                           exit_code";

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRow> {
    let status_raw: String = row.get(1)?;
    let worker_raw: String = row.get(4)?;
    let metadata_raw: String = row.get(5)?;
    Ok(RunRow {
        id: row.get(0)?,
        status: RunStatus::parse(&status_raw).unwrap_or(RunStatus::Failed),
        command: row.get(2)?,
        capability_token: row.get(3)?,
        worker_type: WorkerKind::parse(&worker_raw).unwrap_or(WorkerKind::Claude),
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(Value::Null),
        client_id: row.get(6)?,
        stop_requested: row.get::<_, i64>(7)? != 0,
        created_at: row.get(8)?,
        started_at: row.get(9)?,
        finished_at: row.get(10)?,
        exit_code: row.get(11)?,
    })
}

impl Store {
    /// Create a run with a fresh id and capability token.
    pub async fn create_run(&self, new: NewRun) -> anyhow::Result<RunRow> {
        let id = sign::new_run_id();
        let capability_token = sign::new_token();
        let worker_type = new.worker_type.unwrap_or(WorkerKind::Claude);
        let now = epoch_ms();

        // Fold creation options into the free-form metadata mapping.
        let mut metadata = match new.metadata {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        if let Some(ref wd) = new.working_dir {
            metadata.insert("workingDir".to_owned(), Value::String(wd.clone()));
        }
        if let Some(ref model) = new.model {
            metadata.insert("model".to_owned(), Value::String(model.clone()));
        }
        metadata.insert("autonomous".to_owned(), Value::Bool(new.autonomous));
        let metadata = Value::Object(metadata);

        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO runs (id, status, command, capability_token, worker_type, metadata, \
             created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                RunStatus::Pending.as_str(),
                new.command,
                capability_token,
                worker_type.as_str(),
                metadata.to_string(),
                now
            ],
        )
        .context("insert run")?;

        Ok(RunRow {
            id,
            status: RunStatus::Pending,
            command: new.command,
            capability_token,
            worker_type,
            metadata,
            client_id: None,
            stop_requested: false,
            created_at: now,
            started_at: None,
            finished_at: None,
            exit_code: None,
        })
    }

    pub async fn get_run(&self, id: &str) -> anyhow::Result<Option<RunRow>> {
        let conn = self.lock().await;
        conn.query_row(
            &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
            params![id],
            row_to_run,
        )
        .optional()
        .context("get run")
    }

    /// Filtered, paginated listing ordered `created_at DESC`.
    pub async fn list_runs(
        &self,
        status: Option<RunStatus>,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<RunRow>, i64)> {
        let status_str = status.map(|s| s.as_str().to_owned());
        let pattern = search.map(|s| format!("%{s}%"));
        let conn = self.lock().await;

        let where_clause = "(?1 IS NULL OR status = ?1) AND (?2 IS NULL OR id LIKE ?2 OR \
                            command LIKE ?2 OR worker_type LIKE ?2)";
        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM runs WHERE {where_clause}"),
                params![status_str, pattern],
                |row| row.get(0),
            )
            .context("count runs")?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RUN_COLUMNS} FROM runs WHERE {where_clause} \
                 ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4"
            ))
            .context("prepare list runs")?;
        let rows = stmt
            .query_map(params![status_str, pattern, limit, offset], row_to_run)
            .context("list runs")?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((rows, total))
    }

    /// Cascade-delete a run. Returns the artifact paths that need unlinking.
    pub async fn delete_run(&self, id: &str) -> anyhow::Result<Option<Vec<String>>> {
        let conn = self.lock().await;
        let mut stmt = conn.prepare("SELECT path FROM artifacts WHERE run_id = ?1")?;
        let paths = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        let deleted = conn.execute("DELETE FROM runs WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Ok(None);
        }
        Ok(Some(paths))
    }

    /// `pending → running` on the started marker. Terminal states are left
    /// untouched; a second started marker is a no-op.
    pub async fn mark_started(&self, id: &str) -> anyhow::Result<()> {
        let conn = self.lock().await;
        conn.execute(
            "UPDATE runs SET status = ?2, started_at = COALESCE(started_at, ?3) \
             WHERE id = ?1 AND status = ?4",
            params![
                id,
                RunStatus::Running.as_str(),
                epoch_ms(),
                RunStatus::Pending.as_str()
            ],
        )
        .context("mark run started")?;
        Ok(())
    }

    /// Finish a run: `done` iff the exit code is zero and no stop or halt
    /// was requested, `stopped` when one was, `failed` otherwise.
    pub async fn mark_finished(&self, id: &str, exit_code: i32) -> anyhow::Result<Option<RunStatus>> {
        let conn = self.lock().await;
        let row: Option<(String, bool)> = conn
            .query_row(
                "SELECT status, stop_requested FROM runs WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? != 0)),
            )
            .optional()
            .context("read run status")?;
        let Some((status_raw, stop_requested)) = row else {
            return Ok(None);
        };
        let current = RunStatus::parse(&status_raw).unwrap_or(RunStatus::Failed);
        if current.is_terminal() {
            return Ok(Some(current));
        }

        let next = if stop_requested {
            RunStatus::Stopped
        } else if exit_code == 0 {
            RunStatus::Done
        } else {
            RunStatus::Failed
        };
        conn.execute(
            "UPDATE runs SET status = ?2, finished_at = ?3, exit_code = ?4 WHERE id = ?1",
            params![id, next.as_str(), epoch_ms(), exit_code],
        )
        .context("mark run finished")?;
        Ok(Some(next))
    }

    /// Record an operator stop/halt request so the finish marker resolves
    /// to `stopped` instead of `done`/`failed`.
    pub async fn set_stop_requested(&self, id: &str) -> anyhow::Result<()> {
        let conn = self.lock().await;
        conn.execute("UPDATE runs SET stop_requested = 1 WHERE id = ?1", params![id])
            .context("set stop_requested")?;
        Ok(())
    }

    /// Create a new run inheriting from `origin`, linking back via
    /// `metadata.restartedFrom`.
    pub async fn restart_run(
        &self,
        origin: &RunRow,
        command_override: Option<String>,
        working_dir_override: Option<String>,
    ) -> anyhow::Result<RunRow> {
        let mut metadata = match origin.metadata.clone() {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        metadata.insert("restartedFrom".to_owned(), Value::String(origin.id.clone()));
        if let Some(wd) = working_dir_override {
            metadata.insert("workingDir".to_owned(), Value::String(wd));
        }
        let autonomous =
            metadata.get("autonomous").and_then(Value::as_bool).unwrap_or(false);

        self.create_run(NewRun {
            command: command_override.or_else(|| origin.command.clone()),
            working_dir: None,
            autonomous,
            worker_type: Some(origin.worker_type),
            model: None,
            metadata: Some(Value::Object(metadata)),
        })
        .await
    }

    /// Atomically claim the oldest unassigned pending run for a client.
    pub async fn claim_pending_run(
        &self,
        client_id: &str,
        worker_type: Option<WorkerKind>,
    ) -> anyhow::Result<Option<RunRow>> {
        let worker_str = worker_type.map(|w| w.as_str().to_owned());
        let conn = self.lock().await;
        let run = conn
            .query_row(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM runs WHERE status = ?1 AND client_id IS NULL \
                     AND (?2 IS NULL OR worker_type = ?2) ORDER BY created_at ASC LIMIT 1"
                ),
                params![RunStatus::Pending.as_str(), worker_str],
                row_to_run,
            )
            .optional()
            .context("select claimable run")?;
        let Some(mut run) = run else {
            return Ok(None);
        };
        conn.execute(
            "UPDATE runs SET client_id = ?2 WHERE id = ?1 AND client_id IS NULL",
            params![run.id, client_id],
        )
        .context("claim run")?;
        run.client_id = Some(client_id.to_owned());
        Ok(Some(run))
    }

    /// COALESCE upsert: omitted fields preserve their prior value.
    pub async fn upsert_run_state(
        &self,
        run_id: &str,
        patch: RunStatePatch,
    ) -> anyhow::Result<()> {
        let environment = patch.environment.map(|v| v.to_string());
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO run_state (run_id, working_dir, original_command, last_sequence, \
             stdin_buffer, environment, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(run_id) DO UPDATE SET \
             working_dir = COALESCE(excluded.working_dir, run_state.working_dir), \
             original_command = COALESCE(excluded.original_command, run_state.original_command), \
             last_sequence = COALESCE(excluded.last_sequence, run_state.last_sequence), \
             stdin_buffer = COALESCE(excluded.stdin_buffer, run_state.stdin_buffer), \
             environment = COALESCE(excluded.environment, run_state.environment), \
             updated_at = excluded.updated_at",
            params![
                run_id,
                patch.working_dir,
                patch.original_command,
                patch.last_sequence,
                patch.stdin_buffer,
                environment,
                epoch_ms()
            ],
        )
        .context("upsert run state")?;
        Ok(())
    }

    pub async fn get_run_state(&self, run_id: &str) -> anyhow::Result<Option<RunStateRow>> {
        let conn = self.lock().await;
        conn.query_row(
            "SELECT run_id, working_dir, original_command, last_sequence, stdin_buffer, \
             environment, updated_at FROM run_state WHERE run_id = ?1",
            params![run_id],
            |row| {
                let environment_raw: Option<String> = row.get(5)?;
                Ok(RunStateRow {
                    run_id: row.get(0)?,
                    working_dir: row.get(1)?,
                    original_command: row.get(2)?,
                    last_sequence: row.get(3)?,
                    stdin_buffer: row.get(4)?,
                    environment: environment_raw.and_then(|s| serde_json::from_str(&s).ok()),
                    updated_at: row.get(6)?,
                })
            },
        )
        .optional()
        .context("get run state")
    }
}

#[cfg(test)]
#[path = "runs_tests.rs"]
mod tests;
