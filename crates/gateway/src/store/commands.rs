// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command queue: enqueue, capability-scoped polling, idempotent ack.

use anyhow::Context;
use drover_protocol::events::CommandRecord;
use rusqlite::{params, OptionalExtension, Row};

use super::{epoch_ms, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Pending,
    Completed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandRow {
    pub id: String,
    pub run_id: String,
    pub command: String,
    pub status: CommandStatus,
    pub created_at: i64,
    pub acked_at: Option<i64>,
    pub result: Option<String>,
    pub error: Option<String>,
}

/// Outcome of an ack attempt. A repeat ack is reported as success to the
/// caller but carries no row, so the broker fans out only the first one.
#[derive(Debug, Clone)]
pub enum AckOutcome {
    First(CommandRow),
    AlreadyAcked,
    NotFound,
}

fn row_to_command(row: &Row<'_>) -> rusqlite::Result<CommandRow> {
    let status_raw: String = row.get(3)?;
    Ok(CommandRow {
        id: row.get(0)?,
        run_id: row.get(1)?,
        command: row.get(2)?,
        status: if status_raw == "completed" {
            CommandStatus::Completed
        } else {
            CommandStatus::Pending
        },
        created_at: row.get(4)?,
        acked_at: row.get(5)?,
        result: row.get(6)?,
        error: row.get(7)?,
    })
}

const COMMAND_COLUMNS: &str = "id, run_id, command, status, created_at, acked_at, result, error";

impl Store {
    pub async fn enqueue_command(&self, run_id: &str, command: &str) -> anyhow::Result<CommandRow> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = epoch_ms();
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO commands (id, run_id, command, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, run_id, command, CommandStatus::Pending.as_str(), now],
        )
        .context("insert command")?;
        Ok(CommandRow {
            id,
            run_id: run_id.to_owned(),
            command: command.to_owned(),
            status: CommandStatus::Pending,
            created_at: now,
            acked_at: None,
            result: None,
            error: None,
        })
    }

    /// An identical pending command, if one exists (enqueue-time debounce
    /// for stop/halt sentinels).
    pub async fn pending_duplicate(
        &self,
        run_id: &str,
        command: &str,
    ) -> anyhow::Result<Option<CommandRow>> {
        let conn = self.lock().await;
        conn.query_row(
            &format!(
                "SELECT {COMMAND_COLUMNS} FROM commands \
                 WHERE run_id = ?1 AND command = ?2 AND status = ?3 \
                 ORDER BY created_at ASC LIMIT 1"
            ),
            params![run_id, command, CommandStatus::Pending.as_str()],
            row_to_command,
        )
        .optional()
        .context("find pending duplicate")
    }

    /// Pending commands for a run, oldest first, in wire form.
    pub async fn pending_commands(&self, run_id: &str) -> anyhow::Result<Vec<CommandRecord>> {
        let conn = self.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, run_id, command, created_at FROM commands \
                 WHERE run_id = ?1 AND status = ?2 ORDER BY created_at ASC, id ASC",
            )
            .context("prepare pending commands")?;
        let rows = stmt
            .query_map(params![run_id, CommandStatus::Pending.as_str()], |row| {
                Ok(CommandRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    command: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .context("pending commands")?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn get_command(&self, id: &str) -> anyhow::Result<Option<CommandRow>> {
        let conn = self.lock().await;
        conn.query_row(
            &format!("SELECT {COMMAND_COLUMNS} FROM commands WHERE id = ?1"),
            params![id],
            row_to_command,
        )
        .optional()
        .context("get command")
    }

    /// Ack a command. The first ack records result/error; retries are
    /// accepted and ignored.
    pub async fn ack_command(
        &self,
        id: &str,
        result: Option<&str>,
        error: Option<&str>,
    ) -> anyhow::Result<AckOutcome> {
        let conn = self.lock().await;
        let updated = conn
            .execute(
                "UPDATE commands SET status = ?2, acked_at = ?3, result = ?4, error = ?5 \
                 WHERE id = ?1 AND status = ?6",
                params![
                    id,
                    CommandStatus::Completed.as_str(),
                    epoch_ms(),
                    result,
                    error,
                    CommandStatus::Pending.as_str()
                ],
            )
            .context("ack command")?;
        if updated == 1 {
            let row = conn
                .query_row(
                    &format!("SELECT {COMMAND_COLUMNS} FROM commands WHERE id = ?1"),
                    params![id],
                    row_to_command,
                )
                .context("reload acked command")?;
            return Ok(AckOutcome::First(row));
        }

        let exists: Option<String> = conn
            .query_row("SELECT id FROM commands WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .context("check command exists")?;
        Ok(if exists.is_some() { AckOutcome::AlreadyAcked } else { AckOutcome::NotFound })
    }
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
