// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only event log with server-assigned monotonic ids.

use anyhow::Context;
use drover_protocol::events::{EventKind, EventRecord};
use rusqlite::{params, Row};

use super::{epoch_ms, Store};

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    let kind_raw: String = row.get(2)?;
    Ok(EventRecord {
        id: row.get(0)?,
        run_id: row.get(1)?,
        kind: EventKind::parse(&kind_raw).unwrap_or(EventKind::Info),
        data: row.get(3)?,
        sequence: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl Store {
    /// Insert an event and return it with its server-assigned id.
    ///
    /// The insert and `last_insert_rowid` read happen under the connection
    /// lock, so ids are handed out in insertion order and a reader paging
    /// `WHERE id > after` sees a gap-free suffix.
    pub async fn append_event(
        &self,
        run_id: &str,
        kind: EventKind,
        data: &str,
        sequence: Option<i64>,
    ) -> anyhow::Result<EventRecord> {
        let now = epoch_ms();
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO events (run_id, kind, data, sequence, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, kind.as_str(), data, sequence, now],
        )
        .context("insert event")?;
        let id = conn.last_insert_rowid();
        Ok(EventRecord {
            id,
            run_id: run_id.to_owned(),
            kind,
            data: data.to_owned(),
            sequence,
            created_at: now,
        })
    }

    /// Events with `id > after`, ascending, up to `limit`.
    pub async fn list_events(
        &self,
        run_id: &str,
        after: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<EventRecord>> {
        let conn = self.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, run_id, kind, data, sequence, created_at FROM events \
                 WHERE run_id = ?1 AND id > ?2 ORDER BY id ASC LIMIT ?3",
            )
            .context("prepare list events")?;
        let rows = stmt
            .query_map(params![run_id, after, limit], row_to_event)
            .context("list events")?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The most recent `limit` events, returned in ascending id order.
    pub async fn recent_events(&self, run_id: &str, limit: i64) -> anyhow::Result<Vec<EventRecord>> {
        let conn = self.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, run_id, kind, data, sequence, created_at FROM ( \
                 SELECT * FROM events WHERE run_id = ?1 ORDER BY id DESC LIMIT ?2) \
                 ORDER BY id ASC",
            )
            .context("prepare recent events")?;
        let rows = stmt
            .query_map(params![run_id, limit], row_to_event)
            .context("recent events")?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
