// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedded relational store.
//!
//! One `rusqlite::Connection` in WAL mode behind an async mutex: every
//! mutation runs under the lock, so "allocate id, insert, return rowid" is
//! atomic with respect to concurrent inserters and readers always observe a
//! gap-free event-id suffix. Read queries share the same guard; all access
//! is prepared statements, no ORM.

pub mod artifacts;
pub mod clients;
pub mod commands;
pub mod events;
mod migrate;
pub mod runs;
pub mod sessions;

use std::path::Path;

use anyhow::Context;
use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create data dir {}", parent.display()))?;
        }
        let mut conn = Connection::open(path)
            .with_context(|| format!("open database {}", path.display()))?;
        configure(&conn)?;
        migrate::run(&mut conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let mut conn = Connection::open_in_memory().context("open in-memory database")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate::run(&mut conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

fn configure(conn: &Connection) -> anyhow::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5_000)?;
    Ok(())
}

/// Current epoch millis, the timestamp unit used across the schema.
pub fn epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
