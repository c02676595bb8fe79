// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema migrations, gated on `PRAGMA user_version` and run once at
//! startup inside a single exclusive transaction.

use anyhow::Context;
use rusqlite::Connection;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id               TEXT PRIMARY KEY,
    status           TEXT NOT NULL,
    command          TEXT,
    capability_token TEXT NOT NULL,
    worker_type      TEXT NOT NULL,
    metadata         TEXT NOT NULL DEFAULT '{}',
    client_id        TEXT,
    stop_requested   INTEGER NOT NULL DEFAULT 0,
    created_at       INTEGER NOT NULL,
    started_at       INTEGER,
    finished_at      INTEGER,
    exit_code        INTEGER
);

CREATE TABLE IF NOT EXISTS events (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id     TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    kind       TEXT NOT NULL,
    data       TEXT NOT NULL,
    sequence   INTEGER,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_run ON events(run_id, id);

CREATE TABLE IF NOT EXISTS commands (
    id         TEXT PRIMARY KEY,
    run_id     TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    command    TEXT NOT NULL,
    status     TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    acked_at   INTEGER,
    result     TEXT,
    error      TEXT
);
CREATE INDEX IF NOT EXISTS idx_commands_run_status ON commands(run_id, status, created_at);

CREATE TABLE IF NOT EXISTS artifacts (
    id         TEXT PRIMARY KEY,
    run_id     TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    kind       TEXT NOT NULL,
    size       INTEGER NOT NULL,
    path       TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_artifacts_run ON artifacts(run_id);

CREATE TABLE IF NOT EXISTS clients (
    id           TEXT PRIMARY KEY,
    display_name TEXT NOT NULL UNIQUE,
    agent_id     TEXT,
    token_hash   TEXT NOT NULL,
    last_seen_at INTEGER,
    version      TEXT,
    capabilities TEXT NOT NULL DEFAULT '[]',
    created_at   INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_clients_token_hash ON clients(token_hash);

CREATE TABLE IF NOT EXISTS run_state (
    run_id           TEXT PRIMARY KEY REFERENCES runs(id) ON DELETE CASCADE,
    working_dir      TEXT,
    original_command TEXT,
    last_sequence    INTEGER,
    stdin_buffer     TEXT,
    environment      TEXT,
    updated_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL,
    role       TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_expiry ON sessions(expires_at);

CREATE TABLE IF NOT EXISTS nonces (
    value   TEXT PRIMARY KEY,
    seen_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_nonces_seen ON nonces(seen_at);

CREATE TABLE IF NOT EXISTS audit (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     TEXT,
    action      TEXT NOT NULL,
    object_type TEXT NOT NULL,
    object_id   TEXT,
    detail      TEXT,
    remote_addr TEXT,
    created_at  INTEGER NOT NULL
);
"#;

pub fn run(conn: &mut Connection) -> anyhow::Result<()> {
    let version: i64 =
        conn.query_row("PRAGMA user_version", [], |row| row.get(0)).context("read user_version")?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction().context("begin migration")?;
    if version < 1 {
        tx.execute_batch(SCHEMA_V1).context("apply schema v1")?;
    }
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit().context("commit migration")?;
    tracing::info!(from = version, to = SCHEMA_VERSION, "database migrated");
    Ok(())
}
