// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-host clients: provisioning, token rotation, registration.
//!
//! Plaintext client tokens are issued exactly once; only their SHA-256 is
//! stored. Liveness (`online`/`degraded`/`offline`) is derived from
//! `last_seen_at` at read time, never persisted.

use anyhow::Context;
use drover_protocol::sign;
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

use super::{epoch_ms, Store};

/// `last_seen_at` younger than this is `online`.
pub const ONLINE_WITHIN_MS: i64 = 30_000;
/// Younger than this (but not online) is `degraded`; older is `offline`.
pub const DEGRADED_WITHIN_MS: i64 = 300_000;

#[derive(Debug, Clone)]
pub struct ClientRow {
    pub id: String,
    pub display_name: String,
    pub agent_id: Option<String>,
    pub token_hash: String,
    pub last_seen_at: Option<i64>,
    pub version: Option<String>,
    pub capabilities: Vec<String>,
    pub created_at: i64,
}

impl ClientRow {
    /// Derived liveness status.
    pub fn status(&self, now: i64) -> &'static str {
        match self.last_seen_at {
            Some(seen) if now - seen <= ONLINE_WITHIN_MS => "online",
            Some(seen) if now - seen <= DEGRADED_WITHIN_MS => "degraded",
            _ => "offline",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientRegistration {
    pub agent_id: Option<String>,
    pub version: Option<String>,
    pub capabilities: Option<Vec<String>>,
}

fn row_to_client(row: &Row<'_>) -> rusqlite::Result<ClientRow> {
    let capabilities_raw: String = row.get(6)?;
    let capabilities = serde_json::from_str::<Value>(&capabilities_raw)
        .ok()
        .and_then(|v| {
            v.as_array().map(|arr| {
                arr.iter().filter_map(|x| x.as_str().map(String::from)).collect::<Vec<_>>()
            })
        })
        .unwrap_or_default();
    Ok(ClientRow {
        id: row.get(0)?,
        display_name: row.get(1)?,
        agent_id: row.get(2)?,
        token_hash: row.get(3)?,
        last_seen_at: row.get(4)?,
        version: row.get(5)?,
        capabilities,
        created_at: row.get(7)?,
    })
}

const CLIENT_COLUMNS: &str =
    "id, display_name, agent_id, token_hash, last_seen_at, version, capabilities, created_at";

impl Store {
    /// Provision a client. Returns the row and the plaintext token — the
    /// only time it is ever available. `None` on duplicate display name.
    pub async fn create_client(
        &self,
        display_name: &str,
    ) -> anyhow::Result<Option<(ClientRow, String)>> {
        let id = uuid::Uuid::new_v4().to_string();
        let token = sign::new_token();
        let token_hash = sign::token_sha256_hex(&token);
        let now = epoch_ms();
        let conn = self.lock().await;

        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM clients WHERE display_name = ?1",
                params![display_name],
                |row| row.get(0),
            )
            .optional()
            .context("check client name")?;
        if exists.is_some() {
            return Ok(None);
        }

        conn.execute(
            "INSERT INTO clients (id, display_name, token_hash, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![id, display_name, token_hash, now],
        )
        .context("insert client")?;
        Ok(Some((
            ClientRow {
                id,
                display_name: display_name.to_owned(),
                agent_id: None,
                token_hash,
                last_seen_at: None,
                version: None,
                capabilities: vec![],
                created_at: now,
            },
            token,
        )))
    }

    /// Rotate a client's token, invalidating the old one. Returns the new
    /// plaintext token, or `None` for an unknown client.
    pub async fn rotate_client_token(&self, id: &str) -> anyhow::Result<Option<String>> {
        let token = sign::new_token();
        let token_hash = sign::token_sha256_hex(&token);
        let conn = self.lock().await;
        let updated = conn
            .execute(
                "UPDATE clients SET token_hash = ?2 WHERE id = ?1",
                params![id, token_hash],
            )
            .context("rotate client token")?;
        Ok((updated == 1).then_some(token))
    }

    pub async fn get_client_by_token_hash(
        &self,
        token_hash: &str,
    ) -> anyhow::Result<Option<ClientRow>> {
        let conn = self.lock().await;
        conn.query_row(
            &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE token_hash = ?1"),
            params![token_hash],
            row_to_client,
        )
        .optional()
        .context("get client by token")
    }

    /// Self-registration heartbeat: update identity fields and advance
    /// `last_seen_at`.
    pub async fn register_client(
        &self,
        id: &str,
        registration: ClientRegistration,
    ) -> anyhow::Result<()> {
        let capabilities = registration
            .capabilities
            .map(|caps| Value::from(caps).to_string());
        let conn = self.lock().await;
        conn.execute(
            "UPDATE clients SET \
             agent_id = COALESCE(?2, agent_id), \
             version = COALESCE(?3, version), \
             capabilities = COALESCE(?4, capabilities), \
             last_seen_at = ?5 \
             WHERE id = ?1",
            params![id, registration.agent_id, registration.version, capabilities, epoch_ms()],
        )
        .context("register client")?;
        Ok(())
    }

    pub async fn list_clients(&self) -> anyhow::Result<Vec<ClientRow>> {
        let conn = self.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CLIENT_COLUMNS} FROM clients ORDER BY display_name ASC"
            ))
            .context("prepare list clients")?;
        let rows = stmt
            .query_map([], row_to_client)
            .context("list clients")?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
#[path = "clients_tests.rs"]
mod tests;
