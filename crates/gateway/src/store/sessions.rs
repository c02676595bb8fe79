// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UI sessions, HMAC nonces, and the append-only audit trail.

use anyhow::Context;
use drover_protocol::sign;
use rusqlite::{params, OptionalExtension};

use super::{epoch_ms, Store};

/// Role attached to a UI session. Admin subsumes operator; operator
/// subsumes viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Operator,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Operator => "operator",
            Self::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "operator" => Some(Self::Operator),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }

    /// Whether this role satisfies the `required` gate.
    pub fn allows(&self, required: Role) -> bool {
        let rank = |r: Role| match r {
            Role::Admin => 3,
            Role::Operator => 2,
            Role::Viewer => 1,
        };
        rank(*self) >= rank(required)
    }
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub user_id: String,
    pub role: Role,
    pub expires_at: i64,
    pub created_at: i64,
}

/// An audit entry in the making. `user_id` is absent for wrapper-origin
/// records (e.g. replay rejections).
#[derive(Debug, Clone, Default)]
pub struct AuditEntry<'a> {
    pub user_id: Option<&'a str>,
    pub action: &'a str,
    pub object_type: &'a str,
    pub object_id: Option<&'a str>,
    pub detail: Option<&'a str>,
    pub remote_addr: Option<&'a str>,
}

impl Store {
    /// Issue a session. The returned token is the session id itself; it is
    /// never derivable again, so callers print it exactly once.
    pub async fn create_session(
        &self,
        user_id: &str,
        role: Role,
        ttl_ms: i64,
    ) -> anyhow::Result<SessionRow> {
        let id = sign::new_token();
        let now = epoch_ms();
        let expires_at = now + ttl_ms;
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO sessions (id, user_id, role, expires_at, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, user_id, role.as_str(), expires_at, now],
        )
        .context("insert session")?;
        Ok(SessionRow { id, user_id: user_id.to_owned(), role, expires_at, created_at: now })
    }

    /// Look up an unexpired session by bearer token.
    pub async fn get_session(&self, id: &str) -> anyhow::Result<Option<SessionRow>> {
        let now = epoch_ms();
        let conn = self.lock().await;
        conn.query_row(
            "SELECT id, user_id, role, expires_at, created_at FROM sessions \
             WHERE id = ?1 AND expires_at > ?2",
            params![id, now],
            |row| {
                let role_raw: String = row.get(2)?;
                Ok(SessionRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    role: Role::parse(&role_raw).unwrap_or(Role::Viewer),
                    expires_at: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()
        .context("get session")
    }

    /// Record a nonce. `false` means it was already present (replay); old
    /// nonces past twice the skew window are evicted on the same lock hold.
    pub async fn insert_nonce(&self, value: &str) -> anyhow::Result<bool> {
        let now = epoch_ms();
        let horizon = now - 2 * sign::SKEW_WINDOW_SECS * 1_000;
        let conn = self.lock().await;
        conn.execute("DELETE FROM nonces WHERE seen_at < ?1", params![horizon])
            .context("evict nonces")?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO nonces (value, seen_at) VALUES (?1, ?2)",
                params![value, now],
            )
            .context("insert nonce")?;
        Ok(inserted == 1)
    }

    /// Append to the audit trail. Failures are logged, never propagated:
    /// auditing must not break the request that triggered it.
    pub async fn audit(&self, entry: AuditEntry<'_>) {
        let conn = self.lock().await;
        let result = conn.execute(
            "INSERT INTO audit (user_id, action, object_type, object_id, detail, remote_addr, \
             created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.user_id,
                entry.action,
                entry.object_type,
                entry.object_id,
                entry.detail,
                entry.remote_addr,
                epoch_ms()
            ],
        );
        if let Err(e) = result {
            tracing::warn!(action = entry.action, err = %e, "audit insert failed");
        }
    }

    /// Count audit rows for an action (test and ops visibility).
    pub async fn count_audit(&self, action: &str) -> anyhow::Result<i64> {
        let conn = self.lock().await;
        conn.query_row(
            "SELECT COUNT(*) FROM audit WHERE action = ?1",
            params![action],
            |row| row.get(0),
        )
        .context("count audit")
    }
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
