// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use anyhow::Context;
use rusqlite::{params, OptionalExtension, Row};

use super::{epoch_ms, Store};

#[derive(Debug, Clone)]
pub struct ArtifactRow {
    pub id: String,
    pub run_id: String,
    pub name: String,
    pub kind: String,
    pub size: i64,
    pub path: String,
    pub created_at: i64,
}

fn row_to_artifact(row: &Row<'_>) -> rusqlite::Result<ArtifactRow> {
    Ok(ArtifactRow {
        id: row.get(0)?,
        run_id: row.get(1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
        size: row.get(4)?,
        path: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const ARTIFACT_COLUMNS: &str = "id, run_id, name, kind, size, path, created_at";

impl Store {
    pub async fn insert_artifact(
        &self,
        id: &str,
        run_id: &str,
        name: &str,
        kind: &str,
        size: i64,
        path: &str,
    ) -> anyhow::Result<ArtifactRow> {
        let now = epoch_ms();
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO artifacts (id, run_id, name, kind, size, path, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, run_id, name, kind, size, path, now],
        )
        .context("insert artifact")?;
        Ok(ArtifactRow {
            id: id.to_owned(),
            run_id: run_id.to_owned(),
            name: name.to_owned(),
            kind: kind.to_owned(),
            size,
            path: path.to_owned(),
            created_at: now,
        })
    }

    pub async fn get_artifact(&self, id: &str) -> anyhow::Result<Option<ArtifactRow>> {
        let conn = self.lock().await;
        conn.query_row(
            &format!("SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE id = ?1"),
            params![id],
            row_to_artifact,
        )
        .optional()
        .context("get artifact")
    }

    pub async fn list_artifacts(&self, run_id: &str) -> anyhow::Result<Vec<ArtifactRow>> {
        let conn = self.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE run_id = ?1 \
                 ORDER BY created_at ASC, id ASC"
            ))
            .context("prepare list artifacts")?;
        let rows = stmt
            .query_map(params![run_id], row_to_artifact)
            .context("list artifacts")?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Remove the row; the caller unlinks the file first.
    pub async fn delete_artifact(&self, id: &str) -> anyhow::Result<Option<ArtifactRow>> {
        let conn = self.lock().await;
        let row = conn
            .query_row(
                &format!("SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE id = ?1"),
                params![id],
                row_to_artifact,
            )
            .optional()
            .context("get artifact for delete")?;
        if row.is_some() {
            conn.execute("DELETE FROM artifacts WHERE id = ?1", params![id])
                .context("delete artifact")?;
        }
        Ok(row)
    }
}
