// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact download and deletion (UI auth).

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;

use crate::artifacts::content_type;
use crate::auth::require_ui;
use crate::error::{internal, ApiError, ApiResult};
use crate::state::Gateway;
use crate::store::sessions::{AuditEntry, Role};

/// `GET /api/artifacts/{id}` — stream the file as an attachment.
pub async fn download(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_ui(&gw, &headers, Role::Viewer).await?;
    let Some(artifact) = gw.store.get_artifact(&id).await.map_err(internal)? else {
        return Err(ApiError::NotFound.to_http_response("artifact not found"));
    };

    let file = tokio::fs::File::open(&artifact.path)
        .await
        .map_err(|e| internal(anyhow::anyhow!("open artifact {}: {e}", artifact.path)))?;
    let stream = tokio_util::io::ReaderStream::new(file);

    let disposition = format!("attachment; filename=\"{}\"", artifact.name);
    Ok((
        [
            (header::CONTENT_TYPE, content_type(&artifact.name).to_owned()),
            (header::CONTENT_LENGTH, artifact.size.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    ))
}

/// `DELETE /api/artifacts/{id}` — remove file then row; a missing file is
/// not an error.
pub async fn delete_artifact(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = require_ui(&gw, &headers, Role::Viewer).await?;
    let Some(artifact) = gw.store.get_artifact(&id).await.map_err(internal)? else {
        return Err(ApiError::NotFound.to_http_response("artifact not found"));
    };
    // File first, then row; a missing file is not an error.
    if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
        tracing::debug!(path = %artifact.path, err = %e, "artifact file already gone");
    }
    gw.store.delete_artifact(&id).await.map_err(internal)?;
    gw.store
        .audit(AuditEntry {
            user_id: Some(&session.user_id),
            action: "artifact.delete",
            object_type: "artifact",
            object_id: Some(&id),
            ..AuditEntry::default()
        })
        .await;
    Ok(StatusCode::NO_CONTENT)
}
