// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

/// Configuration for the drover gateway.
#[derive(Debug, Clone, clap::Args)]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "DROVER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 7700, env = "DROVER_PORT")]
    pub port: u16,

    /// Shared secret for wrapper HMAC signatures.
    #[arg(long, env = "HMAC_SECRET", hide_env_values = true)]
    pub hmac_secret: String,

    /// Data directory for the database, artifacts, and run files.
    #[arg(long, default_value = "drover-data", env = "DROVER_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Database file path. Defaults to `<data_dir>/db.sqlite`.
    #[arg(long, env = "DATABASE_PATH")]
    pub database_path: Option<PathBuf>,

    /// Artifact storage directory. Defaults to `<data_dir>/artifacts`.
    #[arg(long, env = "ARTIFACTS_DIR")]
    pub artifacts_dir: Option<PathBuf>,

    /// Maximum accepted artifact upload size in bytes.
    #[arg(long, default_value_t = 100 * 1024 * 1024, env = "MAX_ARTIFACT_SIZE")]
    pub max_artifact_size: u64,

    /// Extra allowlisted command prefixes, comma-separated.
    #[arg(long, env = "EXTRA_ALLOWED_COMMANDS")]
    pub extra_allowed_commands: Option<String>,

    /// Extra redaction patterns, newline-separated.
    #[arg(long, env = "REDACT_PATTERNS")]
    pub redact_patterns: Option<String>,

    /// WebSocket keep-alive ping interval in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "DROVER_WS_PING_MS")]
    pub ws_ping_ms: u64,
}

impl GatewayConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| self.data_dir.join("db.sqlite"))
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.artifacts_dir.clone().unwrap_or_else(|| self.data_dir.join("artifacts"))
    }

    pub fn ws_ping_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ws_ping_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.hmac_secret.len() < 16 {
            anyhow::bail!("HMAC_SECRET must be at least 16 characters");
        }
        if self.max_artifact_size == 0 {
            anyhow::bail!("MAX_ARTIFACT_SIZE must be positive");
        }
        Ok(())
    }
}
