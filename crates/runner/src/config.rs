// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use drover_protocol::workers::WorkerKind;

/// Configuration for the drover runner.
#[derive(Debug, Clone, clap::Args)]
pub struct RunnerConfig {
    /// Gateway base URL, e.g. `https://gateway.example:7700`.
    #[arg(long, env = "GATEWAY_URL")]
    pub gateway_url: String,

    /// Shared secret for request signatures.
    #[arg(long, env = "HMAC_SECRET", hide_env_values = true)]
    pub hmac_secret: String,

    /// Client token for self-registration and run claiming.
    #[arg(long, env = "DROVER_CLIENT_TOKEN", hide_env_values = true)]
    pub client_token: Option<String>,

    /// Run to attach to. When omitted, a pending run is claimed via the
    /// client token.
    #[arg(long, env = "DROVER_RUN_ID")]
    pub run_id: Option<String>,

    /// Capability token for the run (issued at creation).
    #[arg(long, env = "DROVER_CAPABILITY_TOKEN", hide_env_values = true)]
    pub capability_token: Option<String>,

    /// Working directory; also the sandbox root for injected commands.
    #[arg(long, default_value = ".", env = "DROVER_WORKING_DIR")]
    pub working_dir: PathBuf,

    /// Worker kind to drive.
    #[arg(long, default_value = "claude", env = "DROVER_WORKER")]
    pub worker: String,

    /// Model override passed to the worker CLI.
    #[arg(long, env = "DROVER_MODEL")]
    pub model: Option<String>,

    /// Autonomous mode: auto-answer trust and confirm prompts.
    #[arg(long, env = "DROVER_AUTONOMOUS")]
    pub autonomous: bool,

    /// Initial prompt. When omitted, the runner starts in listener mode
    /// and waits for `__INPUT__` commands.
    #[arg(long, env = "DROVER_PROMPT")]
    pub prompt: Option<String>,

    /// Local state directory (`<dir>/<run_id>/{state.json, runner.log}`).
    #[arg(long, default_value = "runs", env = "DROVER_RUNS_DIR")]
    pub runs_dir: PathBuf,

    /// Command poll interval in milliseconds.
    #[arg(long, default_value_t = 1_000, env = "DROVER_POLL_MS")]
    pub poll_ms: u64,

    /// Heartbeat interval in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "DROVER_HEARTBEAT_MS")]
    pub heartbeat_ms: u64,

    /// Accept self-signed gateway certificates.
    #[arg(long, env = "ALLOW_SELF_SIGNED_CERTS")]
    pub allow_self_signed: bool,
}

impl RunnerConfig {
    pub fn worker_kind(&self) -> anyhow::Result<WorkerKind> {
        WorkerKind::parse(&self.worker)
            .ok_or_else(|| anyhow::anyhow!("unknown worker type: {}", self.worker))
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_ms)
    }

    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.worker_kind()?;
        if self.hmac_secret.len() < 16 {
            anyhow::bail!("HMAC_SECRET must be at least 16 characters");
        }
        if self.run_id.is_some() != self.capability_token.is_some() {
            anyhow::bail!("--run-id and --capability-token must be provided together");
        }
        if self.run_id.is_none() && self.client_token.is_none() {
            anyhow::bail!("either --run-id/--capability-token or --client-token is required");
        }
        Ok(())
    }
}
