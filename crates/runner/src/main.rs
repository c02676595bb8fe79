// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use drover::client::GatewayClient;
use drover::config::RunnerConfig;
use drover::supervisor::{self, SupervisorSetup};

#[derive(Parser)]
#[command(name = "drover", version, about = "Worker-host runner for the drover control plane.")]
struct Cli {
    #[command(flatten)]
    config: RunnerConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = cli.config;
    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    match run(config).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(config: RunnerConfig) -> anyhow::Result<i32> {
    let worker = config.worker_kind()?;
    let mut client = GatewayClient::new(
        &config.gateway_url,
        &config.hmac_secret,
        config.client_token.clone(),
        config.allow_self_signed,
    )?;

    // Attach to the given run, or claim a pending one via the client token.
    let (run_id, worker, original_command, prompt) = match (
        config.run_id.clone(),
        config.capability_token.clone(),
    ) {
        (Some(run_id), Some(capability)) => {
            client.bind_run(&run_id, &capability);
            (run_id, worker, None, config.prompt.clone())
        }
        _ => {
            let claimed = client
                .claim_run(Some(worker))
                .await
                .map_err(|e| anyhow::anyhow!("claim failed: {e}"))?
                .ok_or_else(|| anyhow::anyhow!("no pending {worker} runs to claim"))?;
            tracing::info!(run_id = %claimed.id, "claimed pending run");
            client.bind_run(&claimed.id, &claimed.capability_token);
            let prompt = config.prompt.clone().or_else(|| claimed.command.clone());
            (claimed.id, claimed.worker_type, claimed.command, prompt)
        }
    };

    let setup = SupervisorSetup {
        run_id,
        working_dir: config.working_dir.clone(),
        worker,
        autonomous: config.autonomous,
        model: config.model.clone(),
        initial_prompt: prompt,
        original_command,
        runs_dir: config.runs_dir.clone(),
        poll_interval: config.poll_interval(),
        heartbeat_interval: config.heartbeat_interval(),
    };
    supervisor::run(setup, client).await
}
