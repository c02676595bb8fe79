// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Droverhub: the gateway half of the drover control plane — run broker,
//! event fan-out, artifact store, and the auth surfaces in front of them.

pub mod allowlist;
pub mod artifacts;
pub mod auth;
pub mod config;
pub mod error;
pub mod hub;
pub mod routes;
pub mod state;
pub mod store;
pub mod test_support;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::routes::build_router;
use crate::state::Gateway;
use crate::store::Store;

/// Run the gateway until shutdown.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    config.validate()?;
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    std::fs::create_dir_all(config.artifacts_dir())?;
    let store = Store::open(&config.database_path())?;
    let gateway = Arc::new(Gateway::new(config, store, shutdown.clone()));

    routes::ws::spawn_ping_loop(Arc::clone(&gateway));

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            ctrl_c_shutdown.cancel();
        }
    });

    tracing::info!(%addr, "droverhub listening");
    let router = build_router(gateway);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;
    Ok(())
}
