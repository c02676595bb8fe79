// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use droverhub::config::GatewayConfig;
use droverhub::store::sessions::Role;
use droverhub::store::Store;

#[derive(Parser)]
#[command(name = "droverhub", version, about = "Gateway for the drover AI-worker control plane.")]
struct Cli {
    #[command(flatten)]
    config: GatewayConfig,

    #[command(subcommand)]
    subcommand: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Manage UI sessions.
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Run database migrations and exit.
    Migrate,
}

#[derive(clap::Subcommand)]
enum SessionCommands {
    /// Issue a UI session token (printed exactly once).
    Create {
        /// User the session belongs to.
        #[arg(long)]
        user: String,
        /// Role: admin, operator, or viewer.
        #[arg(long, default_value = "operator")]
        role: String,
        /// Session lifetime in hours.
        #[arg(long, default_value_t = 720)]
        ttl_hours: i64,
    },
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

    let result = match cli.subcommand {
        Some(Commands::Session { command: SessionCommands::Create { user, role, ttl_hours } }) => {
            create_session(&cli.config, &user, &role, ttl_hours).await
        }
        Some(Commands::Migrate) => {
            Store::open(&cli.config.database_path()).map(|_| println!("migrations applied"))
        }
        None => droverhub::run(cli.config).await,
    };

    if let Err(e) = result {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn create_session(
    config: &GatewayConfig,
    user: &str,
    role: &str,
    ttl_hours: i64,
) -> anyhow::Result<()> {
    let role = Role::parse(role)
        .ok_or_else(|| anyhow::anyhow!("role must be admin, operator, or viewer"))?;
    let store = Store::open(&config.database_path())?;
    let session = store.create_session(user, role, ttl_hours * 3_600_000).await?;
    println!("{}", session.id);
    eprintln!("session for {user} ({}) expires in {ttl_hours}h — token shown once", role.as_str());
    Ok(())
}
