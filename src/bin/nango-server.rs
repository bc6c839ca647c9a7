/// nango-server - consumes connection and action requests from NATS JetStream
///
/// Boot order: server settings, logging, integrations and connection store,
/// NATS, then the consumption loop and health endpoints until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use nango_server::server::health;
use nango_server::server::shutdown::{forward_signal, wait_for};
use nango_server::{DatabaseConfig, NatsClient, NatsConfig, Server, ServerContext, ServerSettings};

#[derive(Parser)]
#[command(name = "nango-server")]
#[command(version, about = "Execution backend for integration connections and actions", long_about = None)]
struct Cli {
    /// Directory containing nango-config.yaml and integrations.yaml
    #[arg(short, long, env = "NANGO_INTEGRATIONS_DIR")]
    integrations_dir: PathBuf,

    /// Connection database (SQLite path or server URL)
    #[arg(short, long, env = "DATABASE_URL", default_value = "nango.db")]
    database_url: String,

    /// Port for /health and /ready
    #[arg(short, long, env = "PORT", default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // Settings carry the log levels, so they are read before logging starts
    let settings = ServerSettings::load_from_dir(&cli.integrations_dir)
        .context("Fatal server error, cannot bootstrap")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_directives()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let ctx = ServerContext::bootstrap(
        settings,
        &cli.integrations_dir,
        &cli.database_url,
        DatabaseConfig::default(),
    )
    .context("Fatal server error, cannot bootstrap")?;

    let nats = NatsClient::connect(NatsConfig::default())
        .await
        .context("Failed to connect to NATS")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let health_shutdown = wait_for(shutdown_rx.clone());
    let health = tokio::spawn(health::serve(cli.port, nats.clone(), health_shutdown));

    tokio::spawn(forward_signal(tokio::signal::ctrl_c(), shutdown_tx));

    let server = Server::new(Arc::new(ctx), nats);
    let outcome = server.run(wait_for(shutdown_rx)).await;

    // The server may stop on its own, before any signal reaches the health task
    if !health.is_finished() {
        health.abort();
    }
    match health.await {
        Ok(Err(e)) => tracing::warn!("{}", e),
        Err(e) if !e.is_cancelled() => tracing::warn!("Health server task failed: {}", e),
        _ => {}
    }

    outcome?;

    tracing::info!("Server stopped");
    Ok(())
}
