//! Glyphmine gateway: engine bootstrap, HTTP API, and notifications.

mod api;
mod config;
mod notify;

use anyhow::Context;
use clap::Parser;
use config::GatewayConfig;
use glyphmine_engine::Engine;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "glyphmine-gateway", about = "Run the glyphmine game service.")]
struct Args {
    /// Path to a YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = GatewayConfig::load(args.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir.display(),
        "starting glyphmine gateway"
    );

    let engine = Engine::start(config.engine_config()?)?;
    engine.spawn_ticker();

    if let Some(webhook_url) = config.webhook_url.clone() {
        let notifier = notify::Notifier::new(webhook_url, config.notify_role_id.clone());
        let events = engine.subscribe();
        tokio::spawn(notifier.run(events));
    }

    let app = api::router(engine.clone());
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("bind {}", config.listen_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve HTTP API")?;

    // Flush pending writes and stop timers before the process exits.
    engine.shutdown().await;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to install ctrl-c handler");
        return;
    }
    info!("shutdown signal received");
}
