use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

mod backend;
mod config;
mod dashboard;
mod error;
mod review;
mod session;

use backend::{BackendClient, ReviewBackend};
use config::Config;
use dashboard::AppState;
use session::spawn_session;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let client = BackendClient::new(
        &config.backend_url,
        Duration::from_secs(config.http_timeout_secs),
    )?;
    let backend: Arc<dyn ReviewBackend> = Arc::new(client);
    info!("Using backend {} at {}", backend.name(), config.backend_url);

    let (session, session_task) = spawn_session(
        Arc::clone(&backend),
        Duration::from_secs(config.tick_interval_secs),
    );

    if let Some(match_id) = &config.match_id {
        session
            .select_match(match_id.clone())
            .await
            .context("Failed to select initial match")?;
    }

    let state = AppState {
        session,
        backend,
        default_game: config.game,
    };
    let app = dashboard::router(state);
    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address '{}'", config.listen_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Review API listening on http://{}", addr);

    // Run API server (blocks until Ctrl-C)
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await?;

    session_task.abort();

    Ok(())
}
