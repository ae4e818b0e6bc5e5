// Entrypoint for the inference gateway.

mod app;
mod config;
mod controller;
mod errors;
mod health;
mod http;
mod middleware;
mod registry;
mod selector;
mod shutdown;
mod upstream;

use crate::config::{Config, ConfigTrait};
use crate::shutdown::GracefulShutdown;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Configures structured logging based on configuration: JSON in
/// production-like environments, pretty console output otherwise.
fn configure_logger(cfg: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone()));

    if cfg.is_prod() {
        tracing_subscriber::registry().with(filter).with(fmt::layer().json()).init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer().pretty()).init();
    }
}

fn main() -> Result<()> {
    tokio::runtime::Runtime::new()
        .context("failed to create tokio runtime")?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    let cfg = Config::load().context("failed to load configuration")?;
    configure_logger(&cfg);

    let shutdown_token = CancellationToken::new();
    let graceful_shutdown = GracefulShutdown::new(shutdown_token.clone());
    graceful_shutdown.set_graceful_timeout(cfg.shutdown_grace).await;

    let app = Arc::new(app::App::new(shutdown_token.clone(), cfg).await?);

    graceful_shutdown.add(1);
    if let Err(e) = app.serve(Arc::new(graceful_shutdown.clone())).await {
        error!(component = "main", scope = "app", event = "start_failed", error = %e, "failed to start app");
    }

    if let Err(e) = graceful_shutdown.await_shutdown().await {
        error!(component = "main", scope = "service", event = "graceful_shutdown_failed", error = %e, "failed to gracefully shut down service");
        return Err(e);
    }

    Ok(())
}
