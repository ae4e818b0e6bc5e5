// Top-level application lifecycle: wires the registry, health monitor and
// HTTP server together and tears them down in reverse order on shutdown.

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::health::HealthMonitor;
use crate::http::client::create_client;
use crate::registry::{InMemoryRegistry, Registry, SqliteStore};
use crate::selector::Selector;

use super::server::HttpServer;

/// Owns every long-lived piece of the gateway: the registry, the health
/// monitor task and the HTTP server, matching the teacher's `App` shape
/// (spec.md §2.1 "Process wiring").
pub struct App {
    shutdown_token: CancellationToken,
    server: Arc<HttpServer>,
}

impl App {
    pub async fn new(shutdown_token: CancellationToken, cfg: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&cfg.database_url)?);
        let registry = InMemoryRegistry::new(store).await? as Arc<dyn Registry>;
        let client = create_client();
        let selector = Arc::new(Selector::new());

        let health_monitor = Arc::new(HealthMonitor::new(
            registry.clone(),
            client.clone(),
            cfg.health_check_interval,
            cfg.health_check_timeout,
            cfg.max_consecutive_failures,
            cfg.auto_deregister_after_failures,
        ));
        // Detached: the monitor stops itself once `shutdown_token` cancels.
        health_monitor.spawn(shutdown_token.clone());

        let server = Arc::new(HttpServer::new(
            shutdown_token.clone(),
            cfg,
            registry,
            selector,
            client,
        )?);

        Ok(Self { shutdown_token, server })
    }

    /// Starts the HTTP server in the background; once it returns (on
    /// shutdown-token cancellation) tears down the rest of the app and
    /// reports completion on `gsh`, mirroring the teacher's `App::serve`.
    pub async fn serve(self: &Arc<Self>, gsh: Arc<crate::shutdown::GracefulShutdown>) -> Result<()> {
        let app = self.clone();
        let gsh_clone = gsh.clone();

        tokio::task::spawn(async move {
            if let Err(e) = app.server.listen_and_serve().await {
                error!(
                    component = "app",
                    scope = "server",
                    event = "serve_failed",
                    error = %e,
                    "server failed to serve"
                );
            }

            if let Err(e) = app.close().await {
                error!(component = "app", scope = "shutdown", event = "close_failed", error = %e, "application close failed");
            }

            gsh_clone.done();
        });

        info!(component = "app", event = "started", "application lifecycle");
        Ok(())
    }

    /// Cancels the shared shutdown token, which stops both the HTTP server's
    /// graceful-shutdown future and the health monitor's select loop; the
    /// registry's SQLite handle closes on drop.
    pub async fn close(&self) -> Result<()> {
        self.shutdown_token.cancel();
        info!(component = "app", event = "stopped", "application lifecycle");
        Ok(())
    }
}
