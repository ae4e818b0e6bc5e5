// HTTP server wiring: controller and middleware composition for the gateway.

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::http::client::HyperClient;
use crate::http::{Controller, Middleware, Server as HttpServerTrait};
use crate::registry::Registry;
use crate::selector::Selector;

/// Wraps the generic `crate::http::HttpServer` with the gateway's concrete
/// controller and middleware set.
pub struct HttpServer {
    server: Arc<dyn HttpServerTrait>,
}

impl HttpServer {
    pub fn new(
        ctx: CancellationToken,
        cfg: Config,
        registry: Arc<dyn Registry>,
        selector: Arc<Selector>,
        client: HyperClient,
    ) -> Result<Self> {
        let controllers = Self::controllers(&cfg, registry, selector, client);
        let middlewares = Self::middlewares(&cfg);

        let server = crate::http::HttpServer::new(ctx, cfg, controllers, middlewares)?;

        Ok(Self { server })
    }

    pub async fn listen_and_serve(&self) -> Result<()> {
        self.server.listen_and_serve().await
    }

    fn controllers(
        cfg: &Config,
        registry: Arc<dyn Registry>,
        selector: Arc<Selector>,
        client: HyperClient,
    ) -> Vec<Box<dyn Controller>> {
        use crate::controller;

        vec![
            // Liveness probe for orchestrators (k8s, etc).
            Box::new(controller::HealthController::new(registry.clone())),
            // Prometheus-compatible metrics.
            Box::new(controller::PrometheusMetricsController::new(registry.clone())),
            // Lists models currently backed by at least one active registration.
            Box::new(controller::ModelsController::new(registry.clone())),
            // OpenAI-compatible chat completions, with failover.
            Box::new(controller::CompletionsController::chat_completions(
                registry.clone(),
                selector.clone(),
                client.clone(),
                cfg.clone(),
            )),
            // OpenAI-compatible legacy completions, with failover.
            Box::new(controller::CompletionsController::completions(
                registry.clone(),
                selector,
                client.clone(),
                cfg.clone(),
            )),
            // Admin CRUD over server registrations, gated by X-API-Key.
            Box::new(controller::AdminController::new(registry, client, cfg.clone())),
        ]
    }

    fn middlewares(cfg: &Config) -> Vec<Box<dyn Middleware>> {
        vec![
            // Exec first: reject oversized bodies before anything else sees them.
            Box::new(crate::middleware::BodyLimitMiddleware::new(cfg.max_request_body_size)),
            // Exec second: correlate every request with an X-Request-ID.
            Box::new(crate::middleware::RequestIdMiddleware::new()),
            // Exec third: recover panics into a 500 instead of tearing down the connection.
            Box::new(crate::middleware::PanicRecoverMiddleware::new()),
        ]
    }
}
