//! `GET /health` — liveness surface, grounded in the teacher's k8s liveness
//! probe controller but checking registry reachability directly instead of
//! watching a set of independently registered services.

use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use serde::Serialize;

use crate::http::Controller;
use crate::registry::{ListFilter, Registry};

const SERVICE_NAME: &str = "inference-gateway";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    database: &'static str,
}

pub struct HealthController {
    registry: Arc<dyn Registry>,
}

impl HealthController {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }

    async fn health(&self) -> impl IntoResponse {
        // A registry scan is the cheapest operation that proves the backing
        // store (in-memory map + SQLite) is actually usable.
        let reachable = std::panic::AssertUnwindSafe(|| self.registry.list(&ListFilter::default()));
        let database_ok = std::panic::catch_unwind(reachable).is_ok();

        let body = HealthBody {
            status: if database_ok { "ok" } else { "degraded" },
            service: SERVICE_NAME,
            version: SERVICE_VERSION,
            database: if database_ok { "up" } else { "down" },
        };
        let status = if database_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
        (status, axum::Json(body))
    }
}

impl Clone for HealthController {
    fn clone(&self) -> Self {
        Self { registry: self.registry.clone() }
    }
}

impl Controller for HealthController {
    fn add_route(&self, router: Router) -> Router {
        let controller = self.clone();
        router.route(
            "/health",
            get(move || {
                let controller = controller.clone();
                async move { controller.health().await }
            }),
        )
    }
}
