//! `GET /v1/models` — groups active records by `model_name` (spec.md §4.7).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::http::Controller;
use crate::registry::{HealthStatus, ListFilter, Registry};

#[derive(Serialize)]
struct ModelEntry {
    id: String,
    object: &'static str,
    created: i64,
    owned_by: &'static str,
    available_servers: usize,
}

#[derive(Serialize)]
struct ModelsList {
    object: &'static str,
    data: Vec<ModelEntry>,
}

pub struct ModelsController {
    registry: Arc<dyn Registry>,
}

impl ModelsController {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }

    async fn list(&self) -> impl IntoResponse {
        let records = self.registry.list(&ListFilter::default());

        // (earliest registered_at, healthy count) per model; models with
        // zero active records never appear here because `list` only sees
        // active rows by default.
        let mut grouped: BTreeMap<String, (i64, usize)> = BTreeMap::new();
        for record in records {
            let entry = grouped
                .entry(record.model_name.clone())
                .or_insert((record.registered_at, 0));
            if record.registered_at < entry.0 {
                entry.0 = record.registered_at;
            }
            if record.health_status == HealthStatus::Healthy {
                entry.1 += 1;
            }
        }

        let data = grouped
            .into_iter()
            .map(|(id, (created, available_servers))| ModelEntry {
                id,
                object: "model",
                created,
                owned_by: "multiverse",
                available_servers,
            })
            .collect();

        Json(ModelsList { object: "list", data })
    }
}

impl Clone for ModelsController {
    fn clone(&self) -> Self {
        Self { registry: self.registry.clone() }
    }
}

impl Controller for ModelsController {
    fn add_route(&self, router: Router) -> Router {
        let controller = self.clone();
        router.route(
            "/v1/models",
            get(move || {
                let controller = controller.clone();
                async move { controller.list().await }
            }),
        )
    }
}
