//! C8 Admin Handler — CRUD over registrations, gated by `X-API-Key`
//! (spec.md §4.8).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::http::Controller;
use crate::errors::GatewayError;
use crate::http::client::HyperClient;
use crate::registry::{
    validate_endpoint_url, validate_resolved, Capabilities, HealthStatus, ListFilter, Owner, Patch, Registry,
};
use crate::upstream::probe;

const MODEL_NAME_MAX_LEN: usize = 128;

struct Shared {
    registry: Arc<dyn Registry>,
    client: HyperClient,
    config: Config,
}

pub struct AdminController {
    shared: Arc<Shared>,
}

impl AdminController {
    pub fn new(registry: Arc<dyn Registry>, client: HyperClient, config: Config) -> Self {
        Self { shared: Arc::new(Shared { registry, client, config }) }
    }

    fn authorize(config: &Config, headers: &HeaderMap) -> Result<(), GatewayError> {
        let provided = headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if provided.is_empty() || provided != config.admin_api_key {
            return Err(GatewayError::Unauthorized);
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct RegisterRequest {
    model_name: String,
    endpoint_url: String,
    #[serde(default)]
    backend_api_key: Option<String>,
    #[serde(default)]
    capabilities: Capabilities,
    #[serde(default)]
    owner: Owner,
}

#[derive(Serialize)]
struct RegisterResponse {
    registration_id: String,
    status: &'static str,
    health_status: &'static str,
}

fn validate_model_name(name: &str) -> Result<(), GatewayError> {
    let valid = !name.is_empty()
        && name.len() <= MODEL_NAME_MAX_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(GatewayError::BadRequest(
            "model_name must match ^[A-Za-z0-9._-]+$ and be 1-128 chars".to_string(),
        ))
    }
}

fn validate_capabilities(caps: &Capabilities) -> Result<(), GatewayError> {
    if caps.max_tokens.is_some_and(|v| v <= 0) {
        return Err(GatewayError::BadRequest("capabilities.max_tokens must be positive".to_string()));
    }
    if caps.context_length.is_some_and(|v| v <= 0) {
        return Err(GatewayError::BadRequest(
            "capabilities.context_length must be positive".to_string(),
        ));
    }
    Ok(())
}

async fn register(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    AdminController::authorize(&shared.config, &headers)?;
    validate_model_name(&payload.model_name)?;
    validate_capabilities(&payload.capabilities)?;
    let endpoint_url = validate_endpoint_url(&payload.endpoint_url)?;
    validate_resolved(&endpoint_url).await?;

    let probe_result = probe::probe(
        &shared.client,
        &payload.endpoint_url,
        shared.config.health_check_timeout,
        payload.backend_api_key.as_deref(),
    )
    .await;

    let now = crate::registry::now_unix();
    let health_status = if probe_result.ok { HealthStatus::Healthy } else { HealthStatus::Unhealthy };
    let record = crate::registry::ServerRecord {
        registration_id: crate::registry::id::generate(),
        model_name: payload.model_name,
        endpoint_url: payload.endpoint_url,
        backend_api_key: payload.backend_api_key,
        capabilities: payload.capabilities,
        owner: payload.owner,
        registered_at: now,
        last_checked_at: Some(now),
        last_latency_ms: if probe_result.ok { Some(probe_result.latency_ms) } else { None },
        health_status,
        consecutive_failures: if probe_result.ok { 0 } else { 1 },
        is_active: true,
        updated_at: now,
    };

    let registration_id = record.registration_id.clone();
    shared.registry.insert(record).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            registration_id,
            status: "registered",
            health_status: health_status.as_str(),
        }),
    ))
}

async fn deregister(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, GatewayError> {
    AdminController::authorize(&shared.config, &headers)?;
    shared.registry.get(&id)?;
    shared.registry.soft_delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize, Default)]
struct UpdateRequest {
    #[serde(default)]
    model_name: Option<String>,
    #[serde(default)]
    endpoint_url: Option<String>,
    #[serde(default)]
    backend_api_key: Option<Option<String>>,
    #[serde(default)]
    capabilities: Option<Capabilities>,
    #[serde(default)]
    owner: Option<Owner>,
}

async fn update(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    AdminController::authorize(&shared.config, &headers)?;

    if let Some(name) = &payload.model_name {
        validate_model_name(name)?;
    }
    if let Some(url) = &payload.endpoint_url {
        let parsed = validate_endpoint_url(url)?;
        validate_resolved(&parsed).await?;
    }
    if let Some(caps) = &payload.capabilities {
        validate_capabilities(caps)?;
    }

    let patch = Patch {
        model_name: payload.model_name,
        endpoint_url: payload.endpoint_url,
        backend_api_key: payload.backend_api_key,
        capabilities: payload.capabilities,
        owner: payload.owner,
        ..Default::default()
    };
    let updated = shared.registry.patch(&id, patch).await?;
    Ok(Json(ServerProjection {
        registration_id: updated.registration_id,
        model_name: updated.model_name,
        endpoint_url: updated.endpoint_url,
        capabilities: updated.capabilities,
        owner: updated.owner,
        registered_at: updated.registered_at,
        last_checked_at: updated.last_checked_at,
        last_latency_ms: updated.last_latency_ms,
        health_status: updated.health_status.as_str(),
        consecutive_failures: updated.consecutive_failures,
        is_active: updated.is_active,
        updated_at: updated.updated_at,
    }))
}

#[derive(Deserialize, Default)]
struct ListQuery {
    model: Option<String>,
    health: Option<String>,
    active: Option<bool>,
}

#[derive(Serialize)]
struct ServerProjection {
    registration_id: String,
    model_name: String,
    endpoint_url: String,
    capabilities: Capabilities,
    owner: Owner,
    registered_at: i64,
    last_checked_at: Option<i64>,
    last_latency_ms: Option<i64>,
    health_status: &'static str,
    consecutive_failures: u32,
    is_active: bool,
    updated_at: i64,
}

async fn list_servers(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, GatewayError> {
    AdminController::authorize(&shared.config, &headers)?;

    let health_status = match query.health {
        Some(raw) => Some(
            HealthStatus::parse(&raw)
                .ok_or_else(|| GatewayError::BadRequest(format!("invalid health filter '{raw}'")))?,
        ),
        None => None,
    };
    let include_inactive = query.active == Some(false) || query.active.is_none();
    let filter = ListFilter { model_name: query.model, health_status, include_inactive };

    let mut records: Vec<ServerProjection> = shared
        .registry
        .list(&filter)
        .into_iter()
        .filter(|r| query.active.is_none_or(|active| r.is_active == active))
        .map(|r| ServerProjection {
            registration_id: r.registration_id,
            model_name: r.model_name,
            endpoint_url: r.endpoint_url,
            capabilities: r.capabilities,
            owner: r.owner,
            registered_at: r.registered_at,
            last_checked_at: r.last_checked_at,
            last_latency_ms: r.last_latency_ms,
            health_status: r.health_status.as_str(),
            consecutive_failures: r.consecutive_failures,
            is_active: r.is_active,
            updated_at: r.updated_at,
        })
        .collect();
    records.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));

    Ok(Json(records))
}

#[derive(Serialize)]
struct StatsResponse {
    total_servers: usize,
    healthy: usize,
    unhealthy: usize,
    unknown: usize,
    models: usize,
}

async fn stats(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, GatewayError> {
    AdminController::authorize(&shared.config, &headers)?;
    let stats = shared.registry.stats();
    Ok(Json(StatsResponse {
        total_servers: stats.total_servers,
        healthy: stats.healthy,
        unhealthy: stats.unhealthy,
        unknown: stats.unknown,
        models: stats.models,
    }))
}

impl Controller for AdminController {
    fn add_route(&self, router: Router) -> Router {
        let admin_router = Router::new()
            .route("/admin/register", post(register))
            .route("/admin/register/{id}", axum::routing::delete(deregister).put(update))
            .route("/admin/servers", get(list_servers))
            .route("/admin/stats", get(stats))
            .with_state(self.shared.clone());
        router.merge(admin_router)
    }
}
