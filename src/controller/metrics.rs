//! `GET /metrics` — Prometheus text exposition for gateway-level counters
//! (SPEC_FULL.md §6.3). Plain atomics and hand-built text, matching the
//! teacher's `controller::metrics` pattern rather than a metrics crate.

use axum::extract::State;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::http::Controller;
use crate::registry::{ListFilter, Registry};

pub const METRICS_PATH: &str = "/metrics";

static TOTAL_REQUESTS: AtomicU64 = AtomicU64::new(0);
static ERRORED_REQUESTS: AtomicU64 = AtomicU64::new(0);
static PROXIED_BUFFERED: AtomicU64 = AtomicU64::new(0);
static PROXIED_STREAMING: AtomicU64 = AtomicU64::new(0);
static FAILOVERS: AtomicU64 = AtomicU64::new(0);
static AUTO_DEREGISTRATIONS: AtomicU64 = AtomicU64::new(0);

static STATUS_CODE_COUNTERS: OnceLock<Vec<AtomicU64>> = OnceLock::new();

fn status_code_counters() -> &'static Vec<AtomicU64> {
    STATUS_CODE_COUNTERS.get_or_init(|| (0..600).map(|_| AtomicU64::new(0)).collect())
}

pub fn inc_total() {
    TOTAL_REQUESTS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_errors() {
    ERRORED_REQUESTS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_proxied_buffered() {
    PROXIED_BUFFERED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_proxied_streaming() {
    PROXIED_STREAMING.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_failover() {
    FAILOVERS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_auto_deregistration() {
    AUTO_DEREGISTRATIONS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_status_code(code: u16) {
    if let Some(counter) = status_code_counters().get(code as usize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn format_prometheus_metrics(registry: &dyn Registry) -> String {
    let mut output = String::with_capacity(2048);

    output.push_str("# HELP gateway_requests_total Total number of requests handled\n");
    output.push_str("# TYPE gateway_requests_total counter\n");
    output.push_str("gateway_requests_total ");
    output.push_str(&TOTAL_REQUESTS.load(Ordering::Relaxed).to_string());
    output.push('\n');

    output.push_str("# HELP gateway_errors_total Total number of requests that ended in an error response\n");
    output.push_str("# TYPE gateway_errors_total counter\n");
    output.push_str("gateway_errors_total ");
    output.push_str(&ERRORED_REQUESTS.load(Ordering::Relaxed).to_string());
    output.push('\n');

    output.push_str("# HELP gateway_proxied_buffered_total Total number of buffered responses proxied to a backend\n");
    output.push_str("# TYPE gateway_proxied_buffered_total counter\n");
    output.push_str("gateway_proxied_buffered_total ");
    output.push_str(&PROXIED_BUFFERED.load(Ordering::Relaxed).to_string());
    output.push('\n');

    output.push_str("# HELP gateway_proxied_streaming_total Total number of streaming responses proxied to a backend\n");
    output.push_str("# TYPE gateway_proxied_streaming_total counter\n");
    output.push_str("gateway_proxied_streaming_total ");
    output.push_str(&PROXIED_STREAMING.load(Ordering::Relaxed).to_string());
    output.push('\n');

    output.push_str("# HELP gateway_failovers_total Total number of failover attempts after a pre-response failure\n");
    output.push_str("# TYPE gateway_failovers_total counter\n");
    output.push_str("gateway_failovers_total ");
    output.push_str(&FAILOVERS.load(Ordering::Relaxed).to_string());
    output.push('\n');

    output.push_str("# HELP gateway_auto_deregistrations_total Total number of servers auto-deregistered after exceeding the consecutive failure threshold\n");
    output.push_str("# TYPE gateway_auto_deregistrations_total counter\n");
    output.push_str("gateway_auto_deregistrations_total ");
    output.push_str(&AUTO_DEREGISTRATIONS.load(Ordering::Relaxed).to_string());
    output.push('\n');

    output.push_str("# HELP gateway_responses_total Total number of responses returned to clients, by status code\n");
    output.push_str("# TYPE gateway_responses_total counter\n");
    for (code, counter) in status_code_counters().iter().enumerate() {
        let count = counter.load(Ordering::Relaxed);
        if count > 0 {
            output.push_str("gateway_responses_total{code=\"");
            output.push_str(&code.to_string());
            output.push_str("\"} ");
            output.push_str(&count.to_string());
            output.push('\n');
        }
    }

    output.push_str("# HELP gateway_panics_total Total number of handler panics recovered by the panic-recovery middleware\n");
    output.push_str("# TYPE gateway_panics_total counter\n");
    output.push_str("gateway_panics_total ");
    output.push_str(&crate::middleware::panics_counter().to_string());
    output.push('\n');

    output.push_str("# HELP gateway_backend_consecutive_failures Current consecutive probe/request failure count per registered backend\n");
    output.push_str("# TYPE gateway_backend_consecutive_failures gauge\n");
    for record in registry.list(&ListFilter::default()) {
        output.push_str("gateway_backend_consecutive_failures{registration_id=\"");
        output.push_str(&record.registration_id);
        output.push_str("\",model=\"");
        output.push_str(&record.model_name);
        output.push_str("\"} ");
        output.push_str(&record.consecutive_failures.to_string());
        output.push('\n');
    }

    output
}

/// Exposes the counters above as `/metrics`, plus a per-backend gauge read
/// live from the registry at scrape time.
pub struct PrometheusMetricsController {
    registry: Arc<dyn Registry>,
}

impl PrometheusMetricsController {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }

    async fn get_metrics(State(registry): State<Arc<dyn Registry>>) -> impl IntoResponse {
        (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            format_prometheus_metrics(registry.as_ref()),
        )
    }
}

impl Controller for PrometheusMetricsController {
    fn add_route(&self, router: Router) -> Router {
        let metrics_router = Router::new().route(METRICS_PATH, get(Self::get_metrics)).with_state(self.registry.clone());
        router.merge(metrics_router)
    }
}
