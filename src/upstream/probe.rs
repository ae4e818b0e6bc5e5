//! C3 Probe — a single health check against a backend's `/v1/models`.

use std::time::{Duration, Instant};

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Request, Uri};
use tokio::time::timeout;

use crate::http::client::HyperClient;

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub ok: bool,
    pub latency_ms: i64,
    pub error: Option<String>,
}

/// Issues `GET {endpoint_url}/v1/models` with a hard deadline. Success
/// requires a 2xx status and a body that parses as a JSON object; anything
/// else (non-2xx, malformed body, connect error, timeout) counts as failure.
pub async fn probe(client: &HyperClient, endpoint_url: &str, deadline: Duration, backend_api_key: Option<&str>) -> ProbeResult {
    let started = Instant::now();
    let uri_str = format!("{}/v1/models", endpoint_url.trim_end_matches('/'));

    let uri: Uri = match uri_str.parse() {
        Ok(u) => u,
        Err(e) => {
            return ProbeResult {
                ok: false,
                latency_ms: elapsed_ms(started),
                error: Some(format!("invalid probe URI: {e}")),
            }
        }
    };

    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(key) = backend_api_key {
        builder = builder.header("Authorization", format!("Bearer {key}"));
    }
    let body: BoxBody<Bytes, hyper::Error> = Empty::new().map_err(|never| match never {}).boxed();
    let req = match builder.body(body) {
        Ok(r) => r,
        Err(e) => {
            return ProbeResult {
                ok: false,
                latency_ms: elapsed_ms(started),
                error: Some(format!("failed to build probe request: {e}")),
            }
        }
    };

    let outcome = timeout(deadline, client.request(req)).await;
    let latency_ms = elapsed_ms(started);

    let response = match outcome {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            return ProbeResult { ok: false, latency_ms, error: Some(e.to_string()) };
        }
        Err(_) => {
            return ProbeResult {
                ok: false,
                latency_ms,
                error: Some(format!("probe timed out after {deadline:?}")),
            };
        }
    };

    if !response.status().is_success() {
        return ProbeResult {
            ok: false,
            latency_ms,
            error: Some(format!("unhealthy status {}", response.status())),
        };
    }

    let body_bytes = match response.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return ProbeResult { ok: false, latency_ms, error: Some(e.to_string()) };
        }
    };

    match serde_json::from_slice::<serde_json::Value>(&body_bytes) {
        Ok(serde_json::Value::Object(_)) => ProbeResult { ok: true, latency_ms, error: None },
        Ok(_) => ProbeResult {
            ok: false,
            latency_ms,
            error: Some("probe body is not a JSON object".to_string()),
        },
        Err(e) => ProbeResult {
            ok: false,
            latency_ms,
            error: Some(format!("probe body is not valid JSON: {e}")),
        },
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    started.elapsed().as_millis() as i64
}
