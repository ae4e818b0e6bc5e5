//! C6 Proxy Engine — forwards one request to one backend, buffered or
//! streamed, and classifies the outcome for C7's failover loop.

use std::pin::Pin;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use futures::{Stream, StreamExt};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyDataStream, BodyExt, Full};
use hyper::body::Bytes;
use hyper::Request;
use tokio::time::timeout;

use crate::http::client::HyperClient;
use crate::registry::ServerRecord;

/// Headers that are never forwarded verbatim between the gateway and a
/// backend: hop-by-hop headers, plus `Authorization`, which always carries
/// the gateway's own admin/client credential and must never leak upstream.
const STRIPPED_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
    "authorization",
];

pub struct ForwardRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub streaming: bool,
    pub total_timeout: Duration,
    pub idle_timeout: Duration,
}

/// Result of a single forwarding attempt. Only `PreResponseFailure` is
/// eligible for failover to another backend (spec.md §4.6) — once a
/// response has started, the client has already committed to this backend.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

pub enum Outcome {
    Buffered {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    Streaming {
        status: StatusCode,
        headers: HeaderMap,
        stream: ChunkStream,
    },
    PreResponseFailure(String),
    PostResponseFailure(String),
}

fn build_outbound_headers(src: &HeaderMap, backend_api_key: Option<&str>) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in src.iter() {
        if STRIPPED_HEADERS.iter().any(|h| name.as_str().eq_ignore_ascii_case(h)) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    if let Some(key) = backend_api_key {
        if let Ok(v) = HeaderValue::from_str(&format!("Bearer {key}")) {
            out.insert(axum::http::header::AUTHORIZATION, v);
        }
    }
    out
}

pub async fn forward(client: &HyperClient, record: &ServerRecord, req: ForwardRequest) -> Outcome {
    let uri_str = format!("{}{}", record.endpoint_url.trim_end_matches('/'), req.path);
    let uri: Uri = match uri_str.parse() {
        Ok(u) => u,
        Err(e) => return Outcome::PreResponseFailure(format!("invalid upstream URI: {e}")),
    };

    let headers = build_outbound_headers(&req.headers, record.backend_api_key.as_deref());
    let mut builder = Request::builder().method(req.method).uri(uri);
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }
    let outbound_body: BoxBody<Bytes, hyper::Error> =
        Full::new(req.body).map_err(|never| match never {}).boxed();
    let outbound = match builder.body(outbound_body) {
        Ok(r) => r,
        Err(e) => return Outcome::PreResponseFailure(format!("failed to build request: {e}")),
    };

    let response = match timeout(req.total_timeout, client.request(outbound)).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => return Outcome::PreResponseFailure(e.to_string()),
        Err(_) => {
            return Outcome::PreResponseFailure(format!(
                "request timed out after {:?}",
                req.total_timeout
            ))
        }
    };

    let status = response.status();
    let resp_headers = response.headers().clone();
    let (_, incoming) = response.into_parts();

    if !req.streaming {
        match timeout(req.total_timeout, incoming.collect()).await {
            Ok(Ok(collected)) => Outcome::Buffered {
                status,
                headers: resp_headers,
                body: collected.to_bytes(),
            },
            Ok(Err(e)) => Outcome::PostResponseFailure(e.to_string()),
            Err(_) => Outcome::PostResponseFailure("response body read timed out".to_string()),
        }
    } else {
        let stream = Box::pin(idle_bounded_chunks(incoming, req.idle_timeout));
        Outcome::Streaming { status, headers: resp_headers, stream }
    }
}

/// Wraps a hyper response body into a chunk stream where each chunk must
/// arrive within `idle_timeout`; the stream ends (with a final error item)
/// the first time a chunk is late or the underlying read fails.
fn idle_bounded_chunks(
    body: hyper::body::Incoming,
    idle_timeout: Duration,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> {
    let inner = BodyDataStream::new(body);
    futures::stream::unfold(Some(inner), move |state| async move {
        let mut inner = state?;
        match timeout(idle_timeout, inner.next()).await {
            Ok(Some(Ok(bytes))) => Some((Ok(bytes), Some(inner))),
            Ok(Some(Err(e))) => {
                Some((Err(std::io::Error::new(std::io::ErrorKind::Other, e)), None))
            }
            Ok(None) => None,
            Err(_) => Some((
                Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "idle chunk timeout")),
                None,
            )),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Capabilities, HealthStatus, Owner};

    fn sample_record(endpoint: &str) -> ServerRecord {
        ServerRecord {
            registration_id: "srv_test".to_string(),
            model_name: "m1".to_string(),
            endpoint_url: endpoint.to_string(),
            backend_api_key: Some("secret".to_string()),
            capabilities: Capabilities::default(),
            owner: Owner::default(),
            registered_at: 0,
            last_checked_at: None,
            last_latency_ms: None,
            health_status: HealthStatus::Healthy,
            consecutive_failures: 0,
            is_active: true,
            updated_at: 0,
        }
    }

    #[test]
    fn strips_client_authorization_and_injects_backend_key() {
        let mut src = HeaderMap::new();
        src.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer client-key"));
        src.insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let out = build_outbound_headers(&src, Some("backend-key"));
        assert_eq!(out.get(axum::http::header::AUTHORIZATION).unwrap(), "Bearer backend-key");
        assert_eq!(out.get(axum::http::header::CONTENT_TYPE).unwrap(), "application/json");
    }

    #[tokio::test]
    async fn pre_response_failure_on_connect_refused() {
        let client = crate::http::client::create_client();
        let record = sample_record("http://127.0.0.1:1");
        let req = ForwardRequest {
            method: Method::POST,
            path: "/v1/chat/completions".to_string(),
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"{}"),
            streaming: false,
            total_timeout: Duration::from_millis(500),
            idle_timeout: Duration::from_millis(500),
        };
        match forward(&client, &record, req).await {
            Outcome::PreResponseFailure(_) => {}
            _ => panic!("expected PreResponseFailure"),
        }
    }
}
