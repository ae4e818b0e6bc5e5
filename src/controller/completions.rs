//! C7 Request Handler — `POST /v1/chat/completions` and `POST /v1/completions`.
//! Both endpoints share the same parse → select → forward → failover control
//! flow (spec.md §4.7); they differ only in backend wire schema, which this
//! gateway never reshapes.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderValue, Method, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use futures::Stream;

use crate::config::Config;
use crate::http::Controller;
use crate::errors::GatewayError;
use crate::health;
use crate::http::client::HyperClient;
use crate::registry::Registry;
use crate::selector::Selector;
use crate::upstream::proxy::{self, ForwardRequest, Outcome};

const GATEWAY_SERVER_ID_HEADER: &str = "x-gateway-server-id";

struct Shared {
    registry: Arc<dyn Registry>,
    selector: Arc<Selector>,
    client: HyperClient,
    config: Config,
}

/// Handles `/v1/chat/completions` and `/v1/completions`; `path` pins which of
/// the two routes a given instance answers for, since that's the only thing
/// that differs in the forwarding contract (spec.md §4.6 "Method and path").
pub struct CompletionsController {
    shared: Arc<Shared>,
    path: &'static str,
    route: &'static str,
}

impl CompletionsController {
    pub fn chat_completions(
        registry: Arc<dyn Registry>,
        selector: Arc<Selector>,
        client: HyperClient,
        config: Config,
    ) -> Self {
        Self {
            shared: Arc::new(Shared { registry, selector, client, config }),
            path: "/v1/chat/completions",
            route: "/v1/chat/completions",
        }
    }

    pub fn completions(
        registry: Arc<dyn Registry>,
        selector: Arc<Selector>,
        client: HyperClient,
        config: Config,
    ) -> Self {
        Self {
            shared: Arc::new(Shared { registry, selector, client, config }),
            path: "/v1/completions",
            route: "/v1/completions",
        }
    }

    async fn handle(
        shared: Arc<Shared>,
        path: &'static str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response<Body>, GatewayError> {
        let parsed: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::BadRequest(format!("invalid JSON body: {e}")))?;

        let model = parsed
            .get("model")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::BadRequest("missing required field 'model'".to_string()))?
            .to_string();

        let streaming = parsed.get("stream").and_then(|v| v.as_bool()).unwrap_or(false);

        let max_retry = shared.config.max_retry_attempts;
        let max_failures = shared.config.max_consecutive_failures;
        let auto_deregister = shared.config.auto_deregister_after_failures;

        let mut tried: HashSet<String> = HashSet::new();
        let mut attempt = 0u32;

        crate::controller::metrics::inc_total();

        loop {
            let server = match shared.selector.select(shared.registry.as_ref(), &model, &tried) {
                Ok(server) => server,
                Err(err) if attempt == 0 => return Err(err),
                Err(_) => return Err(GatewayError::AllAttemptsFailed),
            };

            let req = ForwardRequest {
                method: Method::POST,
                path: path.to_string(),
                headers: headers.clone(),
                body: body.clone(),
                streaming,
                total_timeout: shared.config.request_timeout,
                idle_timeout: shared.config.idle_chunk_timeout,
            };

            match proxy::forward(&shared.client, &server, req).await {
                Outcome::Buffered { status, headers: resp_headers, body: resp_body } => {
                    if status.is_success() {
                        let _ = health::mark_success(shared.registry.as_ref(), &server.registration_id).await;
                    }
                    crate::controller::metrics::inc_proxied_buffered();
                    crate::controller::metrics::inc_status_code(status.as_u16());
                    return Ok(build_buffered_response(status, resp_headers, resp_body, &server.registration_id));
                }
                Outcome::Streaming { status, headers: resp_headers, stream } => {
                    crate::controller::metrics::inc_proxied_streaming();
                    crate::controller::metrics::inc_status_code(status.as_u16());
                    let observed = ObservedStream::new(stream, shared.registry.clone(), server.registration_id.clone());
                    let mut response = Response::builder().status(status);
                    for (name, value) in resp_headers.iter() {
                        response = response.header(name, value);
                    }
                    if let Ok(id_value) = HeaderValue::from_str(&server.registration_id) {
                        response = response.header(GATEWAY_SERVER_ID_HEADER, id_value);
                    }
                    return Ok(response
                        .body(Body::from_stream(observed))
                        .unwrap_or_else(|_| Response::new(Body::empty())));
                }
                Outcome::PostResponseFailure(reason) => {
                    let _ = health::demote(shared.registry.as_ref(), &server.registration_id, max_failures, auto_deregister).await;
                    tracing::warn!(
                        component = "request_handler",
                        registration_id = %server.registration_id,
                        error = %reason,
                        "backend response body failed after status line was received"
                    );
                    return Err(GatewayError::Internal(anyhow::anyhow!(
                        "backend connection failed while reading the response body"
                    )));
                }
                Outcome::PreResponseFailure(reason) => {
                    let _ = health::demote(shared.registry.as_ref(), &server.registration_id, max_failures, auto_deregister).await;
                    tracing::warn!(
                        component = "request_handler",
                        registration_id = %server.registration_id,
                        error = %reason,
                        attempt,
                        "pre-response failure, failing over"
                    );
                    tried.insert(server.registration_id);
                    attempt += 1;
                    crate::controller::metrics::inc_failover();
                    if attempt > max_retry {
                        return Err(GatewayError::AllAttemptsFailed);
                    }
                }
            }
        }
    }
}

fn build_buffered_response(
    status: StatusCode,
    upstream_headers: HeaderMap,
    body: Bytes,
    server_id: &str,
) -> Response<Body> {
    let mut builder = Response::builder().status(status);
    for (name, value) in upstream_headers.iter() {
        builder = builder.header(name, value);
    }
    if let Ok(id_value) = HeaderValue::from_str(server_id) {
        builder = builder.header(GATEWAY_SERVER_ID_HEADER, id_value);
    }
    builder.body(Body::from(body)).unwrap_or_else(|_| Response::new(Body::empty()))
}

/// Wraps the proxy engine's chunk stream so that draining it to completion
/// (clean `None`) marks the backend healthy, and an error item demotes it —
/// the "observe and classify outcomes" half of C6 that only the consumer of
/// the stream can determine (spec.md §4.7 step 4d). Patches run on a spawned
/// task since `poll_next` is synchronous.
struct ObservedStream {
    inner: proxy::ChunkStream,
    registry: Arc<dyn Registry>,
    server_id: String,
    done: bool,
}

impl ObservedStream {
    fn new(inner: proxy::ChunkStream, registry: Arc<dyn Registry>, server_id: String) -> Self {
        Self { inner, registry, server_id, done: false }
    }

    fn spawn_outcome(&self, clean: bool) {
        let registry = self.registry.clone();
        let id = self.server_id.clone();
        tokio::spawn(async move {
            if clean {
                let _ = health::mark_success(registry.as_ref(), &id).await;
            } else {
                // No auto-deregister threshold applies here (spec.md §4.6):
                // only `PreResponseFailure` is subject to the same
                // threshold the health monitor uses.
                let _ = health::demote(registry.as_ref(), &id, 0, false).await;
            }
        });
    }
}

impl Stream for ObservedStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => Poll::Ready(Some(Ok(bytes))),
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                this.spawn_outcome(false);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                this.spawn_outcome(true);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Controller for CompletionsController {
    fn add_route(&self, router: Router) -> Router {
        let shared = self.shared.clone();
        let path = self.path;
        router.route(
            self.route,
            post(move |headers: HeaderMap, body: Bytes| {
                let shared = shared.clone();
                async move {
                    match Self::handle(shared, path, headers, body).await {
                        Ok(response) => response.into_response(),
                        Err(err) => err.into_response(),
                    }
                }
            }),
        )
    }
}
