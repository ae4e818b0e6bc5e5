//! Request body size enforcement: buffers the body up to `max_bytes` and
//! rejects oversized requests with the gateway's own error shape instead of
//! axum's built-in plain-text 413 body (spec.md §6/§7: all non-2xx
//! responses use `{"error": {...}}`).

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::errors::GatewayError;

pub struct BodyLimitMiddleware {
    max_bytes: usize,
}

impl BodyLimitMiddleware {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

async fn enforce_body_limit(max_bytes: usize, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    match to_bytes(body, max_bytes).await {
        Ok(bytes) => next.run(Request::from_parts(parts, Body::from(bytes))).await,
        Err(_) => GatewayError::PayloadTooLarge.into_response(),
    }
}

impl crate::middleware::middleware::Middleware for BodyLimitMiddleware {
    fn apply(&self, router: axum::Router) -> axum::Router {
        let max_bytes = self.max_bytes;
        router.layer(axum::middleware::from_fn(move |request: Request, next: Next| {
            enforce_body_limit(max_bytes, request, next)
        }))
    }
}
