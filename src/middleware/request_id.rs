//! Request-ID correlation: generate one if the client didn't send one, echo
//! it on the response, and make it available to handlers/logs via a request
//! extension.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

pub struct RequestIdMiddleware;

impl RequestIdMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RequestIdMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);
    let id = request
        .headers()
        .get(&header_name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("req_{}", hex::encode(rand::random::<[u8; 8]>())));

    if let Ok(value) = HeaderValue::from_str(&id) {
        request.headers_mut().insert(header_name.clone(), value.clone());
        request.extensions_mut().insert(RequestId(id.clone()));

        let mut response = next.run(request).await;
        response.headers_mut().insert(header_name, value);
        response
    } else {
        next.run(request).await
    }
}

impl crate::middleware::middleware::Middleware for RequestIdMiddleware {
    fn apply(&self, router: axum::Router) -> axum::Router {
        router.layer(axum::middleware::from_fn(request_id_middleware))
    }
}
