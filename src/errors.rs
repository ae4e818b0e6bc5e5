//! Gateway error taxonomy and its mapping onto the HTTP edge.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// The full error taxonomy, one variant per `Kind` in the error design.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    InvalidUrl(String),
    #[error("missing or invalid admin credential")]
    Unauthorized,
    #[error("model '{model}' is not known; available models: {available}")]
    ModelNotFound { model: String, available: String },
    #[error("{0}")]
    Conflict(String),
    #[error("request body exceeds the maximum allowed size")]
    PayloadTooLarge,
    #[error("model '{0}' has no healthy backend")]
    NoHealthyServer(String),
    #[error("all failover attempts exhausted")]
    AllAttemptsFailed,
    #[error("registration '{0}' was not found")]
    NotFound(String),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::NoHealthyServer(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::AllAttemptsFailed => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "BadRequest",
            GatewayError::InvalidUrl(_) => "InvalidURL",
            GatewayError::Unauthorized => "Unauthorized",
            GatewayError::ModelNotFound { .. } => "ModelNotFound",
            GatewayError::Conflict(_) => "Conflict",
            GatewayError::PayloadTooLarge => "PayloadTooLarge",
            GatewayError::NoHealthyServer(_) => "NoHealthyServer",
            GatewayError::AllAttemptsFailed => "AllAttemptsFailed",
            GatewayError::NotFound(_) => "NotFound",
            GatewayError::Internal(_) => "Internal",
        }
    }

    /// User-facing message. Never includes backend URLs, credentials, or
    /// stack traces; `Internal` is deliberately generic.
    fn message(&self) -> String {
        match self {
            GatewayError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    kind: &'static str,
    code: u16,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let GatewayError::Internal(ref e) = self {
            tracing::error!(error = %e, "internal error");
        }
        crate::controller::metrics::inc_errors();
        crate::controller::metrics::inc_status_code(status.as_u16());
        let body = ErrorBody {
            error: ErrorDetail {
                message: self.message(),
                kind: self.kind(),
                code: status.as_u16(),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}
