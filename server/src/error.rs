// Error types for the MDM control plane API
// Implements the unified error model from spec.md §7.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error response format for admin endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    pub trace_id: Option<String>,
}

/// API error types, one variant per `spec.md` §7 abstract kind.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("dependency unavailable: {0}")]
    Dependency(String),

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "ERR_BAD_REQUEST",
            ApiError::NotFound(_) => "ERR_NOT_FOUND",
            ApiError::Conflict(_) => "ERR_CONFLICT",
            ApiError::Unauthorized(_) => "ERR_UNAUTHORIZED",
            ApiError::Dependency(_) => "ERR_DEPENDENCY",
            ApiError::Internal(_) => "ERR_INTERNAL",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Dependency(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Translate the shared domain error type (tenant/device/command stores)
/// into the HTTP-facing error. Components do not log for their caller —
/// only this boundary logs, avoiding duplicate log lines (`spec.md` §7
/// "Propagation policy").
impl From<mdm_core::Error> for ApiError {
    fn from(err: mdm_core::Error) -> Self {
        match err {
            mdm_core::Error::BadRequest(msg) => ApiError::BadRequest(msg),
            mdm_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            mdm_core::Error::Conflict(msg) => ApiError::Conflict(msg),
            mdm_core::Error::Unauthorized(msg) => ApiError::Unauthorized(msg),
            mdm_core::Error::InvalidState(msg) => ApiError::Conflict(msg),
            mdm_core::Error::Dependency(msg) => ApiError::Dependency(msg),
            mdm_core::Error::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let trace_id = extract_trace_id();

        let error_response = ErrorResponse {
            error_code: self.error_code().to_string(),
            message: self.to_string(),
            trace_id,
        };

        match &self {
            ApiError::Internal(_) | ApiError::Dependency(_) => {
                tracing::error!(error = ?self, "admin API request failed");
            }
            _ => {
                tracing::warn!(error = ?self, "admin API request rejected");
            }
        }

        (self.status_code(), Json(error_response)).into_response()
    }
}

fn extract_trace_id() -> Option<String> {
    use opentelemetry::trace::TraceContextExt;
    use tracing_opentelemetry::OpenTelemetrySpanExt;

    let span = tracing::Span::current();
    let context = span.context();
    let span_context = context.span().span_context();

    if span_context.is_valid() {
        Some(span_context.trace_id().to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_taxonomy() {
        assert_eq!(ApiError::BadRequest("x".into()).error_code(), "ERR_BAD_REQUEST");
        assert_eq!(ApiError::NotFound("x".into()).error_code(), "ERR_NOT_FOUND");
        assert_eq!(ApiError::Conflict("x".into()).error_code(), "ERR_CONFLICT");
        assert_eq!(ApiError::Unauthorized("x".into()).error_code(), "ERR_UNAUTHORIZED");
        assert_eq!(ApiError::Dependency("x".into()).error_code(), "ERR_DEPENDENCY");
        assert_eq!(ApiError::Internal("x".into()).error_code(), "ERR_INTERNAL");
    }

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(ApiError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::Unauthorized("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Dependency("x".into()).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError::Internal("x".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn domain_error_conversion_preserves_kind() {
        let err: ApiError = mdm_core::Error::NotFound("tenant T9".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
