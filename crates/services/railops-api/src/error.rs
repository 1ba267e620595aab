use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

use railops_types::DomainError;

use crate::store::StoreError;

/// Service-wide error taxonomy. Infrastructure layers return typed errors;
/// this is the single place they become HTTP status + stable `error.code`
/// bodies.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("too many requests")]
    RateLimited { retry_after_seconds: u64 },

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream authorization failed: {0}")]
    UpstreamAuthFailure(String),

    #[error("task queue is full")]
    Busy,

    #[error("stored credential failed to decrypt")]
    VaultInconsistency,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, details: Value) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }

    /// Stable machine-readable code surfaced in the error body.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "validation_failed",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::UpstreamUnavailable(_) => "upstream_unavailable",
            ApiError::UpstreamAuthFailure(_) => "upstream_auth_failure",
            ApiError::Busy => "busy",
            ApiError::VaultInconsistency => "vault_inconsistency",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::UpstreamAuthFailure(_) => StatusCode::BAD_GATEWAY,
            ApiError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::VaultInconsistency => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "request failed: {self}");
        }
        // 5xx bodies stay opaque; the request id header identifies the
        // incident in logs.
        let message = if status.is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let mut error = json!({
            "code": self.code(),
            "message": message,
        });
        match &self {
            ApiError::Validation {
                details: Some(details),
                ..
            } => {
                error["details"] = details.clone();
            }
            ApiError::RateLimited {
                retry_after_seconds,
            } => {
                error["details"] = json!({ "retry_after_seconds": retry_after_seconds });
            }
            _ => {}
        }
        (status, Json(json!({ "error": error }))).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::UnknownStandard(code) => {
                ApiError::NotFound(format!("assessment standard {code}"))
            }
            other => ApiError::validation(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            StoreError::Conflict(what) => ApiError::Conflict(what),
            StoreError::Database(inner) => {
                tracing::error!("database error: {inner}");
                ApiError::internal("database error")
            }
            StoreError::Internal(what) => ApiError::Internal(what),
        }
    }
}

impl From<crate::auth::AuthError> for ApiError {
    fn from(err: crate::auth::AuthError) -> Self {
        use crate::auth::AuthError;
        match err {
            AuthError::MissingRole | AuthError::DepartmentMismatch => {
                ApiError::Forbidden(err.to_string())
            }
            AuthError::TooManyAttempts {
                retry_after_seconds,
            } => ApiError::RateLimited {
                retry_after_seconds,
            },
            AuthError::Internal(msg) => ApiError::Internal(msg),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<railops_vault::VaultError> for ApiError {
    fn from(err: railops_vault::VaultError) -> Self {
        match err {
            railops_vault::VaultError::Corrupt => ApiError::VaultInconsistency,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(
            ApiError::validation("x").status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Conflict("dup".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::Busy.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::VaultInconsistency.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn five_hundreds_hide_detail() {
        let response = ApiError::internal("connection pool exhausted").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
