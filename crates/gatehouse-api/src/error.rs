//! Error types for the HTTP surface

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gatehouse_publisher::{PublishError, Violation};
use serde::Serialize;
use tracing::error;

/// Result type for handlers
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for handlers
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing, unknown, or unusable credential
    #[error("authentication failed: {0}")]
    Unauthorized(String),

    /// Authenticated caller may not perform the operation
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Malformed request outside the publish body
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Workflow error
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Server failed to start or serve
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::BadRequest(_) => "BAD_REQUEST",
            Error::Publish(e) => e.code(),
            Error::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Publish(e) => match e {
                PublishError::ModelNotFound { .. } | PublishError::NotPublished { .. } => {
                    StatusCode::NOT_FOUND
                }
                PublishError::ModelNotReady { .. } | PublishError::AlreadyPublished { .. } => {
                    StatusCode::CONFLICT
                }
                PublishError::InvalidTenant { .. } | PublishError::ValidationFailed { .. } => {
                    StatusCode::BAD_REQUEST
                }
                PublishError::Unauthorized => StatusCode::UNAUTHORIZED,
                PublishError::GatewayConfigFailed { .. }
                | PublishError::RateLimitConfigFailed { .. }
                | PublishError::ApiKeyGenerationFailed { .. }
                | PublishError::MetadataStorageFailed { .. }
                | PublishError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "no_violations")]
    violations: &'a [Violation],
}

fn no_violations(violations: &&[Violation]) -> bool {
    violations.is_empty()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "request failed");
        }

        let violations = match &self {
            Error::Publish(e) => e.violations(),
            _ => &[],
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
                violations,
            },
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_errors_map_to_status() {
        let cases = [
            (PublishError::not_published("a", "m"), StatusCode::NOT_FOUND),
            (
                PublishError::AlreadyPublished {
                    namespace: "a".into(),
                    model: "m".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                PublishError::ValidationFailed { violations: vec![] },
                StatusCode::BAD_REQUEST,
            ),
            (PublishError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                PublishError::RateLimitConfigFailed {
                    source: gatehouse_common::Error::internal("x"),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(Error::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn body_carries_code_and_violations() {
        let err = Error::from(PublishError::ValidationFailed {
            violations: vec![Violation::new("externalPath", "must begin with '/'")],
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "VALIDATION_FAILED");
        assert_eq!(json["error"]["violations"][0]["field"], "externalPath");
    }
}
