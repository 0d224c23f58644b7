//! The single `IntoResponse` boundary: every component-local error enum maps
//! to a status code here, and nowhere else.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use crate::error::{LifecycleError, StoreError};
use crate::field_schema::SchemaIssue;
use crate::validator::ValidationIssue;

pub struct ApiError {
    status: StatusCode,
    body: serde_json::Value,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DefinitionNotFound(_) | StoreError::InstanceNotFound(_) => ApiError {
                status: StatusCode::NOT_FOUND,
                body: json!({ "message": err.to_string() }),
            },
            StoreError::DuplicateControlType(_) => ApiError {
                status: StatusCode::CONFLICT,
                body: json!({ "message": err.to_string() }),
            },
            StoreError::InvalidFieldSchema(ref issues) => ApiError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: serde_json::to_value(SchemaIssuesBody {
                    message: "field_schema is malformed",
                    issues,
                })
                .unwrap_or_else(|_| json!({ "message": "field_schema is malformed" })),
            },
            StoreError::Backend(_) | StoreError::Serde(_) => {
                tracing::error!(error = %err, "unexpected store error");
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: json!({ "message": "internal error" }),
                }
            }
        }
    }
}

#[derive(Serialize)]
struct SchemaIssuesBody<'a> {
    message: &'static str,
    issues: &'a [SchemaIssue],
}

#[derive(Serialize)]
struct ValidationFailureBody<'a> {
    message: &'static str,
    issues: &'a [ValidationIssue],
    attempt_count: u32,
    max_retries: u32,
    retry_available: bool,
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::AlreadyFinalized => ApiError {
                status: StatusCode::CONFLICT,
                body: json!({ "message": err.to_string() }),
            },
            LifecycleError::SkipNotAllowed => ApiError {
                status: StatusCode::CONFLICT,
                body: json!({ "message": err.to_string() }),
            },
            LifecycleError::RetryNotAllowed => ApiError {
                status: StatusCode::CONFLICT,
                body: json!({ "message": err.to_string() }),
            },
            LifecycleError::RetryExhausted {
                attempt_count,
                max_retries,
            } => ApiError {
                status: StatusCode::CONFLICT,
                body: json!({
                    "message": "retry budget exhausted",
                    "attempt_count": attempt_count,
                    "max_retries": max_retries,
                }),
            },
            LifecycleError::ValidationFailure {
                issues,
                attempt_count,
                max_retries,
            } => {
                let retry_available = attempt_count < max_retries;
                ApiError {
                    status: StatusCode::UNPROCESSABLE_ENTITY,
                    body: serde_json::to_value(ValidationFailureBody {
                        message: "submission failed validation",
                        issues: &issues,
                        attempt_count,
                        max_retries,
                        retry_available,
                    })
                    .unwrap_or_else(|_| json!({ "message": "submission failed validation" })),
                }
            }
            LifecycleError::Store(store_err) => ApiError::from(store_err),
        }
    }
}
