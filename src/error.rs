//! Crate-wide error taxonomy.
//!
//! Each component that can fail owns a `thiserror`-derived enum with
//! `miette::Diagnostic` for structured codes and operator-facing help text,
//! following the same shape the storage layer uses for its own backend
//! errors. Only the HTTP layer's `ApiError` (see [`crate::http::error`])
//! maps these to status codes; component-local errors never encode a status
//! themselves.

use miette::Diagnostic;
use thiserror::Error;

/// Errors from the definition and instance stores.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("definition not found: {0}")]
    #[diagnostic(
        code(checkpoint_engine::store::definition_not_found),
        help("Check the definition id; it may have been created in a different database.")
    )]
    DefinitionNotFound(String),

    #[error("instance not found: {0}")]
    #[diagnostic(code(checkpoint_engine::store::instance_not_found))]
    InstanceNotFound(String),

    #[error("control_type already exists: {0}")]
    #[diagnostic(
        code(checkpoint_engine::store::duplicate_control_type),
        help("control_type is globally unique; choose a different slug or update the existing definition.")
    )]
    DuplicateControlType(String),

    #[error("field_schema is malformed")]
    #[diagnostic(
        code(checkpoint_engine::store::invalid_field_schema),
        help("Fix the listed fields: select/radio fields need options, keys must be unique, and min must not exceed max.")
    )]
    InvalidFieldSchema(Vec<crate::field_schema::SchemaIssue>),

    #[error("backend error: {0}")]
    #[diagnostic(code(checkpoint_engine::store::backend))]
    Backend(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    #[diagnostic(code(checkpoint_engine::store::serde))]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors from the Lifecycle Controller's submit/skip/retry/timeout operations.
#[derive(Debug, Error, Diagnostic)]
pub enum LifecycleError {
    #[error("checkpoint is already finalized")]
    #[diagnostic(
        code(checkpoint_engine::lifecycle::already_finalized),
        help("Terminal states (submitted, skipped, collapsed) accept no further transitions.")
    )]
    AlreadyFinalized,

    #[error("retry budget exhausted: {attempt_count}/{max_retries} attempts used")]
    #[diagnostic(
        code(checkpoint_engine::lifecycle::retry_exhausted),
        help("Call retry first; if the definition is optional the orchestrator may skip it instead.")
    )]
    RetryExhausted {
        attempt_count: u32,
        max_retries: u32,
    },

    #[error("skip is not allowed on a required checkpoint")]
    #[diagnostic(code(checkpoint_engine::lifecycle::skip_not_allowed))]
    SkipNotAllowed,

    #[error("retry is only valid from failed or timed_out")]
    #[diagnostic(code(checkpoint_engine::lifecycle::retry_not_allowed))]
    RetryNotAllowed,

    #[error("submission failed validation")]
    #[diagnostic(code(checkpoint_engine::lifecycle::validation_failure))]
    ValidationFailure {
        issues: Vec<crate::validator::ValidationIssue>,
        attempt_count: u32,
        max_retries: u32,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;
