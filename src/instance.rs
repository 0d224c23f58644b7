//! Per-task materialization of a [`crate::definition::CheckpointDefinition`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::definition::DefinitionId;
use crate::field_schema::FieldSchema;

/// Opaque identity for a [`CheckpointInstance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque task identifier minted by the external session layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle state of a [`CheckpointInstance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Pending,
    Offered,
    Active,
    Submitted,
    Skipped,
    Failed,
    TimedOut,
    Collapsed,
}

impl InstanceState {
    /// Terminal states: no further transitions are permitted.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InstanceState::Submitted | InstanceState::Skipped | InstanceState::Collapsed
        )
    }

    /// `failed`/`timed_out` are retry-eligible states; they are not terminal
    /// by themselves, but may become progress-terminal once the retry budget
    /// is exhausted (see [`CheckpointInstance::is_progress_terminal`]).
    pub fn is_retry_eligible(self) -> bool {
        matches!(self, InstanceState::Failed | InstanceState::TimedOut)
    }
}

/// Per-task execution record for a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointInstance {
    pub id: InstanceId,
    pub task_id: TaskId,
    pub definition_id: DefinitionId,
    pub control_type: String,
    /// Frozen copy of the definition's field schema at creation time.
    pub field_schema: FieldSchema,
    pub state: InstanceState,
    /// Context handed to the checkpoint by the orchestrator (e.g. candidate
    /// passage ids, the generated summary draft).
    pub payload: Value,
    /// Validated user data, present iff `state` is `submitted` or `collapsed`.
    pub submit_result: Option<BTreeMap<String, Value>>,
    pub attempt_count: u32,
    pub max_retries: u32,
    pub required: bool,
    pub last_error: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub offered_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CheckpointInstance {
    /// A `failed`/`timed_out` instance whose retry budget is exhausted:
    /// blocking for `required` definitions, "giveable-up" for optional ones.
    pub fn is_progress_terminal(&self) -> bool {
        self.state.is_retry_eligible() && self.attempt_count >= self.max_retries
    }

    pub fn new_pending(
        task_id: TaskId,
        definition: &crate::definition::CheckpointDefinition,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InstanceId::new(),
            task_id,
            definition_id: definition.id,
            control_type: definition.control_type.clone(),
            field_schema: definition.field_schema.clone(),
            state: InstanceState::Pending,
            payload,
            submit_result: None,
            attempt_count: 0,
            max_retries: definition.policy.max_retries,
            required: definition.policy.required,
            last_error: None,
            failed_at: None,
            offered_at: None,
            submitted_at: None,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_terminal_requires_retry_eligible_state_and_exhausted_budget() {
        let mut instance = sample_instance();
        instance.state = InstanceState::Failed;
        instance.max_retries = 2;
        instance.attempt_count = 1;
        assert!(!instance.is_progress_terminal());
        instance.attempt_count = 2;
        assert!(instance.is_progress_terminal());
    }

    #[test]
    fn submitted_state_is_never_progress_terminal() {
        let mut instance = sample_instance();
        instance.state = InstanceState::Submitted;
        instance.attempt_count = 99;
        instance.max_retries = 1;
        assert!(!instance.is_progress_terminal());
    }

    fn sample_instance() -> CheckpointInstance {
        CheckpointInstance {
            id: InstanceId::new(),
            task_id: TaskId::from("t1"),
            definition_id: DefinitionId::new(),
            control_type: "chunk_selector".into(),
            field_schema: FieldSchema::default(),
            state: InstanceState::Offered,
            payload: Value::Null,
            submit_result: None,
            attempt_count: 0,
            max_retries: 2,
            required: true,
            last_error: None,
            failed_at: None,
            offered_at: None,
            submitted_at: None,
            created_at: Utc::now(),
        }
    }
}
