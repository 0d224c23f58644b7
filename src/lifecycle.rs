//! Submit/skip/retry/timeout/fail transitions for a single [`CheckpointInstance`].

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value;

use crate::error::{LifecycleError, LifecycleResult};
use crate::failure_tracker;
use crate::instance::{CheckpointInstance, InstanceId, InstanceState};
use crate::store::{DefinitionStore, InstancePatch, InstanceStore};
use crate::validator;

pub struct LifecycleController<'a> {
    definitions: &'a dyn DefinitionStore,
    instances: &'a dyn InstanceStore,
}

impl<'a> LifecycleController<'a> {
    pub fn new(definitions: &'a dyn DefinitionStore, instances: &'a dyn InstanceStore) -> Self {
        Self {
            definitions,
            instances,
        }
    }

    /// Re-check the breaker for the instance's definition and force-disable
    /// it if the failure just recorded pushed it over threshold.
    async fn record_breaker_failure(&self, instance: &CheckpointInstance) -> LifecycleResult<()> {
        let definition = self.definitions.get_by_id(instance.definition_id).await?;
        failure_tracker::record_terminal_failure(self.definitions, self.instances, &definition)
            .await?;
        Ok(())
    }

    fn ensure_not_finalized(instance: &CheckpointInstance) -> LifecycleResult<()> {
        if instance.state.is_terminal() {
            return Err(LifecycleError::AlreadyFinalized);
        }
        Ok(())
    }

    /// Validate `submission` against the instance's frozen field schema and
    /// either finalize it as `submitted` or reject with a
    /// [`LifecycleError::ValidationFailure`]. A validation rejection never
    /// advances `attempt_count`: the user has not spent a retry, only
    /// produced malformed input.
    #[tracing::instrument(skip(self, submission), fields(instance_id = %instance_id))]
    pub async fn submit(
        &self,
        instance_id: InstanceId,
        submission: BTreeMap<String, Value>,
    ) -> LifecycleResult<CheckpointInstance> {
        let instance = self.instances.get(instance_id).await?;
        Self::ensure_not_finalized(&instance)?;
        if instance.state.is_retry_eligible() && instance.attempt_count >= instance.max_retries {
            return Err(LifecycleError::RetryExhausted {
                attempt_count: instance.attempt_count,
                max_retries: instance.max_retries,
            });
        }

        match validator::validate(&instance.field_schema, &submission) {
            Ok(normalized) => Ok(self
                .instances
                .transition(
                    instance_id,
                    InstanceState::Submitted,
                    InstancePatch {
                        submit_result: Some(Some(normalized)),
                        submitted_at: Some(Some(Utc::now())),
                        ..Default::default()
                    },
                )
                .await?),
            Err(issues) => {
                let summary = issues
                    .iter()
                    .map(|i| format!("{}: {}", i.key, i.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                // Validation is a user error: state moves to `failed` so the UI can
                // surface it, but attempt_count is untouched — only counted failures
                // (fail/timeout) spend retry budget.
                self.instances
                    .transition(
                        instance_id,
                        InstanceState::Failed,
                        InstancePatch {
                            last_error: Some(Some(summary)),
                            ..Default::default()
                        },
                    )
                    .await?;
                Err(LifecycleError::ValidationFailure {
                    issues,
                    attempt_count: instance.attempt_count,
                    max_retries: instance.max_retries,
                })
            }
        }
    }

    /// Skip an optional instance. Required instances cannot be skipped.
    #[tracing::instrument(skip(self), fields(instance_id = %instance_id))]
    pub async fn skip(&self, instance_id: InstanceId) -> LifecycleResult<CheckpointInstance> {
        let instance = self.instances.get(instance_id).await?;
        Self::ensure_not_finalized(&instance)?;
        if instance.required {
            return Err(LifecycleError::SkipNotAllowed);
        }
        Ok(self
            .instances
            .transition(instance_id, InstanceState::Skipped, InstancePatch::default())
            .await?)
    }

    /// Re-offer a `failed`/`timed_out` instance. Clears `last_error` and
    /// returns to `offered`; does not change `attempt_count` — the failure
    /// that led here already counted it. Errors if the budget is already
    /// exhausted or the instance is not in a retry-eligible state.
    #[tracing::instrument(skip(self), fields(instance_id = %instance_id))]
    pub async fn retry(&self, instance_id: InstanceId) -> LifecycleResult<CheckpointInstance> {
        let instance = self.instances.get(instance_id).await?;
        if !instance.state.is_retry_eligible() {
            return Err(LifecycleError::RetryNotAllowed);
        }
        if instance.attempt_count >= instance.max_retries {
            return Err(LifecycleError::RetryExhausted {
                attempt_count: instance.attempt_count,
                max_retries: instance.max_retries,
            });
        }
        Ok(self
            .instances
            .transition(
                instance_id,
                InstanceState::Offered,
                InstancePatch {
                    last_error: Some(None),
                    offered_at: Some(Some(Utc::now())),
                    ..Default::default()
                },
            )
            .await?)
    }

    /// Mark an instance as timed out, incrementing `attempt_count`. Idempotent:
    /// calling this on an instance that is already `timed_out` is a no-op and
    /// does not double-increment anything.
    #[tracing::instrument(skip(self), fields(instance_id = %instance_id))]
    pub async fn timeout(&self, instance_id: InstanceId) -> LifecycleResult<CheckpointInstance> {
        let instance = self.instances.get(instance_id).await?;
        if instance.state == InstanceState::TimedOut {
            return Ok(instance);
        }
        Self::ensure_not_finalized(&instance)?;
        let updated = self
            .instances
            .transition(
                instance_id,
                InstanceState::TimedOut,
                InstancePatch {
                    attempt_count: Some(instance.attempt_count + 1),
                    failed_at: Some(Some(Utc::now())),
                    last_error: Some(Some("timed out waiting for submission".to_string())),
                    ..Default::default()
                },
            )
            .await?;
        if updated.is_progress_terminal() {
            self.record_breaker_failure(&updated).await?;
        }
        Ok(updated)
    }

    /// Mark an instance as failed with an operator-supplied reason (e.g. the
    /// orchestrator observed a downstream error unrelated to validation),
    /// incrementing `attempt_count`.
    #[tracing::instrument(skip(self, reason), fields(instance_id = %instance_id))]
    pub async fn fail(
        &self,
        instance_id: InstanceId,
        reason: String,
    ) -> LifecycleResult<CheckpointInstance> {
        let instance = self.instances.get(instance_id).await?;
        Self::ensure_not_finalized(&instance)?;
        let updated = self
            .instances
            .transition(
                instance_id,
                InstanceState::Failed,
                InstancePatch {
                    attempt_count: Some(instance.attempt_count + 1),
                    failed_at: Some(Some(Utc::now())),
                    last_error: Some(Some(reason)),
                    ..Default::default()
                },
            )
            .await?;
        if updated.is_progress_terminal() {
            self.record_breaker_failure(&updated).await?;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{CheckpointDefinition, DefinitionPolicy, ModeSet, NewDefinition, PipelinePosition};
    use crate::field_schema::{FieldDescriptor, FieldSchema, FieldType};
    use crate::instance::TaskId;
    use crate::store::{InMemoryDefinitionStore, InMemoryInstanceStore};

    async fn definition(
        defs: &InMemoryDefinitionStore,
        max_retries: u32,
        required: bool,
    ) -> CheckpointDefinition {
        defs.create(NewDefinition {
            control_type: "summary_editor".into(),
            label: "Summary Editor".into(),
            description: String::new(),
            field_schema: FieldSchema::new(vec![FieldDescriptor {
                key: "edited_text".into(),
                field_type: FieldType::Textarea,
                label: "Edited text".into(),
                required: true,
                placeholder: None,
                options: None,
                min: None,
                max: None,
                default: None,
            }]),
            pipeline_position: PipelinePosition::AfterGeneration,
            sort_order: 0,
            applicable_modes: ModeSet(vec!["*".into()]),
            policy: DefinitionPolicy {
                required,
                timeout_seconds: None,
                max_retries,
                circuit_breaker_threshold: 3,
                circuit_breaker_window_minutes: 60,
            },
            enabled: true,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn submit_valid_data_finalizes_instance() {
        let defs = InMemoryDefinitionStore::new();
        let store = InMemoryInstanceStore::new();
        let def = definition(&defs, 1, true).await;
        let instance = store
            .create(TaskId::from("t1"), &def, Value::Null)
            .await
            .unwrap();
        let controller = LifecycleController::new(&defs, &store);
        let mut submission = BTreeMap::new();
        submission.insert("edited_text".to_string(), Value::String("hello".into()));
        let updated = controller.submit(instance.id, submission).await.unwrap();
        assert_eq!(updated.state, InstanceState::Submitted);
        assert!(updated.submit_result.is_some());
    }

    #[tokio::test]
    async fn submit_invalid_data_does_not_consume_retry_budget() {
        let defs = InMemoryDefinitionStore::new();
        let store = InMemoryInstanceStore::new();
        let def = definition(&defs, 2, true).await;
        let instance = store
            .create(TaskId::from("t1"), &def, Value::Null)
            .await
            .unwrap();
        let controller = LifecycleController::new(&defs, &store);
        let err = controller
            .submit(instance.id, BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::ValidationFailure { .. }));
        let reloaded = store.get(instance.id).await.unwrap();
        assert_eq!(reloaded.attempt_count, 0);
        assert_eq!(reloaded.state, InstanceState::Failed);

        // resubmitting corrected data needs no explicit `retry` call first.
        let mut submission = BTreeMap::new();
        submission.insert("edited_text".to_string(), Value::String("fixed".into()));
        let resubmitted = controller.submit(instance.id, submission).await.unwrap();
        assert_eq!(resubmitted.state, InstanceState::Submitted);
        assert_eq!(resubmitted.attempt_count, 0);
    }

    #[tokio::test]
    async fn skip_rejects_required_instances() {
        let defs = InMemoryDefinitionStore::new();
        let store = InMemoryInstanceStore::new();
        let def = definition(&defs, 1, true).await;
        let instance = store
            .create(TaskId::from("t1"), &def, Value::Null)
            .await
            .unwrap();
        let controller = LifecycleController::new(&defs, &store);
        let err = controller.skip(instance.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::SkipNotAllowed));
    }

    #[tokio::test]
    async fn retry_does_not_change_attempt_count_but_fail_does() {
        let defs = InMemoryDefinitionStore::new();
        let store = InMemoryInstanceStore::new();
        let def = definition(&defs, 2, true).await;
        let instance = store
            .create(TaskId::from("t1"), &def, Value::Null)
            .await
            .unwrap();
        let controller = LifecycleController::new(&defs, &store);

        let failed = controller
            .fail(instance.id, "downstream error".to_string())
            .await
            .unwrap();
        assert_eq!(failed.attempt_count, 1);
        assert_eq!(failed.state, InstanceState::Failed);

        let retried = controller.retry(instance.id).await.unwrap();
        assert_eq!(retried.attempt_count, 1);
        assert_eq!(retried.state, InstanceState::Offered);

        let failed_again = controller
            .fail(instance.id, "downstream error".to_string())
            .await
            .unwrap();
        assert_eq!(failed_again.attempt_count, 2);

        let err = controller.retry(instance.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::RetryExhausted { .. }));
    }

    #[tokio::test]
    async fn timeout_increments_attempt_count_once_and_is_idempotent() {
        let defs = InMemoryDefinitionStore::new();
        let store = InMemoryInstanceStore::new();
        let def = definition(&defs, 1, true).await;
        let instance = store
            .create(TaskId::from("t1"), &def, Value::Null)
            .await
            .unwrap();
        let controller = LifecycleController::new(&defs, &store);
        let first = controller.timeout(instance.id).await.unwrap();
        assert_eq!(first.attempt_count, 1);
        let second = controller.timeout(instance.id).await.unwrap();
        assert_eq!(first.failed_at, second.failed_at);
        assert_eq!(second.attempt_count, 1);
    }

    #[tokio::test]
    async fn timeout_past_retry_budget_trips_the_breaker() {
        let defs = InMemoryDefinitionStore::new();
        let store = InMemoryInstanceStore::new();
        let def = definition(&defs, 0, false).await;
        let instance = store
            .create(TaskId::from("t1"), &def, Value::Null)
            .await
            .unwrap();
        let controller = LifecycleController::new(&defs, &store);
        controller.timeout(instance.id).await.unwrap();
        // a single instance past its zero-retry budget is already below the
        // breaker's threshold of 3, so the definition stays enabled here —
        // the circuit-breaker-specific counting is covered in failure_tracker
        // and the end-to-end scenario tests.
        assert!(defs.get_by_id(def.id).await.unwrap().enabled);
    }

    #[tokio::test]
    async fn submit_on_finalized_instance_is_rejected() {
        let defs = InMemoryDefinitionStore::new();
        let store = InMemoryInstanceStore::new();
        let def = definition(&defs, 1, true).await;
        let instance = store
            .create(TaskId::from("t1"), &def, Value::Null)
            .await
            .unwrap();
        store
            .transition(instance.id, InstanceState::Submitted, InstancePatch::default())
            .await
            .unwrap();
        let controller = LifecycleController::new(&defs, &store);
        let err = controller
            .submit(instance.id, BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyFinalized));
    }
}
