//! Instance Store: per-task checkpoint instances, idempotent by `(task_id, definition_id)`.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::definition::{CheckpointDefinition, DefinitionId, PipelinePosition};
use crate::error::{StoreError, StoreResult};
use crate::instance::{CheckpointInstance, InstanceId, InstanceState, TaskId};

/// A partial update applied by [`InstanceStore::transition`]. Only the target
/// state is mandatory; the rest mirror the fields a given transition touches.
#[derive(Debug, Clone, Default)]
pub struct InstancePatch {
    pub attempt_count: Option<u32>,
    pub last_error: Option<Option<String>>,
    pub submit_result: Option<Option<BTreeMap<String, Value>>>,
    pub failed_at: Option<Option<DateTime<Utc>>>,
    pub offered_at: Option<Option<DateTime<Utc>>>,
    pub submitted_at: Option<Option<DateTime<Utc>>>,
}

#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn find(
        &self,
        task_id: &TaskId,
        definition_id: DefinitionId,
    ) -> StoreResult<Option<CheckpointInstance>>;

    async fn get(&self, instance_id: InstanceId) -> StoreResult<CheckpointInstance>;

    /// Idempotent under `(task_id, definition_id)` uniqueness: if a row
    /// already exists for the pair, it is returned unchanged instead of
    /// creating a second row.
    async fn create(
        &self,
        task_id: TaskId,
        definition: &CheckpointDefinition,
        payload: Value,
    ) -> StoreResult<CheckpointInstance>;

    async fn transition(
        &self,
        instance_id: InstanceId,
        new_state: InstanceState,
        patch: InstancePatch,
    ) -> StoreResult<CheckpointInstance>;

    async fn list_for_task(
        &self,
        task_id: &TaskId,
        position: Option<PipelinePosition>,
    ) -> StoreResult<Vec<CheckpointInstance>>;

    /// Instances that transitioned to `failed`/`timed_out` as a
    /// progress-terminal event (`attempt_count >= max_retries`) for a
    /// definition, with `failed_at >= since`. Backs the Failure Tracker.
    async fn count_terminal_failures_since(
        &self,
        definition_id: DefinitionId,
        since: DateTime<Utc>,
    ) -> StoreResult<u32>;
}

#[derive(Default)]
pub struct InMemoryInstanceStore {
    by_id: RwLock<HashMap<InstanceId, CheckpointInstance>>,
}

impl InMemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstanceStore for InMemoryInstanceStore {
    async fn find(
        &self,
        task_id: &TaskId,
        definition_id: DefinitionId,
    ) -> StoreResult<Option<CheckpointInstance>> {
        let map = self.by_id.read().expect("lock poisoned");
        Ok(map
            .values()
            .find(|i| &i.task_id == task_id && i.definition_id == definition_id)
            .cloned())
    }

    async fn get(&self, instance_id: InstanceId) -> StoreResult<CheckpointInstance> {
        let map = self.by_id.read().expect("lock poisoned");
        map.get(&instance_id)
            .cloned()
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))
    }

    #[tracing::instrument(skip(self, definition, payload), fields(task_id = %task_id, definition_id = %definition.id))]
    async fn create(
        &self,
        task_id: TaskId,
        definition: &CheckpointDefinition,
        payload: Value,
    ) -> StoreResult<CheckpointInstance> {
        let mut map = self.by_id.write().expect("lock poisoned");
        if let Some(existing) = map
            .values()
            .find(|i| i.task_id == task_id && i.definition_id == definition.id)
        {
            // The uniqueness constraint means a concurrent creator already won;
            // the loser observes the winner's row rather than erroring.
            return Ok(existing.clone());
        }
        let instance = CheckpointInstance::new_pending(task_id, definition, payload, Utc::now());
        map.insert(instance.id, instance.clone());
        Ok(instance)
    }

    #[tracing::instrument(skip(self, patch), fields(instance_id = %instance_id, new_state = ?new_state))]
    async fn transition(
        &self,
        instance_id: InstanceId,
        new_state: InstanceState,
        patch: InstancePatch,
    ) -> StoreResult<CheckpointInstance> {
        let mut map = self.by_id.write().expect("lock poisoned");
        let instance = map
            .get_mut(&instance_id)
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))?;
        instance.state = new_state;
        if let Some(v) = patch.attempt_count {
            instance.attempt_count = v;
        }
        if let Some(v) = patch.last_error {
            instance.last_error = v;
        }
        if let Some(v) = patch.submit_result {
            instance.submit_result = v;
        }
        if let Some(v) = patch.failed_at {
            instance.failed_at = v;
        }
        if let Some(v) = patch.offered_at {
            instance.offered_at = v;
        }
        if let Some(v) = patch.submitted_at {
            instance.submitted_at = v;
        }
        Ok(instance.clone())
    }

    async fn list_for_task(
        &self,
        task_id: &TaskId,
        position: Option<PipelinePosition>,
    ) -> StoreResult<Vec<CheckpointInstance>> {
        let map = self.by_id.read().expect("lock poisoned");
        let _ = position; // position filtering requires definition lookup; done by the resolver/orchestrator.
        Ok(map
            .values()
            .filter(|i| &i.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn count_terminal_failures_since(
        &self,
        definition_id: DefinitionId,
        since: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let map = self.by_id.read().expect("lock poisoned");
        let count = map
            .values()
            .filter(|i| {
                i.definition_id == definition_id
                    && i.is_progress_terminal()
                    && i.failed_at.is_some_and(|t| t >= since)
            })
            .count();
        Ok(count as u32)
    }
}
