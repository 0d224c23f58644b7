//! Picks (and lazily creates) the checkpoint instances a task should be
//! offered at a given pipeline position.

use serde_json::Value;

use crate::definition::{CheckpointDefinition, PipelinePosition, TaskMode};
use crate::error::LifecycleResult;
use crate::failure_tracker;
use crate::instance::{CheckpointInstance, TaskId};
use crate::store::{DefinitionStore, InstanceStore};

pub struct Resolver<'a> {
    definitions: &'a dyn DefinitionStore,
    instances: &'a dyn InstanceStore,
}

impl<'a> Resolver<'a> {
    pub fn new(definitions: &'a dyn DefinitionStore, instances: &'a dyn InstanceStore) -> Self {
        Self {
            definitions,
            instances,
        }
    }

    /// Definitions applicable to `mode` at `position`: enabled, mode-matched,
    /// not circuit-tripped, ordered by `(sort_order, created_at)`.
    #[tracing::instrument(skip(self), fields(position = ?position, mode = mode.as_str()))]
    async fn applicable_definitions(
        &self,
        position: PipelinePosition,
        mode: &TaskMode,
    ) -> LifecycleResult<Vec<CheckpointDefinition>> {
        let mut candidates = self
            .definitions
            .list_enabled_at_position(position)
            .await?
            .into_iter()
            .filter(|d| d.applicable_modes.matches(mode))
            .collect::<Vec<_>>();
        candidates.sort_by_key(|d| (d.sort_order, d.created_at));

        let mut result = Vec::with_capacity(candidates.len());
        for definition in candidates {
            if !failure_tracker::is_tripped(self.instances, &definition).await? {
                result.push(definition);
            }
        }
        Ok(result)
    }

    /// Resolve (creating if needed) every checkpoint instance a task should
    /// see at `position`, in definition order. Creation is idempotent: a
    /// second call for the same `(task_id, definition_id)` returns the
    /// existing instance rather than minting a duplicate.
    #[tracing::instrument(skip(self, payload), fields(task_id = %task_id, position = ?position, mode = mode.as_str()))]
    pub async fn resolve(
        &self,
        task_id: &TaskId,
        position: PipelinePosition,
        mode: &TaskMode,
        payload: Value,
    ) -> LifecycleResult<Vec<CheckpointInstance>> {
        let definitions = self.applicable_definitions(position, mode).await?;
        let mut instances = Vec::with_capacity(definitions.len());
        for definition in &definitions {
            let instance = match self.instances.find(task_id, definition.id).await? {
                Some(existing) => existing,
                None => {
                    self.instances
                        .create(task_id.clone(), definition, payload.clone())
                        .await?
                }
            };
            instances.push(instance);
        }
        Ok(instances)
    }

    /// Whether any non-terminal (not `is_terminal` and not progress-terminal)
    /// required instance remains at `position` for this task — the signal
    /// the orchestrator polls to decide whether it can proceed.
    #[tracing::instrument(skip(self), fields(task_id = %task_id, position = ?position))]
    pub async fn has_pending(
        &self,
        task_id: &TaskId,
        position: PipelinePosition,
    ) -> LifecycleResult<bool> {
        let instances = self.instances.list_for_task(task_id, Some(position)).await?;
        let definitions = self.definitions.list(true).await?;
        let at_position: std::collections::HashSet<_> = definitions
            .iter()
            .filter(|d| d.pipeline_position == position)
            .map(|d| d.id)
            .collect();

        Ok(instances.iter().any(|i| {
            at_position.contains(&i.definition_id)
                && i.required
                && !i.state.is_terminal()
                && !i.is_progress_terminal()
        }))
    }
}
