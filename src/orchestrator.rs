//! Read-mostly facade the chat pipeline calls into: resolve the checkpoints
//! for a position, fetch one by id, and ask whether a position is still
//! blocked on a required checkpoint.

use serde_json::Value;

use crate::definition::{PipelinePosition, TaskMode};
use crate::error::LifecycleResult;
use crate::instance::{CheckpointInstance, InstanceId, TaskId};
use crate::resolver::Resolver;
use crate::store::{DefinitionStore, InstanceStore};

/// Thin wrapper around [`Resolver`] that is the only surface the orchestrator
/// (the chat pipeline driving retrieval and generation) is expected to call.
/// It never mutates instance state directly — submit/skip/retry/timeout go
/// through [`crate::lifecycle::LifecycleController`] from the HTTP layer.
pub struct OrchestratorAdapter<'a> {
    resolver: Resolver<'a>,
    instances: &'a dyn InstanceStore,
}

impl<'a> OrchestratorAdapter<'a> {
    pub fn new(definitions: &'a dyn DefinitionStore, instances: &'a dyn InstanceStore) -> Self {
        Self {
            resolver: Resolver::new(definitions, instances),
            instances,
        }
    }

    pub async fn resolve(
        &self,
        task_id: &TaskId,
        position: PipelinePosition,
        mode: &TaskMode,
        payload: Value,
    ) -> LifecycleResult<Vec<CheckpointInstance>> {
        self.resolver.resolve(task_id, position, mode, payload).await
    }

    pub async fn get(&self, instance_id: InstanceId) -> LifecycleResult<CheckpointInstance> {
        Ok(self.instances.get(instance_id).await?)
    }

    /// Whether the orchestrator must still wait before advancing past `position`.
    pub async fn is_blocked(
        &self,
        task_id: &TaskId,
        position: PipelinePosition,
    ) -> LifecycleResult<bool> {
        self.resolver.has_pending(task_id, position).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{DefinitionPolicy, ModeSet, NewDefinition};
    use crate::field_schema::FieldSchema;
    use crate::store::{InMemoryDefinitionStore, InMemoryInstanceStore};

    #[tokio::test]
    async fn resolve_then_is_blocked_reflects_required_pending_instance() {
        let defs = InMemoryDefinitionStore::new();
        let insts = InMemoryInstanceStore::new();
        defs.create(NewDefinition {
            control_type: "chunk_selector".to_string(),
            label: "Chunk Selector".to_string(),
            description: String::new(),
            field_schema: FieldSchema::default(),
            pipeline_position: PipelinePosition::AfterRetrieval,
            sort_order: 0,
            applicable_modes: ModeSet(vec!["*".to_string()]),
            policy: DefinitionPolicy {
                required: true,
                timeout_seconds: None,
                max_retries: 1,
                circuit_breaker_threshold: 3,
                circuit_breaker_window_minutes: 60,
            },
            enabled: true,
        })
        .await
        .unwrap();

        let adapter = OrchestratorAdapter::new(&defs, &insts);
        let task = TaskId::from("t1");
        adapter
            .resolve(
                &task,
                PipelinePosition::AfterRetrieval,
                &TaskMode::Baseline,
                Value::Null,
            )
            .await
            .unwrap();
        assert!(
            adapter
                .is_blocked(&task, PipelinePosition::AfterRetrieval)
                .await
                .unwrap()
        );
    }
}
