//! Definition Store: CRUD, toggle, and soft-delete for [`CheckpointDefinition`]s.
//!
//! Defined as an `async_trait` seam with two implementations — an in-memory
//! map for tests and ephemeral runs, and a SQLite-backed store for durable
//! runs — so callers above this seam never branch on backend.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::definition::{CheckpointDefinition, DefinitionId, DefinitionUpdate, NewDefinition, PipelinePosition};
use crate::error::{StoreError, StoreResult};

#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn create(&self, new_definition: NewDefinition) -> StoreResult<CheckpointDefinition>;

    async fn update(
        &self,
        id: DefinitionId,
        update: DefinitionUpdate,
    ) -> StoreResult<CheckpointDefinition>;

    /// Flip `enabled`. `soft_delete` is `toggle(id, false)`.
    async fn toggle(&self, id: DefinitionId, enabled: bool) -> StoreResult<CheckpointDefinition>;

    async fn get_by_id(&self, id: DefinitionId) -> StoreResult<CheckpointDefinition>;

    async fn get_by_control_type(&self, control_type: &str) -> StoreResult<Option<CheckpointDefinition>>;

    /// Ordered by `(pipeline_position, sort_order, created_at)`.
    async fn list(&self, include_disabled: bool) -> StoreResult<Vec<CheckpointDefinition>>;

    /// Definitions applicable at a pipeline position, enabled, unordered.
    /// The resolver is responsible for sorting and mode/circuit filtering.
    async fn list_enabled_at_position(
        &self,
        position: PipelinePosition,
    ) -> StoreResult<Vec<CheckpointDefinition>>;
}

fn sort_key(def: &CheckpointDefinition) -> (u8, i64, chrono::DateTime<Utc>) {
    let position_rank = match def.pipeline_position {
        PipelinePosition::AfterRetrieval => 0,
        PipelinePosition::AfterGeneration => 1,
        PipelinePosition::PostGeneration => 2,
    };
    (position_rank, def.sort_order, def.created_at)
}

/// In-process, `RwLock`-guarded definition store.
#[derive(Default)]
pub struct InMemoryDefinitionStore {
    inner: RwLock<HashMap<DefinitionId, CheckpointDefinition>>,
}

impl InMemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DefinitionStore for InMemoryDefinitionStore {
    #[tracing::instrument(skip(self, new_definition), fields(control_type = %new_definition.control_type))]
    async fn create(&self, new_definition: NewDefinition) -> StoreResult<CheckpointDefinition> {
        new_definition
            .field_schema
            .check_well_formed()
            .map_err(StoreError::InvalidFieldSchema)?;
        let mut map = self.inner.write().expect("lock poisoned");
        if map
            .values()
            .any(|d| d.control_type == new_definition.control_type)
        {
            return Err(StoreError::DuplicateControlType(
                new_definition.control_type.clone(),
            ));
        }
        let definition = new_definition.into_definition(Utc::now());
        map.insert(definition.id, definition.clone());
        Ok(definition)
    }

    #[tracing::instrument(skip(self, update))]
    async fn update(
        &self,
        id: DefinitionId,
        update: DefinitionUpdate,
    ) -> StoreResult<CheckpointDefinition> {
        let mut map = self.inner.write().expect("lock poisoned");
        let existing = map
            .get(&id)
            .ok_or_else(|| StoreError::DefinitionNotFound(id.to_string()))?;
        let mut candidate = existing.clone();
        candidate.apply_update(update, Utc::now());
        candidate
            .field_schema
            .check_well_formed()
            .map_err(StoreError::InvalidFieldSchema)?;
        map.insert(id, candidate.clone());
        Ok(candidate)
    }

    #[tracing::instrument(skip(self))]
    async fn toggle(&self, id: DefinitionId, enabled: bool) -> StoreResult<CheckpointDefinition> {
        let mut map = self.inner.write().expect("lock poisoned");
        let definition = map
            .get_mut(&id)
            .ok_or_else(|| StoreError::DefinitionNotFound(id.to_string()))?;
        definition.enabled = enabled;
        definition.updated_at = Utc::now();
        Ok(definition.clone())
    }

    async fn get_by_id(&self, id: DefinitionId) -> StoreResult<CheckpointDefinition> {
        let map = self.inner.read().expect("lock poisoned");
        map.get(&id)
            .cloned()
            .ok_or_else(|| StoreError::DefinitionNotFound(id.to_string()))
    }

    async fn get_by_control_type(
        &self,
        control_type: &str,
    ) -> StoreResult<Option<CheckpointDefinition>> {
        let map = self.inner.read().expect("lock poisoned");
        Ok(map.values().find(|d| d.control_type == control_type).cloned())
    }

    async fn list(&self, include_disabled: bool) -> StoreResult<Vec<CheckpointDefinition>> {
        let map = self.inner.read().expect("lock poisoned");
        let mut defs: Vec<CheckpointDefinition> = map
            .values()
            .filter(|d| include_disabled || d.enabled)
            .cloned()
            .collect();
        defs.sort_by_key(sort_key);
        Ok(defs)
    }

    async fn list_enabled_at_position(
        &self,
        position: PipelinePosition,
    ) -> StoreResult<Vec<CheckpointDefinition>> {
        let map = self.inner.read().expect("lock poisoned");
        Ok(map
            .values()
            .filter(|d| d.enabled && d.pipeline_position == position)
            .cloned()
            .collect())
    }
}
