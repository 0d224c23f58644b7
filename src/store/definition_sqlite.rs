//! SQLite-backed [`DefinitionStore`], durable sibling of [`super::InMemoryDefinitionStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::definition::{
    CheckpointDefinition, DefinitionId, DefinitionUpdate, ModeSet, NewDefinition, PipelinePosition,
};
use crate::error::{StoreError, StoreResult};
use crate::field_schema::FieldSchema;

use super::definition::DefinitionStore;

/// SQLite-backed definition store. Embedded migrations (`sqlx::migrate!`) are
/// run once at [`crate::config::EngineConfig`] bootstrap, not here; this type
/// assumes the `definitions` table already exists.
pub struct SqliteDefinitionStore {
    pool: SqlitePool,
}

impl SqliteDefinitionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn position_to_str(position: PipelinePosition) -> &'static str {
    match position {
        PipelinePosition::AfterRetrieval => "after_retrieval",
        PipelinePosition::AfterGeneration => "after_generation",
        PipelinePosition::PostGeneration => "post_generation",
    }
}

fn position_from_str(value: &str) -> StoreResult<PipelinePosition> {
    match value {
        "after_retrieval" => Ok(PipelinePosition::AfterRetrieval),
        "after_generation" => Ok(PipelinePosition::AfterGeneration),
        "post_generation" => Ok(PipelinePosition::PostGeneration),
        other => Err(StoreError::Backend(sqlx::Error::Decode(
            format!("unknown pipeline_position: {other}").into(),
        ))),
    }
}

fn row_to_definition(row: &SqliteRow) -> StoreResult<CheckpointDefinition> {
    let id: String = row.try_get("id")?;
    let field_schema_json: String = row.try_get("field_schema_json")?;
    let applicable_modes_json: String = row.try_get("applicable_modes_json")?;
    let policy_json: String = row.try_get("policy_json")?;
    let position: String = row.try_get("pipeline_position")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(CheckpointDefinition {
        id: DefinitionId(
            id.parse()
                .map_err(|_| StoreError::Backend(sqlx::Error::Decode("bad definition id".into())))?,
        ),
        control_type: row.try_get("control_type")?,
        label: row.try_get("label")?,
        description: row.try_get("description")?,
        field_schema: serde_json::from_str::<FieldSchema>(&field_schema_json)?,
        pipeline_position: position_from_str(&position)?,
        sort_order: row.try_get("sort_order")?,
        applicable_modes: serde_json::from_str::<ModeSet>(&applicable_modes_json)?,
        policy: serde_json::from_str(&policy_json)?,
        enabled: row.try_get::<i64, _>("enabled")? != 0,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| StoreError::Backend(sqlx::Error::Decode("bad created_at".into())))?,
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| StoreError::Backend(sqlx::Error::Decode("bad updated_at".into())))?,
    })
}

#[async_trait]
impl DefinitionStore for SqliteDefinitionStore {
    #[tracing::instrument(skip(self, new_definition), fields(control_type = %new_definition.control_type), err)]
    async fn create(&self, new_definition: NewDefinition) -> StoreResult<CheckpointDefinition> {
        new_definition
            .field_schema
            .check_well_formed()
            .map_err(StoreError::InvalidFieldSchema)?;
        let definition = new_definition.into_definition(Utc::now());
        let field_schema_json = serde_json::to_string(&definition.field_schema)?;
        let applicable_modes_json = serde_json::to_string(&definition.applicable_modes)?;
        let policy_json = serde_json::to_string(&definition.policy)?;

        let result = sqlx::query(
            r#"
            INSERT INTO definitions (
                id, control_type, label, description, field_schema_json,
                pipeline_position, sort_order, applicable_modes_json, policy_json,
                enabled, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(definition.id.to_string())
        .bind(&definition.control_type)
        .bind(&definition.label)
        .bind(&definition.description)
        .bind(&field_schema_json)
        .bind(position_to_str(definition.pipeline_position))
        .bind(definition.sort_order)
        .bind(&applicable_modes_json)
        .bind(&policy_json)
        .bind(definition.enabled as i64)
        .bind(definition.created_at.to_rfc3339())
        .bind(definition.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(definition),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                StoreError::DuplicateControlType(definition.control_type.clone()),
            ),
            Err(e) => Err(StoreError::Backend(e)),
        }
    }

    #[tracing::instrument(skip(self, update), err)]
    async fn update(
        &self,
        id: DefinitionId,
        update: DefinitionUpdate,
    ) -> StoreResult<CheckpointDefinition> {
        let mut definition = self.get_by_id(id).await?;
        definition.apply_update(update, Utc::now());
        definition
            .field_schema
            .check_well_formed()
            .map_err(StoreError::InvalidFieldSchema)?;

        let field_schema_json = serde_json::to_string(&definition.field_schema)?;
        let applicable_modes_json = serde_json::to_string(&definition.applicable_modes)?;
        let policy_json = serde_json::to_string(&definition.policy)?;

        sqlx::query(
            r#"
            UPDATE definitions SET
                label = ?1, description = ?2, field_schema_json = ?3,
                pipeline_position = ?4, sort_order = ?5, applicable_modes_json = ?6,
                policy_json = ?7, updated_at = ?8
            WHERE id = ?9
            "#,
        )
        .bind(&definition.label)
        .bind(&definition.description)
        .bind(&field_schema_json)
        .bind(position_to_str(definition.pipeline_position))
        .bind(definition.sort_order)
        .bind(&applicable_modes_json)
        .bind(&policy_json)
        .bind(definition.updated_at.to_rfc3339())
        .bind(definition.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Backend)?;

        Ok(definition)
    }

    #[tracing::instrument(skip(self), err)]
    async fn toggle(&self, id: DefinitionId, enabled: bool) -> StoreResult<CheckpointDefinition> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE definitions SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(enabled as i64)
        .bind(now.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DefinitionNotFound(id.to_string()));
        }
        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: DefinitionId) -> StoreResult<CheckpointDefinition> {
        let row = sqlx::query("SELECT * FROM definitions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Backend)?
            .ok_or_else(|| StoreError::DefinitionNotFound(id.to_string()))?;
        row_to_definition(&row)
    }

    async fn get_by_control_type(
        &self,
        control_type: &str,
    ) -> StoreResult<Option<CheckpointDefinition>> {
        let row = sqlx::query("SELECT * FROM definitions WHERE control_type = ?1")
            .bind(control_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Backend)?;
        row.as_ref().map(row_to_definition).transpose()
    }

    async fn list(&self, include_disabled: bool) -> StoreResult<Vec<CheckpointDefinition>> {
        const POSITION_RANK: &str = "CASE pipeline_position \
            WHEN 'after_retrieval' THEN 0 \
            WHEN 'after_generation' THEN 1 \
            WHEN 'post_generation' THEN 2 \
            ELSE 3 END";
        let sql = if include_disabled {
            format!("SELECT * FROM definitions ORDER BY {POSITION_RANK}, sort_order, created_at")
        } else {
            format!(
                "SELECT * FROM definitions WHERE enabled = 1 ORDER BY {POSITION_RANK}, sort_order, created_at"
            )
        };
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Backend)?;
        rows.iter().map(row_to_definition).collect()
    }

    async fn list_enabled_at_position(
        &self,
        position: PipelinePosition,
    ) -> StoreResult<Vec<CheckpointDefinition>> {
        let rows = sqlx::query(
            "SELECT * FROM definitions WHERE enabled = 1 AND pipeline_position = ?1",
        )
        .bind(position_to_str(position))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Backend)?;
        rows.iter().map(row_to_definition).collect()
    }
}
