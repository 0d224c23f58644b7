//! SQLite-backed [`InstanceStore`], durable sibling of [`super::InMemoryInstanceStore`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::definition::{CheckpointDefinition, DefinitionId, PipelinePosition};
use crate::error::{StoreError, StoreResult};
use crate::field_schema::FieldSchema;
use crate::instance::{CheckpointInstance, InstanceId, InstanceState, TaskId};

use super::instance::{InstancePatch, InstanceStore};

pub struct SqliteInstanceStore {
    pool: SqlitePool,
}

impl SqliteInstanceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn state_to_str(state: InstanceState) -> &'static str {
    match state {
        InstanceState::Pending => "pending",
        InstanceState::Offered => "offered",
        InstanceState::Active => "active",
        InstanceState::Submitted => "submitted",
        InstanceState::Skipped => "skipped",
        InstanceState::Failed => "failed",
        InstanceState::TimedOut => "timed_out",
        InstanceState::Collapsed => "collapsed",
    }
}

fn state_from_str(value: &str) -> StoreResult<InstanceState> {
    Ok(match value {
        "pending" => InstanceState::Pending,
        "offered" => InstanceState::Offered,
        "active" => InstanceState::Active,
        "submitted" => InstanceState::Submitted,
        "skipped" => InstanceState::Skipped,
        "failed" => InstanceState::Failed,
        "timed_out" => InstanceState::TimedOut,
        "collapsed" => InstanceState::Collapsed,
        other => {
            return Err(StoreError::Backend(sqlx::Error::Decode(
                format!("unknown instance state: {other}").into(),
            )));
        }
    })
}

fn parse_timestamp(value: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| StoreError::Backend(sqlx::Error::Decode("bad timestamp".into())))
        })
        .transpose()
}

fn row_to_instance(row: &SqliteRow) -> StoreResult<CheckpointInstance> {
    let id: String = row.try_get("id")?;
    let definition_id: String = row.try_get("definition_id")?;
    let field_schema_json: String = row.try_get("field_schema_json")?;
    let payload_json: String = row.try_get("payload_json")?;
    let submit_result_json: Option<String> = row.try_get("submit_result_json")?;
    let state: String = row.try_get("state")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(CheckpointInstance {
        id: InstanceId(
            id.parse()
                .map_err(|_| StoreError::Backend(sqlx::Error::Decode("bad instance id".into())))?,
        ),
        task_id: TaskId(row.try_get("task_id")?),
        definition_id: DefinitionId(definition_id.parse().map_err(|_| {
            StoreError::Backend(sqlx::Error::Decode("bad definition id".into()))
        })?),
        control_type: row.try_get("control_type")?,
        field_schema: serde_json::from_str::<FieldSchema>(&field_schema_json)?,
        state: state_from_str(&state)?,
        payload: serde_json::from_str::<Value>(&payload_json)?,
        submit_result: submit_result_json
            .map(|s| serde_json::from_str::<BTreeMap<String, Value>>(&s))
            .transpose()?,
        attempt_count: row.try_get::<i64, _>("attempt_count")? as u32,
        max_retries: row.try_get::<i64, _>("max_retries")? as u32,
        required: row.try_get::<i64, _>("required")? != 0,
        last_error: row.try_get("last_error")?,
        failed_at: parse_timestamp(row.try_get("failed_at")?)?,
        offered_at: parse_timestamp(row.try_get("offered_at")?)?,
        submitted_at: parse_timestamp(row.try_get("submitted_at")?)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| StoreError::Backend(sqlx::Error::Decode("bad created_at".into())))?,
    })
}

#[async_trait]
impl InstanceStore for SqliteInstanceStore {
    async fn find(
        &self,
        task_id: &TaskId,
        definition_id: DefinitionId,
    ) -> StoreResult<Option<CheckpointInstance>> {
        let row = sqlx::query("SELECT * FROM instances WHERE task_id = ?1 AND definition_id = ?2")
            .bind(&task_id.0)
            .bind(definition_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Backend)?;
        row.as_ref().map(row_to_instance).transpose()
    }

    async fn get(&self, instance_id: InstanceId) -> StoreResult<CheckpointInstance> {
        let row = sqlx::query("SELECT * FROM instances WHERE id = ?1")
            .bind(instance_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Backend)?
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))?;
        row_to_instance(&row)
    }

    #[tracing::instrument(skip(self, definition, payload), fields(task_id = %task_id, definition_id = %definition.id), err)]
    async fn create(
        &self,
        task_id: TaskId,
        definition: &CheckpointDefinition,
        payload: Value,
    ) -> StoreResult<CheckpointInstance> {
        let instance = CheckpointInstance::new_pending(task_id, definition, payload, Utc::now());
        let field_schema_json = serde_json::to_string(&instance.field_schema)?;
        let payload_json = serde_json::to_string(&instance.payload)?;

        let result = sqlx::query(
            r#"
            INSERT INTO instances (
                id, task_id, definition_id, control_type, field_schema_json,
                state, payload_json, submit_result_json, attempt_count, max_retries,
                required, last_error, failed_at, offered_at, submitted_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?9, ?10, NULL, NULL, NULL, NULL, ?11)
            "#,
        )
        .bind(instance.id.to_string())
        .bind(&instance.task_id.0)
        .bind(instance.definition_id.to_string())
        .bind(&instance.control_type)
        .bind(&field_schema_json)
        .bind(state_to_str(instance.state))
        .bind(&payload_json)
        .bind(instance.attempt_count as i64)
        .bind(instance.max_retries as i64)
        .bind(instance.required as i64)
        .bind(instance.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(instance),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => self
                .find(&instance.task_id, instance.definition_id)
                .await?
                .ok_or_else(|| {
                    StoreError::InstanceNotFound(format!(
                        "race on ({}, {})",
                        instance.task_id, instance.definition_id
                    ))
                }),
            Err(e) => Err(StoreError::Backend(e)),
        }
    }

    #[tracing::instrument(skip(self, patch), fields(instance_id = %instance_id, new_state = ?new_state), err)]
    async fn transition(
        &self,
        instance_id: InstanceId,
        new_state: InstanceState,
        patch: InstancePatch,
    ) -> StoreResult<CheckpointInstance> {
        let mut instance = self.get(instance_id).await?;
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

        let submit_result_json = instance
            .submit_result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            UPDATE instances SET
                state = ?1, attempt_count = ?2, last_error = ?3, submit_result_json = ?4,
                failed_at = ?5, offered_at = ?6, submitted_at = ?7
            WHERE id = ?8
            "#,
        )
        .bind(state_to_str(instance.state))
        .bind(instance.attempt_count as i64)
        .bind(&instance.last_error)
        .bind(&submit_result_json)
        .bind(instance.failed_at.map(|t| t.to_rfc3339()))
        .bind(instance.offered_at.map(|t| t.to_rfc3339()))
        .bind(instance.submitted_at.map(|t| t.to_rfc3339()))
        .bind(instance.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Backend)?;

        Ok(instance)
    }

    async fn list_for_task(
        &self,
        task_id: &TaskId,
        position: Option<PipelinePosition>,
    ) -> StoreResult<Vec<CheckpointInstance>> {
        let _ = position;
        let rows = sqlx::query("SELECT * FROM instances WHERE task_id = ?1")
            .bind(&task_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Backend)?;
        rows.iter().map(row_to_instance).collect()
    }

    async fn count_terminal_failures_since(
        &self,
        definition_id: DefinitionId,
        since: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let rows = sqlx::query(
            r#"
            SELECT attempt_count, max_retries FROM instances
            WHERE definition_id = ?1
              AND state IN ('failed', 'timed_out')
              AND failed_at IS NOT NULL
              AND failed_at >= ?2
            "#,
        )
        .bind(definition_id.to_string())
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Backend)?;

        let count = rows
            .iter()
            .filter(|row| {
                let attempt_count: i64 = row.get("attempt_count");
                let max_retries: i64 = row.get("max_retries");
                attempt_count >= max_retries
            })
            .count();
        Ok(count as u32)
    }
}
