//! `/tasks/{task_id}/checkpoints...` routes: the orchestrator-facing surface
//! plus the submit/skip/retry/timeout actions a browser client drives.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::definition::{PipelinePosition, TaskMode};
use crate::instance::{CheckpointInstance, InstanceId, TaskId};
use crate::lifecycle::LifecycleController;
use crate::orchestrator::OrchestratorAdapter;

use super::error::ApiError;
use super::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks/{task_id}/checkpoints", routing::get(resolve_checkpoints))
        .route(
            "/tasks/{task_id}/checkpoints/{instance_id}",
            routing::get(get_checkpoint),
        )
        .route(
            "/tasks/{task_id}/checkpoints/{instance_id}/submit",
            routing::post(submit_checkpoint),
        )
        .route(
            "/tasks/{task_id}/checkpoints/{instance_id}/skip",
            routing::post(skip_checkpoint),
        )
        .route(
            "/tasks/{task_id}/checkpoints/{instance_id}/retry",
            routing::post(retry_checkpoint),
        )
        .route(
            "/tasks/{task_id}/checkpoints/{instance_id}/timeout",
            routing::post(timeout_checkpoint),
        )
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pipeline_position: PipelinePosition,
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(default)]
    payload: Value,
}

fn default_mode() -> String {
    "baseline".to_string()
}

#[derive(Debug, Serialize)]
struct ResolvedCheckpoints {
    task_id: String,
    pipeline_position: PipelinePosition,
    checkpoints: Vec<CheckpointInstance>,
}

async fn resolve_checkpoints(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(query): Query<ResolveQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let adapter = OrchestratorAdapter::new(state.definitions.as_ref(), state.instances.as_ref());
    let task = TaskId(task_id.clone());
    let mode = TaskMode::from(query.mode.as_str());
    let checkpoints = adapter
        .resolve(&task, query.pipeline_position, &mode, query.payload)
        .await?;
    Ok(Json(ResolvedCheckpoints {
        task_id,
        pipeline_position: query.pipeline_position,
        checkpoints,
    }))
}

fn parse_instance_id(id: &str) -> Result<InstanceId, ApiError> {
    Uuid::parse_str(id)
        .map(InstanceId)
        .map_err(|_| crate::error::StoreError::InstanceNotFound(id.to_string()).into())
}

async fn get_checkpoint(
    State(state): State<AppState>,
    Path((_task_id, instance_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let adapter = OrchestratorAdapter::new(state.definitions.as_ref(), state.instances.as_ref());
    let instance = adapter.get(parse_instance_id(&instance_id)?).await?;
    Ok(Json(instance))
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    data: BTreeMap<String, Value>,
}

async fn submit_checkpoint(
    State(state): State<AppState>,
    Path((_task_id, instance_id)): Path<(String, String)>,
    Json(body): Json<SubmitBody>,
) -> Result<impl IntoResponse, ApiError> {
    let controller = LifecycleController::new(state.definitions.as_ref(), state.instances.as_ref());
    let updated = controller
        .submit(parse_instance_id(&instance_id)?, body.data)
        .await?;
    Ok(Json(updated))
}

async fn skip_checkpoint(
    State(state): State<AppState>,
    Path((_task_id, instance_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let controller = LifecycleController::new(state.definitions.as_ref(), state.instances.as_ref());
    let updated = controller.skip(parse_instance_id(&instance_id)?).await?;
    Ok(Json(updated))
}

async fn retry_checkpoint(
    State(state): State<AppState>,
    Path((_task_id, instance_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let controller = LifecycleController::new(state.definitions.as_ref(), state.instances.as_ref());
    let updated = controller.retry(parse_instance_id(&instance_id)?).await?;
    Ok(Json(updated))
}

async fn timeout_checkpoint(
    State(state): State<AppState>,
    Path((_task_id, instance_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let controller = LifecycleController::new(state.definitions.as_ref(), state.instances.as_ref());
    let updated = controller.timeout(parse_instance_id(&instance_id)?).await?;
    Ok(Json(updated))
}
