//! `/checkpoints/definitions` and `/checkpoints/field-types` admin routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use serde::Deserialize;
use uuid::Uuid;

use crate::definition::{DefinitionId, DefinitionUpdate, NewDefinition};
use crate::field_schema::field_type_catalog;

use super::error::ApiError;
use super::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/checkpoints/definitions",
            routing::get(list_definitions).post(create_definition),
        )
        .route(
            "/checkpoints/definitions/{id}",
            routing::get(get_definition)
                .put(update_definition)
                .delete(soft_delete_definition),
        )
        .route(
            "/checkpoints/definitions/{id}/toggle",
            routing::post(toggle_definition),
        )
        .route("/checkpoints/field-types", routing::get(field_types))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    include_disabled: bool,
}

async fn list_definitions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let definitions = state.definitions.list(query.include_disabled).await?;
    Ok(Json(definitions))
}

async fn create_definition(
    State(state): State<AppState>,
    Json(new_definition): Json<NewDefinition>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.definitions.create(new_definition).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

fn parse_id(id: &str) -> Result<DefinitionId, ApiError> {
    Uuid::parse_str(id)
        .map(DefinitionId)
        .map_err(|_| crate::error::StoreError::DefinitionNotFound(id.to_string()).into())
}

async fn get_definition(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let definition = state.definitions.get_by_id(id).await?;
    Ok(Json(definition))
}

async fn update_definition(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<DefinitionUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let updated = state.definitions.update(id, update).await?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct ToggleBody {
    enabled: bool,
}

async fn toggle_definition(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ToggleBody>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let updated = state.definitions.toggle(id, body.enabled).await?;
    Ok(Json(updated))
}

async fn soft_delete_definition(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let updated = state.definitions.toggle(id, false).await?;
    Ok(Json(updated))
}

async fn field_types() -> impl IntoResponse {
    Json(field_type_catalog())
}
