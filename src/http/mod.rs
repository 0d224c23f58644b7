//! HTTP transport: the JSON API wrapping the engine.

pub mod checkpoints;
pub mod definitions;
pub mod error;
pub mod state;

use axum::Router;
use axum::response::IntoResponse;
use axum::routing::get;

pub use state::AppState;

async fn healthz() -> impl IntoResponse {
    "ok"
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .merge(definitions::router())
        .merge(checkpoints::router())
        .with_state(state)
}
