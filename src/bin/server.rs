use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;

use checkpoint_engine::config::EngineConfig;
use checkpoint_engine::http::{self, AppState};
use checkpoint_engine::seeder;
use checkpoint_engine::store::{SqliteDefinitionStore, SqliteInstanceStore};
use checkpoint_engine::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init();

    let config = EngineConfig::from_env();
    tracing::info!(bind_addr = %config.bind_addr, database_url = %config.database_url, "starting checkpoint engine");

    let pool = SqlitePoolOptions::new()
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let definitions = Arc::new(SqliteDefinitionStore::new(pool.clone()));
    let instances = Arc::new(SqliteInstanceStore::new(pool));

    if config.run_seeder {
        seeder::seed_builtins(definitions.as_ref()).await?;
    }

    let state = AppState::new(definitions, instances);
    let router = http::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on http://{}", config.bind_addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    tracing::info!("shutdown signal received");
}
