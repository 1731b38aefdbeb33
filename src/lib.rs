pub mod config;
pub mod db;
pub mod logging;
pub mod response;
pub mod routes;
pub mod seed;
pub mod services;
pub mod state;

use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

pub async fn create_app() -> axum::Router {
    let config = config::Config::from_env();
    let pool = match db::connect(config.database_url.as_deref()).await {
        Ok(pool) => Some(pool),
        Err(err) => {
            tracing::warn!(error = %err, "database not initialized");
            None
        }
    };
    create_app_with_pool(pool)
}

pub fn create_app_with_pool(pool: Option<SqlitePool>) -> axum::Router {
    let state = AppState::new(pool);
    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
