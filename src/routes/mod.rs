mod access_windows;
mod credentials;
mod health;
mod lessons;
mod prerequisites;
mod quizzes;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::response::{json_error, AppError};
use crate::state::AppState;

#[derive(Serialize)]
pub(crate) struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/api", api_router())
        .fallback(fallback_handler)
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .merge(lessons::router())
        .merge(access_windows::router())
        .merge(quizzes::router())
        .merge(credentials::router())
        .merge(prerequisites::router())
}

/// Identity is delegated to the gateway in front of this service; it injects
/// the learner id as a header.
pub(crate) fn require_learner(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("x-learner-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            json_error(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "missing learner identity",
            )
        })
}

pub(crate) fn require_pool(state: &AppState) -> Result<&SqlitePool, AppError> {
    state
        .pool()
        .ok_or_else(|| AppError::service_unavailable("storage is not available"))
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "route not found").into_response()
}
