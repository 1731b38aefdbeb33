use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::response::AppError;
use crate::routes::{require_learner, require_pool, SuccessResponse};
use crate::services::access_window::{self, AccessStatus, AccessWindow};
use crate::services::{progress, EngineError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/access-windows/:scopeId", get(get_window))
}

#[derive(Debug, Default, Deserialize)]
struct WindowParams {
    /// Evaluation instant override, RFC 3339. Defaults to the server clock.
    now: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WindowStatusData {
    window: AccessWindow,
    #[serde(flatten)]
    status: AccessStatus,
    locked_lesson_ids: Vec<String>,
    reviewable_lesson_ids: Vec<String>,
}

async fn get_window(
    State(state): State<AppState>,
    Path(scope_id): Path<String>,
    Query(params): Query<WindowParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = require_learner(&headers)?;
    let pool = require_pool(&state)?;

    let now = match params.now.as_deref() {
        Some(raw) => access_window::parse_rfc3339(raw)
            .ok_or_else(|| AppError::validation("now must be an RFC 3339 timestamp"))?,
        None => Utc::now(),
    };

    let window = access_window::get_access_window(pool, &learner_id, &scope_id).await?;
    let started = access_window::parse_rfc3339(&window.started_at).unwrap_or(now);
    let expires = window.expires_at.as_deref().and_then(access_window::parse_rfc3339);
    let status = access_window::evaluate(now, started, expires);

    // When the scope is a course, split its lessons by what the window still
    // permits. Unknown scopes just get empty partitions.
    let lesson_ids = course_lesson_ids(pool, &scope_id).await?;
    let completed = progress::completed_lesson_ids(pool, &learner_id, &lesson_ids).await?;

    let mut locked = Vec::new();
    let mut reviewable = Vec::new();
    for lesson_id in lesson_ids {
        let is_completed = completed.contains(&lesson_id);
        if access_window::lesson_locked_for_new_progress(status, is_completed) {
            locked.push(lesson_id.clone());
        }
        if access_window::lesson_reachable_for_review(status, is_completed) {
            reviewable.push(lesson_id);
        }
    }

    Ok(Json(SuccessResponse {
        success: true,
        data: WindowStatusData {
            window,
            status,
            locked_lesson_ids: locked,
            reviewable_lesson_ids: reviewable,
        },
    }))
}

async fn course_lesson_ids(pool: &SqlitePool, course_id: &str) -> Result<Vec<String>, EngineError> {
    let rows = sqlx::query(
        r#"SELECT l."id" FROM "lessons" l
           JOIN "modules" m ON m."id" = l."moduleId"
           WHERE m."courseId" = ?
           ORDER BY m."position" ASC, l."position" ASC"#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| row.try_get("id").unwrap_or_default())
        .collect())
}
