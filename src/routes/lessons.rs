use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::response::AppError;
use crate::routes::{require_learner, require_pool, SuccessResponse};
use crate::services::unlock::ModuleAccess;
use crate::services::{access_window, progress, unlock, EngineError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/courses/:courseId/accessibility", get(course_accessibility))
        .route("/courses/:courseId/completion", get(course_completion))
        .route("/modules/:moduleId/completion", get(module_completion))
        .route("/lessons/:lessonId/view", post(view_lesson))
        .route("/lessons/:lessonId/complete", post(complete_lesson))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatingParams {
    #[serde(default)]
    bypass_gating: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteBody {
    #[serde(default)]
    bypass_gating: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CourseAccessibility {
    course_id: String,
    modules: Vec<ModuleAccess>,
}

async fn course_accessibility(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Query(params): Query<GatingParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = require_learner(&headers)?;
    let pool = require_pool(&state)?;

    let module_ids = course_modules(pool, &course_id).await?;

    let mut modules = Vec::with_capacity(module_ids.len());
    for module_id in module_ids {
        let lessons = progress::module_lessons(pool, &module_id).await?;
        let lesson_ids: Vec<String> = lessons.iter().map(|l| l.id.clone()).collect();
        let completed = progress::completed_lesson_ids(pool, &learner_id, &lesson_ids).await?;
        modules.push(unlock::resolve_module_access(
            &module_id,
            &lessons,
            &completed,
            params.bypass_gating,
        ));
    }

    Ok(Json(SuccessResponse {
        success: true,
        data: CourseAccessibility { course_id, modules },
    }))
}

async fn course_completion(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = require_learner(&headers)?;
    let pool = require_pool(&state)?;

    let summary = progress::get_course_completion(pool, &learner_id, &course_id).await?;
    Ok(Json(SuccessResponse {
        success: true,
        data: summary,
    }))
}

async fn module_completion(
    State(state): State<AppState>,
    Path(module_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = require_learner(&headers)?;
    let pool = require_pool(&state)?;

    let summary = progress::get_module_completion(pool, &learner_id, &module_id).await?;
    Ok(Json(SuccessResponse {
        success: true,
        data: summary,
    }))
}

async fn view_lesson(
    State(state): State<AppState>,
    Path(lesson_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = require_learner(&headers)?;
    let pool = require_pool(&state)?;

    let record = progress::record_lesson_view(pool, &learner_id, &lesson_id).await?;
    Ok(Json(SuccessResponse {
        success: true,
        data: record,
    }))
}

async fn complete_lesson(
    State(state): State<AppState>,
    Path(lesson_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<CompleteBody>>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = require_learner(&headers)?;
    let pool = require_pool(&state)?;
    let bypass = body.map(|Json(b)| b.bypass_gating).unwrap_or(false);
    let now = Utc::now();

    let placement = lesson_placement(pool, &lesson_id).await?;

    let lessons = progress::module_lessons(pool, &placement.module_id).await?;
    let lesson_ids: Vec<String> = lessons.iter().map(|l| l.id.clone()).collect();
    let completed = progress::completed_lesson_ids(pool, &learner_id, &lesson_ids).await?;

    let access = unlock::resolve_lesson_access(&lessons, &completed, bypass);
    let entry = access
        .iter()
        .find(|a| a.lesson_id == lesson_id)
        .ok_or_else(|| EngineError::NotFound("lesson".to_string()))?;
    if !entry.accessible {
        return Err(EngineError::Locked(
            "complete the previous lesson first".to_string(),
        )
        .into());
    }

    // An expired course window blocks new progress; completed lessons may
    // still be re-marked (a no-op).
    if !bypass {
        if let Ok(window) = access_window::get_access_window(pool, &learner_id, &placement.course_id).await
        {
            let started = access_window::parse_rfc3339(&window.started_at).unwrap_or(now);
            let expires = window.expires_at.as_deref().and_then(access_window::parse_rfc3339);
            let status = access_window::evaluate(now, started, expires);
            if access_window::lesson_locked_for_new_progress(status, entry.completed) {
                return Err(EngineError::Locked(
                    "access to this course has expired".to_string(),
                )
                .into());
            }
        }
    }

    let record = progress::mark_lesson_complete(pool, &learner_id, &lesson_id, now).await?;
    Ok(Json(SuccessResponse {
        success: true,
        data: record,
    }))
}

struct LessonPlacement {
    module_id: String,
    course_id: String,
}

async fn lesson_placement(pool: &SqlitePool, lesson_id: &str) -> Result<LessonPlacement, EngineError> {
    let row = sqlx::query(
        r#"SELECT l."moduleId" AS "moduleId", m."courseId" AS "courseId"
           FROM "lessons" l
           JOIN "modules" m ON m."id" = l."moduleId"
           WHERE l."id" = ?"#,
    )
    .bind(lesson_id)
    .fetch_optional(pool)
    .await?;

    let row = row.ok_or_else(|| EngineError::NotFound("lesson".to_string()))?;
    Ok(LessonPlacement {
        module_id: row.try_get("moduleId").unwrap_or_default(),
        course_id: row.try_get("courseId").unwrap_or_default(),
    })
}

async fn course_modules(pool: &SqlitePool, course_id: &str) -> Result<Vec<String>, EngineError> {
    let exists: Option<String> = sqlx::query_scalar(r#"SELECT "id" FROM "courses" WHERE "id" = ?"#)
        .bind(course_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(EngineError::NotFound("course".to_string()));
    }

    let rows = sqlx::query(
        r#"SELECT "id" FROM "modules" WHERE "courseId" = ? ORDER BY "position" ASC"#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| row.try_get("id").unwrap_or_default())
        .collect())
}
