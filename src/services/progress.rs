use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::services::{now_iso, EngineError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub id: String,
    pub learner_id: String,
    pub lesson_id: String,
    pub completed: bool,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
    pub completed_count: i64,
    pub total_count: i64,
    pub percent: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRef {
    pub id: String,
    pub position: i64,
    pub title: String,
}

pub fn completion_percent(completed: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as i64
}

/// Creates the per-learner progress row on first view. No-op when the row
/// already exists, regardless of its completion state.
pub async fn record_lesson_view(
    pool: &SqlitePool,
    learner_id: &str,
    lesson_id: &str,
) -> Result<LessonProgress, EngineError> {
    ensure_lesson_exists(pool, lesson_id).await?;

    sqlx::query(
        r#"INSERT INTO "lesson_progress" ("id", "learnerId", "lessonId", "completed")
           VALUES (?, ?, ?, 0)
           ON CONFLICT ("learnerId", "lessonId") DO NOTHING"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(learner_id)
    .bind(lesson_id)
    .execute(pool)
    .await?;

    fetch_progress(pool, learner_id, lesson_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("lesson progress".to_string()))
}

/// One-way completion transition. Re-marking a completed lesson is a no-op
/// and leaves `completedAt` untouched.
pub async fn mark_lesson_complete(
    pool: &SqlitePool,
    learner_id: &str,
    lesson_id: &str,
    now: DateTime<Utc>,
) -> Result<LessonProgress, EngineError> {
    ensure_lesson_exists(pool, lesson_id).await?;

    let completed_at = now_iso(now);
    sqlx::query(
        r#"INSERT INTO "lesson_progress" ("id", "learnerId", "lessonId", "completed", "completedAt")
           VALUES (?, ?, ?, 1, ?)
           ON CONFLICT ("learnerId", "lessonId") DO NOTHING"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(learner_id)
    .bind(lesson_id)
    .bind(&completed_at)
    .execute(pool)
    .await?;

    // Row may predate this call with completed = 0 (created on first view).
    sqlx::query(
        r#"UPDATE "lesson_progress"
           SET "completed" = 1, "completedAt" = ?
           WHERE "learnerId" = ? AND "lessonId" = ? AND "completed" = 0"#,
    )
    .bind(&completed_at)
    .bind(learner_id)
    .bind(lesson_id)
    .execute(pool)
    .await?;

    fetch_progress(pool, learner_id, lesson_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("lesson progress".to_string()))
}

pub async fn get_module_completion(
    pool: &SqlitePool,
    learner_id: &str,
    module_id: &str,
) -> Result<CompletionSummary, EngineError> {
    let exists: Option<String> = sqlx::query_scalar(r#"SELECT "id" FROM "modules" WHERE "id" = ?"#)
        .bind(module_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(EngineError::NotFound("module".to_string()));
    }

    let total: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "lessons" WHERE "moduleId" = ?"#)
            .bind(module_id)
            .fetch_one(pool)
            .await?;

    let completed: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "lessons" l
           JOIN "lesson_progress" lp ON lp."lessonId" = l."id"
           WHERE l."moduleId" = ? AND lp."learnerId" = ? AND lp."completed" = 1"#,
    )
    .bind(module_id)
    .bind(learner_id)
    .fetch_one(pool)
    .await?;

    Ok(CompletionSummary {
        completed_count: completed,
        total_count: total,
        percent: completion_percent(completed, total),
    })
}

pub async fn get_course_completion(
    pool: &SqlitePool,
    learner_id: &str,
    course_id: &str,
) -> Result<CompletionSummary, EngineError> {
    let exists: Option<String> = sqlx::query_scalar(r#"SELECT "id" FROM "courses" WHERE "id" = ?"#)
        .bind(course_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(EngineError::NotFound("course".to_string()));
    }

    let total: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "lessons" l
           JOIN "modules" m ON m."id" = l."moduleId"
           WHERE m."courseId" = ?"#,
    )
    .bind(course_id)
    .fetch_one(pool)
    .await?;

    let completed: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "lessons" l
           JOIN "modules" m ON m."id" = l."moduleId"
           JOIN "lesson_progress" lp ON lp."lessonId" = l."id"
           WHERE m."courseId" = ? AND lp."learnerId" = ? AND lp."completed" = 1"#,
    )
    .bind(course_id)
    .bind(learner_id)
    .fetch_one(pool)
    .await?;

    Ok(CompletionSummary {
        completed_count: completed,
        total_count: total,
        percent: completion_percent(completed, total),
    })
}

pub async fn module_lessons(
    pool: &SqlitePool,
    module_id: &str,
) -> Result<Vec<LessonRef>, EngineError> {
    let rows = sqlx::query(
        r#"SELECT "id", "position", "title" FROM "lessons"
           WHERE "moduleId" = ? ORDER BY "position" ASC"#,
    )
    .bind(module_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| LessonRef {
            id: row.try_get("id").unwrap_or_default(),
            position: row.try_get("position").unwrap_or(0),
            title: row.try_get("title").unwrap_or_default(),
        })
        .collect())
}

pub async fn completed_lesson_ids(
    pool: &SqlitePool,
    learner_id: &str,
    lesson_ids: &[String],
) -> Result<HashSet<String>, EngineError> {
    let mut completed = HashSet::new();
    if lesson_ids.is_empty() {
        return Ok(completed);
    }

    let rows = sqlx::query(
        r#"SELECT "lessonId" FROM "lesson_progress"
           WHERE "learnerId" = ? AND "completed" = 1"#,
    )
    .bind(learner_id)
    .fetch_all(pool)
    .await?;

    let wanted: HashSet<&str> = lesson_ids.iter().map(String::as_str).collect();
    for row in rows {
        let lesson_id: String = row.try_get("lessonId").unwrap_or_default();
        if wanted.contains(lesson_id.as_str()) {
            completed.insert(lesson_id);
        }
    }
    Ok(completed)
}

async fn ensure_lesson_exists(pool: &SqlitePool, lesson_id: &str) -> Result<(), EngineError> {
    let exists: Option<String> = sqlx::query_scalar(r#"SELECT "id" FROM "lessons" WHERE "id" = ?"#)
        .bind(lesson_id)
        .fetch_optional(pool)
        .await?;
    match exists {
        Some(_) => Ok(()),
        None => Err(EngineError::NotFound("lesson".to_string())),
    }
}

async fn fetch_progress(
    pool: &SqlitePool,
    learner_id: &str,
    lesson_id: &str,
) -> Result<Option<LessonProgress>, EngineError> {
    let row = sqlx::query(
        r#"SELECT "id", "learnerId", "lessonId", "completed", "completedAt"
           FROM "lesson_progress" WHERE "learnerId" = ? AND "lessonId" = ?"#,
    )
    .bind(learner_id)
    .bind(lesson_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| LessonProgress {
        id: row.try_get("id").unwrap_or_default(),
        learner_id: row.try_get("learnerId").unwrap_or_default(),
        lesson_id: row.try_get("lessonId").unwrap_or_default(),
        completed: row.try_get::<i64, _>("completed").unwrap_or(0) != 0,
        completed_at: row.try_get::<Option<String>, _>("completedAt").ok().flatten(),
    }))
}
