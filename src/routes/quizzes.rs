use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::response::AppError;
use crate::routes::{require_learner, require_pool, SuccessResponse};
use crate::services::quiz::{self, AttemptRecord};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/quizzes/:quizId/start", post(start))
        .route("/quizzes/:quizId/answers", post(answer))
        .route("/quizzes/:quizId/submit", post(submit))
        .route("/quizzes/:quizId/retry", post(retry))
        .route("/quizzes/:quizId/attempts", get(attempts))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartBody {
    #[serde(default)]
    bypass_gating: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerBody {
    question_id: String,
    answer_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AttemptsData {
    quiz_id: String,
    attempts: Vec<AttemptRecord>,
    count: usize,
}

async fn start(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<StartBody>>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = require_learner(&headers)?;
    let pool = require_pool(&state)?;
    let bypass = body.map(|Json(b)| b.bypass_gating).unwrap_or(false);

    let draft = quiz::start_attempt(pool, &learner_id, &quiz_id, bypass, Utc::now()).await?;
    Ok(Json(SuccessResponse {
        success: true,
        data: draft,
    }))
}

async fn answer(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AnswerBody>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = require_learner(&headers)?;
    let pool = require_pool(&state)?;

    if body.question_id.trim().is_empty() || body.answer_id.trim().is_empty() {
        return Err(AppError::validation("questionId and answerId are required"));
    }

    let draft = quiz::select_answer(
        pool,
        &learner_id,
        &quiz_id,
        &body.question_id,
        &body.answer_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(SuccessResponse {
        success: true,
        data: draft,
    }))
}

async fn submit(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = require_learner(&headers)?;
    let pool = require_pool(&state)?;

    let result = quiz::submit(pool, &learner_id, &quiz_id, Utc::now()).await?;
    Ok(Json(SuccessResponse {
        success: true,
        data: result,
    }))
}

async fn retry(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = require_learner(&headers)?;
    let pool = require_pool(&state)?;

    let reset = quiz::retry(pool, &learner_id, &quiz_id).await?;
    Ok(Json(SuccessResponse {
        success: true,
        data: reset,
    }))
}

async fn attempts(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = require_learner(&headers)?;
    let pool = require_pool(&state)?;

    let attempts = quiz::attempt_history(pool, &learner_id, &quiz_id).await?;
    Ok(Json(SuccessResponse {
        success: true,
        data: AttemptsData {
            quiz_id,
            count: attempts.len(),
            attempts,
        },
    }))
}
