use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::response::AppError;
use crate::routes::{require_learner, require_pool, SuccessResponse};
use crate::services::credential::{self, CredentialRecord};
use crate::services::EngineError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/credentials", get(list))
        .route("/credentials/:credentialId/check", post(check))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsData {
    credentials: Vec<CredentialRecord>,
    count: usize,
}

async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = require_learner(&headers)?;
    let pool = require_pool(&state)?;

    let credentials = credential::list_credentials(pool, &learner_id).await?;
    Ok(Json(SuccessResponse {
        success: true,
        data: CredentialsData {
            count: credentials.len(),
            credentials,
        },
    }))
}

#[derive(Debug, Default, Deserialize)]
struct CheckBody {
    /// Caller-evaluated eligibility for predicates the engine cannot see.
    /// When absent, eligibility falls back to a passed awarding quiz.
    eligible: Option<bool>,
}

/// Re-evaluates eligibility and issues when earned. Calling this twice, or
/// concurrently, never duplicates a grant.
async fn check(
    State(state): State<AppState>,
    Path(credential_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<CheckBody>>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = require_learner(&headers)?;
    let pool = require_pool(&state)?;

    let eligible = match body.and_then(|Json(b)| b.eligible) {
        Some(eligible) => eligible,
        None => has_passing_attempt(pool, &learner_id, &credential_id).await?,
    };
    let outcome =
        credential::issue_if_eligible(pool, &learner_id, &credential_id, eligible, Utc::now())
            .await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: outcome,
    }))
}

/// Eligibility: a passed attempt on any quiz that awards this credential.
async fn has_passing_attempt(
    pool: &SqlitePool,
    learner_id: &str,
    credential_id: &str,
) -> Result<bool, EngineError> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "quiz_attempts" qa
           JOIN "quizzes" q ON q."id" = qa."quizId"
           WHERE qa."learnerId" = ? AND qa."passed" = 1 AND q."credentialId" = ?"#,
    )
    .bind(learner_id)
    .bind(credential_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}
