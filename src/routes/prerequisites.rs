use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::response::AppError;
use crate::routes::{require_learner, require_pool, SuccessResponse};
use crate::services::prerequisite::{self, UnlockSignal};
use crate::services::progress;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/prerequisites/:resourceId/resolve", post(resolve))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveBody {
    /// When present, the learner's completion of this course is added as a
    /// signal, satisfied at 100 percent.
    source_course_id: Option<String>,
    #[serde(default)]
    signals: Vec<UnlockSignal>,
}

async fn resolve(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ResolveBody>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = require_learner(&headers)?;
    let pool = require_pool(&state)?;

    for signal in &body.signals {
        if signal.name.trim().is_empty() {
            return Err(AppError::validation("signal name must not be empty"));
        }
    }

    let mut signals = body.signals;
    if let Some(course_id) = &body.source_course_id {
        let summary = progress::get_course_completion(pool, &learner_id, course_id).await?;
        // Exact counts, not the rounded percent: 199 of 200 rounds to 100 but
        // is not complete.
        signals.push(UnlockSignal {
            name: format!("course-complete:{course_id}"),
            satisfied: summary.total_count > 0 && summary.completed_count == summary.total_count,
            progress_percent: summary.percent,
        });
    }

    let resolution = prerequisite::resolve(&resource_id, &signals);
    Ok(Json(SuccessResponse {
        success: true,
        data: resolution,
    }))
}
