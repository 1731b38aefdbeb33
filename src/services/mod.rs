pub mod access_window;
pub mod credential;
pub mod prerequisite;
pub mod progress;
pub mod quiz;
pub mod unlock;

use thiserror::Error;

use crate::response::AppError;

/// Failure taxonomy shared by the stateful services. The pure resolvers
/// (unlock, access window, prerequisite) cannot fail at runtime.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Locked(String),
    #[error("no attempts remaining for this quiz")]
    AttemptsExhausted,
    #[error("this attempt was already submitted")]
    AlreadySubmitted,
    #[error("storage error: {0}")]
    Transient(String),
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => EngineError::NotFound("record".to_string()),
            other => EngineError::Transient(other.to_string()),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(what) => AppError::not_found(format!("{what} not found")),
            EngineError::Validation(msg) => AppError::validation(msg),
            EngineError::Locked(msg) => AppError::locked(msg),
            EngineError::AttemptsExhausted => {
                AppError::attempts_exhausted("no attempts remaining for this quiz")
            }
            EngineError::AlreadySubmitted => {
                AppError::already_submitted("this attempt was already submitted")
            }
            EngineError::Transient(msg) => {
                tracing::error!(error = %msg, "storage error");
                AppError::transient("storage temporarily unavailable, retry the request")
            }
        }
    }
}

pub(crate) fn now_iso(now: chrono::DateTime<chrono::Utc>) -> String {
    now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
