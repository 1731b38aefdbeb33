//! Quiz-taking state machine: Intro -> InProgress -> Results.
//!
//! The in-flight draft is a single row per learner and quiz, overwritten on
//! every answer change (last-write-wins). Submit linearizes on deleting that
//! row, so two racing submits produce exactly one immutable attempt.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::services::credential::{self, IssueOutcome};
use crate::services::progress;
use crate::services::unlock;
use crate::services::{now_iso, EngineError};

pub type ResponseMap = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKind {
    SingleSelect,
    MultiSelect,
    TrueFalse,
}

impl QuestionKind {
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "MULTI_SELECT" => Self::MultiSelect,
            "TRUE_FALSE" => Self::TrueFalse,
            _ => Self::SingleSelect,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleSelect => "SINGLE_SELECT",
            Self::MultiSelect => "MULTI_SELECT",
            Self::TrueFalse => "TRUE_FALSE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuizPhase {
    Intro,
    InProgress,
    Results,
}

#[derive(Debug, Clone)]
pub struct QuizDef {
    pub id: String,
    pub module_id: String,
    pub passing_score: i64,
    pub max_attempts: Option<i64>,
    pub time_limit_seconds: Option<i64>,
    pub is_final: bool,
    pub credential_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QuestionDef {
    pub id: String,
    pub position: i64,
    pub kind: QuestionKind,
    pub points: i64,
    pub correct: BTreeSet<String>,
    pub answer_ids: HashSet<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftState {
    pub quiz_id: String,
    pub phase: QuizPhase,
    pub responses: ResponseMap,
    pub current_question_index: i64,
    pub started_at: String,
    pub updated_at: String,
    pub attempts_used: i64,
    pub attempts_remaining: Option<i64>,
    pub deadline: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub id: String,
    pub quiz_id: String,
    pub score: i64,
    pub passed: bool,
    pub completed_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    pub attempt: AttemptRecord,
    pub phase: QuizPhase,
    pub correct_count: i64,
    pub total_count: i64,
    pub credential: Option<IssueOutcome>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryState {
    pub quiz_id: String,
    pub phase: QuizPhase,
    pub attempts_used: i64,
    pub attempts_remaining: Option<i64>,
}

// ---- pure grading ----

/// Single-select and true/false replace the response set; multi-select
/// toggles membership.
pub fn apply_selection(kind: QuestionKind, responses: &mut BTreeSet<String>, answer_id: &str) {
    match kind {
        QuestionKind::SingleSelect | QuestionKind::TrueFalse => {
            responses.clear();
            responses.insert(answer_id.to_string());
        }
        QuestionKind::MultiSelect => {
            if !responses.remove(answer_id) {
                responses.insert(answer_id.to_string());
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GradeOutcome {
    pub score: i64,
    pub correct_count: i64,
    pub total_count: i64,
}

/// A question is correct iff the response set equals the correct set exactly.
/// An unanswered question never equals a non-empty correct set.
pub fn grade(questions: &[QuestionDef], responses: &ResponseMap) -> GradeOutcome {
    static EMPTY: BTreeSet<String> = BTreeSet::new();

    let mut total_points = 0i64;
    let mut correct_points = 0i64;
    let mut correct_count = 0i64;

    for question in questions {
        total_points += question.points;
        let given = responses.get(&question.id).unwrap_or(&EMPTY);
        if *given == question.correct {
            correct_points += question.points;
            correct_count += 1;
        }
    }

    let score = if total_points > 0 {
        ((correct_points as f64 / total_points as f64) * 100.0).round() as i64
    } else {
        0
    };

    GradeOutcome {
        score,
        correct_count,
        total_count: questions.len() as i64,
    }
}

pub fn deadline(quiz: &QuizDef, started_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    quiz.time_limit_seconds
        .map(|secs| started_at + Duration::seconds(secs))
}

// ---- state machine over storage ----

pub async fn start_attempt(
    pool: &SqlitePool,
    learner_id: &str,
    quiz_id: &str,
    bypass_gating: bool,
    now: DateTime<Utc>,
) -> Result<DraftState, EngineError> {
    let (quiz, questions) = load_quiz(pool, quiz_id).await?;

    if let Some(draft) = fetch_draft(pool, learner_id, quiz_id).await? {
        if draft_overdue(&quiz, &draft, now) {
            // The prior session ran out its time limit: score whatever was
            // answered as a normal submit, then fall through to the guards.
            finalize_draft(pool, learner_id, &quiz, &questions, &draft, now).await?;
        } else {
            return draft_state(pool, learner_id, &quiz, draft).await;
        }
    }

    let lessons = progress::module_lessons(pool, &quiz.module_id).await?;
    let lesson_ids: Vec<String> = lessons.iter().map(|l| l.id.clone()).collect();
    let completed = progress::completed_lesson_ids(pool, learner_id, &lesson_ids).await?;
    if !unlock::quiz_gate_open(&lessons, &completed, bypass_gating) {
        return Err(EngineError::Locked(
            "complete every lesson in this module before taking the quiz".to_string(),
        ));
    }

    let used = count_attempts(pool, learner_id, quiz_id).await?;
    if let Some(max) = quiz.max_attempts {
        if used >= max {
            return Err(EngineError::AttemptsExhausted);
        }
    }

    let stamp = now_iso(now);
    sqlx::query(
        r#"INSERT INTO "quiz_drafts"
           ("learnerId", "quizId", "responses", "currentQuestionIndex", "startedAt", "updatedAt")
           VALUES (?, ?, '{}', 0, ?, ?)
           ON CONFLICT ("learnerId", "quizId") DO NOTHING"#,
    )
    .bind(learner_id)
    .bind(quiz_id)
    .bind(&stamp)
    .bind(&stamp)
    .execute(pool)
    .await?;

    let draft = fetch_draft(pool, learner_id, quiz_id)
        .await?
        .ok_or_else(|| EngineError::Transient("draft vanished after insert".to_string()))?;
    draft_state(pool, learner_id, &quiz, draft).await
}

pub async fn select_answer(
    pool: &SqlitePool,
    learner_id: &str,
    quiz_id: &str,
    question_id: &str,
    answer_id: &str,
    now: DateTime<Utc>,
) -> Result<DraftState, EngineError> {
    let (quiz, questions) = load_quiz(pool, quiz_id).await?;

    let question = questions
        .iter()
        .find(|q| q.id == question_id)
        .ok_or_else(|| EngineError::Validation("question does not belong to this quiz".to_string()))?;
    if !question.answer_ids.contains(answer_id) {
        return Err(EngineError::Validation(
            "answer does not belong to this question".to_string(),
        ));
    }

    let mut draft = fetch_draft(pool, learner_id, quiz_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("active quiz attempt".to_string()))?;

    let entry = draft.responses.entry(question_id.to_string()).or_default();
    apply_selection(question.kind, entry, answer_id);
    if entry.is_empty() {
        draft.responses.remove(question_id);
    }
    draft.current_question_index = question.position;
    draft.updated_at = now_iso(now);

    save_draft(pool, learner_id, quiz_id, &draft).await?;
    draft_state(pool, learner_id, &quiz, draft).await
}

pub async fn submit(
    pool: &SqlitePool,
    learner_id: &str,
    quiz_id: &str,
    now: DateTime<Utc>,
) -> Result<SubmitResult, EngineError> {
    let (quiz, questions) = load_quiz(pool, quiz_id).await?;

    let Some(draft) = fetch_draft(pool, learner_id, quiz_id).await? else {
        // Draft already consumed: a racing or repeated submit.
        if count_attempts(pool, learner_id, quiz_id).await? > 0 {
            return Err(EngineError::AlreadySubmitted);
        }
        return Err(EngineError::Validation(
            "no active attempt to submit".to_string(),
        ));
    };

    let overdue = draft_overdue(&quiz, &draft, now);
    if !overdue {
        let unanswered = questions
            .iter()
            .filter(|q| draft.responses.get(&q.id).map_or(true, BTreeSet::is_empty))
            .count();
        if unanswered > 0 {
            return Err(EngineError::Validation(format!(
                "{unanswered} question(s) still unanswered"
            )));
        }
    }

    finalize_draft(pool, learner_id, &quiz, &questions, &draft, now).await
}

pub async fn retry(
    pool: &SqlitePool,
    learner_id: &str,
    quiz_id: &str,
) -> Result<RetryState, EngineError> {
    let (quiz, _) = load_quiz(pool, quiz_id).await?;

    let used = count_attempts(pool, learner_id, quiz_id).await?;
    if let Some(max) = quiz.max_attempts {
        if used >= max {
            return Err(EngineError::AttemptsExhausted);
        }
    }

    // Clears any abandoned selection state; prior attempts are kept.
    sqlx::query(r#"DELETE FROM "quiz_drafts" WHERE "learnerId" = ? AND "quizId" = ?"#)
        .bind(learner_id)
        .bind(quiz_id)
        .execute(pool)
        .await?;

    Ok(RetryState {
        quiz_id: quiz.id,
        phase: QuizPhase::Intro,
        attempts_used: used,
        attempts_remaining: quiz.max_attempts.map(|max| (max - used).max(0)),
    })
}

pub async fn attempt_history(
    pool: &SqlitePool,
    learner_id: &str,
    quiz_id: &str,
) -> Result<Vec<AttemptRecord>, EngineError> {
    let rows = sqlx::query(
        r#"SELECT "id", "quizId", "score", "passed", "completedAt"
           FROM "quiz_attempts"
           WHERE "learnerId" = ? AND "quizId" = ?
           ORDER BY "completedAt" DESC"#,
    )
    .bind(learner_id)
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| AttemptRecord {
            id: row.try_get("id").unwrap_or_default(),
            quiz_id: row.try_get("quizId").unwrap_or_default(),
            score: row.try_get("score").unwrap_or(0),
            passed: row.try_get::<i64, _>("passed").unwrap_or(0) != 0,
            completed_at: row.try_get("completedAt").unwrap_or_default(),
        })
        .collect())
}

// ---- internals ----

#[derive(Debug, Clone)]
struct DraftRow {
    responses: ResponseMap,
    current_question_index: i64,
    started_at: String,
    updated_at: String,
}

async fn load_quiz(
    pool: &SqlitePool,
    quiz_id: &str,
) -> Result<(QuizDef, Vec<QuestionDef>), EngineError> {
    let row = sqlx::query(
        r#"SELECT "id", "moduleId", "passingScore", "maxAttempts", "timeLimitSeconds",
                  "isFinal", "credentialId"
           FROM "quizzes" WHERE "id" = ?"#,
    )
    .bind(quiz_id)
    .fetch_optional(pool)
    .await?;

    let row = row.ok_or_else(|| EngineError::NotFound("quiz".to_string()))?;
    let quiz = QuizDef {
        id: row.try_get("id").unwrap_or_default(),
        module_id: row.try_get("moduleId").unwrap_or_default(),
        passing_score: row.try_get("passingScore").unwrap_or(0),
        max_attempts: row.try_get::<Option<i64>, _>("maxAttempts").ok().flatten(),
        time_limit_seconds: row
            .try_get::<Option<i64>, _>("timeLimitSeconds")
            .ok()
            .flatten(),
        is_final: row.try_get::<i64, _>("isFinal").unwrap_or(0) != 0,
        credential_id: row.try_get::<Option<String>, _>("credentialId").ok().flatten(),
    };

    let question_rows = sqlx::query(
        r#"SELECT "id", "position", "kind", "points" FROM "questions"
           WHERE "quizId" = ? ORDER BY "position" ASC"#,
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    let mut questions: Vec<QuestionDef> = question_rows
        .iter()
        .map(|row| QuestionDef {
            id: row.try_get("id").unwrap_or_default(),
            position: row.try_get("position").unwrap_or(0),
            kind: QuestionKind::parse(&row.try_get::<String, _>("kind").unwrap_or_default()),
            points: row.try_get("points").unwrap_or(1),
            correct: BTreeSet::new(),
            answer_ids: HashSet::new(),
        })
        .collect();

    let answer_rows = sqlx::query(
        r#"SELECT a."id", a."questionId", a."isCorrect"
           FROM "answers" a
           JOIN "questions" q ON q."id" = a."questionId"
           WHERE q."quizId" = ?"#,
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    for row in answer_rows {
        let answer_id: String = row.try_get("id").unwrap_or_default();
        let question_id: String = row.try_get("questionId").unwrap_or_default();
        let is_correct = row.try_get::<i64, _>("isCorrect").unwrap_or(0) != 0;
        if let Some(question) = questions.iter_mut().find(|q| q.id == question_id) {
            question.answer_ids.insert(answer_id.clone());
            if is_correct {
                question.correct.insert(answer_id);
            }
        }
    }

    Ok((quiz, questions))
}

async fn count_attempts(
    pool: &SqlitePool,
    learner_id: &str,
    quiz_id: &str,
) -> Result<i64, EngineError> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "quiz_attempts" WHERE "learnerId" = ? AND "quizId" = ?"#,
    )
    .bind(learner_id)
    .bind(quiz_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

async fn fetch_draft(
    pool: &SqlitePool,
    learner_id: &str,
    quiz_id: &str,
) -> Result<Option<DraftRow>, EngineError> {
    let row = sqlx::query(
        r#"SELECT "responses", "currentQuestionIndex", "startedAt", "updatedAt"
           FROM "quiz_drafts" WHERE "learnerId" = ? AND "quizId" = ?"#,
    )
    .bind(learner_id)
    .bind(quiz_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| {
        let raw: String = row.try_get("responses").unwrap_or_else(|_| "{}".to_string());
        DraftRow {
            responses: serde_json::from_str(&raw).unwrap_or_default(),
            current_question_index: row.try_get("currentQuestionIndex").unwrap_or(0),
            started_at: row.try_get("startedAt").unwrap_or_default(),
            updated_at: row.try_get("updatedAt").unwrap_or_default(),
        }
    }))
}

/// Idempotent autosave: replaying the same draft only refreshes `updatedAt`.
async fn save_draft(
    pool: &SqlitePool,
    learner_id: &str,
    quiz_id: &str,
    draft: &DraftRow,
) -> Result<(), EngineError> {
    let raw = serde_json::to_string(&draft.responses)
        .map_err(|e| EngineError::Transient(e.to_string()))?;

    sqlx::query(
        r#"INSERT INTO "quiz_drafts"
           ("learnerId", "quizId", "responses", "currentQuestionIndex", "startedAt", "updatedAt")
           VALUES (?, ?, ?, ?, ?, ?)
           ON CONFLICT ("learnerId", "quizId") DO UPDATE SET
             "responses" = excluded."responses",
             "currentQuestionIndex" = excluded."currentQuestionIndex",
             "updatedAt" = excluded."updatedAt""#,
    )
    .bind(learner_id)
    .bind(quiz_id)
    .bind(&raw)
    .bind(draft.current_question_index)
    .bind(&draft.started_at)
    .bind(&draft.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

fn draft_overdue(quiz: &QuizDef, draft: &DraftRow, now: DateTime<Utc>) -> bool {
    let Some(started_at) = crate::services::access_window::parse_rfc3339(&draft.started_at) else {
        return false;
    };
    matches!(deadline(quiz, started_at), Some(d) if now > d)
}

/// Deleting the draft is the point of no return: the submit that removes the
/// row wins, any other sees zero rows affected and reports AlreadySubmitted.
/// The delete, the attempt insert, and the credential grant commit together,
/// so a storage failure mid-way leaves the draft untouched.
async fn finalize_draft(
    pool: &SqlitePool,
    learner_id: &str,
    quiz: &QuizDef,
    questions: &[QuestionDef],
    draft: &DraftRow,
    now: DateTime<Utc>,
) -> Result<SubmitResult, EngineError> {
    let outcome = grade(questions, &draft.responses);
    let passed = outcome.score >= quiz.passing_score;

    let mut tx = pool.begin().await?;

    let deleted = sqlx::query(
        r#"DELETE FROM "quiz_drafts" WHERE "learnerId" = ? AND "quizId" = ?"#,
    )
    .bind(learner_id)
    .bind(&quiz.id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if deleted == 0 {
        return Err(EngineError::AlreadySubmitted);
    }

    let attempt_id = Uuid::new_v4().to_string();
    let completed_at = now_iso(now);
    let raw_responses = serde_json::to_string(&draft.responses)
        .map_err(|e| EngineError::Transient(e.to_string()))?;

    sqlx::query(
        r#"INSERT INTO "quiz_attempts"
           ("id", "learnerId", "quizId", "responses", "score", "passed", "completedAt")
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&attempt_id)
    .bind(learner_id)
    .bind(&quiz.id)
    .bind(&raw_responses)
    .bind(outcome.score)
    .bind(if passed { 1i64 } else { 0i64 })
    .bind(&completed_at)
    .execute(&mut *tx)
    .await?;

    let credential = if passed {
        match &quiz.credential_id {
            Some(credential_id) => Some(
                credential::issue_on_conn(&mut tx, learner_id, credential_id, true, now).await?,
            ),
            None => None,
        }
    } else {
        None
    };

    tx.commit().await?;

    Ok(SubmitResult {
        attempt: AttemptRecord {
            id: attempt_id,
            quiz_id: quiz.id.clone(),
            score: outcome.score,
            passed,
            completed_at,
        },
        phase: QuizPhase::Results,
        correct_count: outcome.correct_count,
        total_count: outcome.total_count,
        credential,
    })
}

async fn draft_state(
    pool: &SqlitePool,
    learner_id: &str,
    quiz: &QuizDef,
    draft: DraftRow,
) -> Result<DraftState, EngineError> {
    let used = count_attempts(pool, learner_id, &quiz.id).await?;
    let deadline = crate::services::access_window::parse_rfc3339(&draft.started_at)
        .and_then(|started| deadline(quiz, started))
        .map(now_iso);

    Ok(DraftState {
        quiz_id: quiz.id.clone(),
        phase: QuizPhase::InProgress,
        responses: draft.responses,
        current_question_index: draft.current_question_index,
        started_at: draft.started_at,
        updated_at: draft.updated_at,
        attempts_used: used,
        attempts_remaining: quiz.max_attempts.map(|max| (max - used).max(0)),
        deadline,
    })
}
