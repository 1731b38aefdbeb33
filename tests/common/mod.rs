use sqlx::SqlitePool;
use tempfile::TempDir;

use pathway_backend_rust::db;

pub struct TestDb {
    pub pool: SqlitePool,
    _dir: TempDir,
}

pub async fn test_db() -> TestDb {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("engine.db").display());
    let pool = db::connect_with_url(&url)
        .await
        .expect("failed to open test database");
    TestDb { pool, _dir: dir }
}

pub fn test_app(pool: SqlitePool) -> axum::Router {
    pathway_backend_rust::create_app_with_pool(Some(pool))
}

/// One course, two modules. Module 1 carries a five-question quiz with a
/// passing score of 80, two attempts, and a credential. Module 2 carries a
/// timed quiz.
pub async fn seed_catalog(pool: &SqlitePool) {
    exec(pool, r#"INSERT INTO "courses" ("id", "title") VALUES ('course-1', 'Course One')"#).await;

    exec(
        pool,
        r#"INSERT INTO "modules" ("id", "courseId", "position", "title") VALUES
           ('module-1', 'course-1', 0, 'Module One'),
           ('module-2', 'course-1', 1, 'Module Two')"#,
    )
    .await;

    exec(
        pool,
        r#"INSERT INTO "lessons" ("id", "moduleId", "position", "title") VALUES
           ('l1', 'module-1', 0, 'Lesson 1'),
           ('l2', 'module-1', 1, 'Lesson 2'),
           ('l3', 'module-1', 2, 'Lesson 3'),
           ('l4', 'module-2', 0, 'Lesson 4')"#,
    )
    .await;

    exec(
        pool,
        r#"INSERT INTO "quizzes"
           ("id", "moduleId", "passingScore", "maxAttempts", "timeLimitSeconds", "isFinal", "credentialId")
           VALUES
           ('quiz-1', 'module-1', 80, 2, NULL, 0, 'cred-module-1'),
           ('quiz-timed', 'module-2', 50, NULL, 600, 1, NULL)"#,
    )
    .await;

    for i in 1..=5 {
        exec(
            pool,
            &format!(
                r#"INSERT INTO "questions" ("id", "quizId", "position", "prompt", "kind", "points")
                   VALUES ('q{i}', 'quiz-1', {pos}, 'Question {i}', 'SINGLE_SELECT', 1)"#,
                pos = i - 1,
            ),
        )
        .await;
        exec(
            pool,
            &format!(
                r#"INSERT INTO "answers" ("id", "questionId", "position", "label", "isCorrect") VALUES
                   ('q{i}-right', 'q{i}', 0, 'Right', 1),
                   ('q{i}-wrong', 'q{i}', 1, 'Wrong', 0)"#,
            ),
        )
        .await;
    }

    for i in 1..=2 {
        exec(
            pool,
            &format!(
                r#"INSERT INTO "questions" ("id", "quizId", "position", "prompt", "kind", "points")
                   VALUES ('t{i}', 'quiz-timed', {pos}, 'Timed question {i}', 'SINGLE_SELECT', 1)"#,
                pos = i - 1,
            ),
        )
        .await;
        exec(
            pool,
            &format!(
                r#"INSERT INTO "answers" ("id", "questionId", "position", "label", "isCorrect") VALUES
                   ('t{i}-right', 't{i}', 0, 'Right', 1),
                   ('t{i}-wrong', 't{i}', 1, 'Wrong', 0)"#,
            ),
        )
        .await;
    }
}

/// A single-module course with nine lessons, for completion-fraction cases.
#[allow(dead_code)]
pub async fn seed_long_course(pool: &SqlitePool) {
    exec(pool, r#"INSERT INTO "courses" ("id", "title") VALUES ('course-d', 'Course D')"#).await;
    exec(
        pool,
        r#"INSERT INTO "modules" ("id", "courseId", "position", "title")
           VALUES ('module-d', 'course-d', 0, 'Module D')"#,
    )
    .await;
    for i in 1..=9 {
        exec(
            pool,
            &format!(
                r#"INSERT INTO "lessons" ("id", "moduleId", "position", "title")
                   VALUES ('d{i}', 'module-d', {pos}, 'Lesson D{i}')"#,
                pos = i - 1,
            ),
        )
        .await;
    }
}

pub async fn insert_access_window(
    pool: &SqlitePool,
    learner_id: &str,
    scope_id: &str,
    started_at: &str,
    expires_at: Option<&str>,
) {
    sqlx::query(
        r#"INSERT INTO "access_windows" ("id", "learnerId", "scopeId", "startedAt", "expiresAt")
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(format!("aw-{learner_id}-{scope_id}"))
    .bind(learner_id)
    .bind(scope_id)
    .bind(started_at)
    .bind(expires_at)
    .execute(pool)
    .await
    .expect("failed to insert access window");
}

async fn exec(pool: &SqlitePool, sql: &str) {
    sqlx::query(sql)
        .execute(pool)
        .await
        .expect("fixture insert failed");
}
