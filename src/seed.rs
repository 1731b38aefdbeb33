//! Optional demo catalog for local development. Idempotent: every insert is
//! keyed on a fixed id and skipped when the row already exists.

use sqlx::SqlitePool;

use crate::services::EngineError;

pub fn seeding_enabled() -> bool {
    std::env::var("SEED_DEMO_DATA")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

pub async fn seed_demo_course(pool: &SqlitePool) -> Result<(), EngineError> {
    sqlx::query(r#"INSERT OR IGNORE INTO "courses" ("id", "title") VALUES ('demo-course', 'Workplace Safety Essentials')"#)
        .execute(pool)
        .await?;

    let modules = [
        ("demo-module-1", 0, "Hazard Awareness"),
        ("demo-module-2", 1, "Incident Response"),
    ];
    for (id, position, title) in modules {
        sqlx::query(
            r#"INSERT OR IGNORE INTO "modules" ("id", "courseId", "position", "title")
               VALUES (?, 'demo-course', ?, ?)"#,
        )
        .bind(id)
        .bind(position)
        .bind(title)
        .execute(pool)
        .await?;
    }

    let lessons = [
        ("demo-lesson-1", "demo-module-1", 0, "Spotting Hazards"),
        ("demo-lesson-2", "demo-module-1", 1, "Reporting Procedures"),
        ("demo-lesson-3", "demo-module-2", 0, "First Response Steps"),
    ];
    for (id, module_id, position, title) in lessons {
        sqlx::query(
            r#"INSERT OR IGNORE INTO "lessons" ("id", "moduleId", "position", "title")
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(module_id)
        .bind(position)
        .bind(title)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"INSERT OR IGNORE INTO "quizzes"
           ("id", "moduleId", "passingScore", "maxAttempts", "timeLimitSeconds", "isFinal", "credentialId")
           VALUES ('demo-quiz-1', 'demo-module-1', 80, 3, 600, 0, 'cred-hazard-awareness')"#,
    )
    .execute(pool)
    .await?;

    let questions = [
        ("demo-q1", 0, "SINGLE_SELECT", 1),
        ("demo-q2", 1, "MULTI_SELECT", 2),
        ("demo-q3", 2, "TRUE_FALSE", 1),
    ];
    for (id, position, kind, points) in questions {
        sqlx::query(
            r#"INSERT OR IGNORE INTO "questions" ("id", "quizId", "position", "prompt", "kind", "points")
               VALUES (?, 'demo-quiz-1', ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(position)
        .bind(format!("Demo question {}", position + 1))
        .bind(kind)
        .bind(points)
        .execute(pool)
        .await?;
    }

    let answers = [
        ("demo-q1-a", "demo-q1", 0, "Report it immediately", 1),
        ("demo-q1-b", "demo-q1", 1, "Ignore it", 0),
        ("demo-q2-a", "demo-q2", 0, "Wet floors", 1),
        ("demo-q2-b", "demo-q2", 1, "Blocked exits", 1),
        ("demo-q2-c", "demo-q2", 2, "Closed doors", 0),
        ("demo-q3-a", "demo-q3", 0, "True", 1),
        ("demo-q3-b", "demo-q3", 1, "False", 0),
    ];
    for (id, question_id, position, label, is_correct) in answers {
        sqlx::query(
            r#"INSERT OR IGNORE INTO "answers" ("id", "questionId", "position", "label", "isCorrect")
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(question_id)
        .bind(position)
        .bind(label)
        .bind(is_correct)
        .execute(pool)
        .await?;
    }

    tracing::info!("demo course seeded");
    Ok(())
}
