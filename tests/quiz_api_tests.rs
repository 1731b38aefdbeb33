mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

const LEARNER: &str = "learner-api";

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-learner-id", LEARNER)
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-learner-id", LEARNER);
    match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_learner_header_is_unauthorized() {
    let db = common::test_db().await;
    common::seed_catalog(&db.pool).await;
    let app = common::test_app(db.pool.clone());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/credentials")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = json_body(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("UNAUTHORIZED"));
}

#[tokio::test]
async fn out_of_order_completion_is_locked() {
    let db = common::test_db().await;
    common::seed_catalog(&db.pool).await;
    let app = common::test_app(db.pool.clone());

    let response = app
        .oneshot(post("/api/lessons/l2/complete", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = json_body(response).await;
    assert_eq!(body["code"], json!("LOCKED"));
}

#[tokio::test]
async fn full_quiz_flow_over_http() {
    let db = common::test_db().await;
    common::seed_catalog(&db.pool).await;
    let app = common::test_app(db.pool.clone());

    for lesson in ["l1", "l2", "l3"] {
        let response = app
            .clone()
            .oneshot(post(&format!("/api/lessons/{lesson}/complete"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "completing {lesson}");
    }

    let response = app
        .clone()
        .oneshot(get("/api/courses/course-1/accessibility"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let modules = body["data"]["modules"].as_array().unwrap();
    assert_eq!(modules[0]["quizAccessible"], json!(true));
    assert_eq!(modules[0]["moduleComplete"], json!(true));
    assert_eq!(modules[1]["quizAccessible"], json!(false));
    assert_eq!(modules[1]["lessons"][0]["accessible"], json!(true));

    let response = app
        .clone()
        .oneshot(post("/api/quizzes/quiz-1/start", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["phase"], json!("IN_PROGRESS"));

    for i in 1..=5 {
        let response = app
            .clone()
            .oneshot(post(
                "/api/quizzes/quiz-1/answers",
                Some(json!({ "questionId": format!("q{i}"), "answerId": format!("q{i}-right") })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "answering q{i}");
    }

    let response = app
        .clone()
        .oneshot(post("/api/quizzes/quiz-1/submit", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["attempt"]["score"], json!(100));
    assert_eq!(body["data"]["attempt"]["passed"], json!(true));
    assert_eq!(body["data"]["credential"]["newlyIssued"], json!(true));

    // A second submit finds no draft.
    let response = app
        .clone()
        .oneshot(post("/api/quizzes/quiz-1/submit", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["code"], json!("ALREADY_SUBMITTED"));

    let response = app
        .clone()
        .oneshot(get("/api/quizzes/quiz-1/attempts"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["count"], json!(1));

    let response = app.oneshot(get("/api/credentials")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["count"], json!(1));
    assert_eq!(
        body["data"]["credentials"][0]["credentialId"],
        json!("cred-module-1")
    );
}

#[tokio::test]
async fn locked_quiz_start_is_forbidden() {
    let db = common::test_db().await;
    common::seed_catalog(&db.pool).await;
    let app = common::test_app(db.pool.clone());

    let response = app
        .oneshot(post("/api/quizzes/quiz-1/start", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["code"], json!("LOCKED"));
}

#[tokio::test]
async fn answer_validation_rejects_foreign_ids() {
    let db = common::test_db().await;
    common::seed_catalog(&db.pool).await;
    let app = common::test_app(db.pool.clone());

    let response = app
        .clone()
        .oneshot(post(
            "/api/quizzes/quiz-1/start",
            Some(json!({ "bypassGating": true })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post(
            "/api/quizzes/quiz-1/answers",
            Some(json!({ "questionId": "t1", "answerId": "t1-right" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn expired_window_blocks_new_progress_but_not_review() {
    let db = common::test_db().await;
    common::seed_catalog(&db.pool).await;
    common::insert_access_window(
        &db.pool,
        LEARNER,
        "course-1",
        "2024-01-01T00:00:00.000Z",
        Some("2024-01-08T00:00:00.000Z"),
    )
    .await;
    let app = common::test_app(db.pool.clone());

    let response = app
        .clone()
        .oneshot(post("/api/lessons/l1/complete", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["code"], json!("LOCKED"));

    let response = app
        .oneshot(get(
            "/api/access-windows/course-1?now=2024-01-09T00:00:00Z",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["status"], json!("EXPIRED"));
    assert_eq!(body["data"]["lockedLessonIds"].as_array().unwrap().len(), 4);
    assert!(body["data"]["reviewableLessonIds"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn window_status_reports_days_remaining() {
    let db = common::test_db().await;
    common::seed_catalog(&db.pool).await;
    common::insert_access_window(
        &db.pool,
        LEARNER,
        "course-1",
        "2024-01-01T00:00:00.000Z",
        Some("2024-01-08T00:00:00.000Z"),
    )
    .await;
    let app = common::test_app(db.pool.clone());

    let response = app
        .oneshot(get(
            "/api/access-windows/course-1?now=2024-01-06T00:00:00Z",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["status"], json!("EXPIRING_SOON"));
    assert_eq!(body["data"]["daysRemaining"], json!(2));
}

#[tokio::test]
async fn prerequisites_resolve_over_http() {
    let db = common::test_db().await;
    common::seed_catalog(&db.pool).await;
    let app = common::test_app(db.pool.clone());

    let response = app
        .oneshot(post(
            "/api/prerequisites/bonus-module/resolve",
            Some(json!({
                "signals": [
                    { "name": "module-complete", "satisfied": false, "progressPercent": 60 },
                    { "name": "quiz-passed", "satisfied": true, "progressPercent": 100 },
                ]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["unlocked"], json!(true));
    assert_eq!(body["data"]["progressTowardUnlock"], json!(100));
    assert_eq!(body["data"]["satisfiedBy"], json!("quiz-passed"));
}

#[tokio::test]
async fn course_completion_drives_prerequisite_unlock() {
    let db = common::test_db().await;
    common::seed_catalog(&db.pool).await;
    common::seed_long_course(&db.pool).await;
    let app = common::test_app(db.pool.clone());

    for i in 1..=8 {
        let response = app
            .clone()
            .oneshot(post(&format!("/api/lessons/d{i}/complete"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "completing d{i}");
    }

    // 8 of 9 lessons: locked, progress 89.
    let response = app
        .clone()
        .oneshot(post(
            "/api/prerequisites/bonus-track/resolve",
            Some(json!({ "sourceCourseId": "course-d" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["unlocked"], json!(false));
    assert_eq!(body["data"]["progressTowardUnlock"], json!(89));

    let response = app
        .clone()
        .oneshot(post("/api/lessons/d9/complete", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post(
            "/api/prerequisites/bonus-track/resolve",
            Some(json!({ "sourceCourseId": "course-d" })),
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["unlocked"], json!(true));
    assert_eq!(body["data"]["progressTowardUnlock"], json!(100));
    assert_eq!(body["data"]["satisfiedBy"], json!("course-complete:course-d"));

    // The earned course credential is issued exactly once across repeats.
    let response = app
        .clone()
        .oneshot(post(
            "/api/credentials/cred-course-d/check",
            Some(json!({ "eligible": true })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["issued"], json!(true));
    assert_eq!(body["data"]["newlyIssued"], json!(true));

    let response = app
        .clone()
        .oneshot(post(
            "/api/credentials/cred-course-d/check",
            Some(json!({ "eligible": true })),
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["issued"], json!(true));
    assert_eq!(body["data"]["newlyIssued"], json!(false));

    let response = app.oneshot(get("/api/credentials")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["count"], json!(1));
}

#[tokio::test]
async fn credential_check_without_body_uses_quiz_results() {
    let db = common::test_db().await;
    common::seed_catalog(&db.pool).await;
    let app = common::test_app(db.pool.clone());

    // No passed awarding quiz yet: nothing to issue.
    let response = app
        .clone()
        .oneshot(post("/api/credentials/cred-module-1/check", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["issued"], json!(false));

    // An explicit negative verdict never issues either.
    let response = app
        .oneshot(post(
            "/api/credentials/cred-module-1/check",
            Some(json!({ "eligible": false })),
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["issued"], json!(false));
    assert!(body["data"]["issuedAt"].is_null());
}

#[tokio::test]
async fn prerequisite_unknown_source_course_is_not_found() {
    let db = common::test_db().await;
    common::seed_catalog(&db.pool).await;
    let app = common::test_app(db.pool.clone());

    let response = app
        .oneshot(post(
            "/api/prerequisites/bonus-track/resolve",
            Some(json!({ "sourceCourseId": "no-such-course" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_unknown_routes() {
    let db = common::test_db().await;
    let app = common::test_app(db.pool.clone());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
