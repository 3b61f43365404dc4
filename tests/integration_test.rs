mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use common::{body_json, request, Harness, USER};

#[tokio::test]
async fn test_health_endpoint() {
    let app = Harness::new().router();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "memory");
}

#[tokio::test]
async fn test_health_live_endpoint() {
    let app = Harness::new().router();

    let response = app
        .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_not_found_endpoint() {
    let app = Harness::new().router();

    let response = app
        .oneshot(Request::builder().uri("/nonexistent").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let app = Harness::new().router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/vocab-trainers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_fetch_trainer() {
    let harness = Harness::new();
    let vocab = harness.vocab("hello", &["xin chào"]).await;

    let response = harness
        .router()
        .oneshot(request(
            "POST",
            "/api/vocab-trainers",
            Some(json!({
                "name": "Greetings",
                "questionType": "FILL_IN_THE_BLANK",
                "vocabIds": [vocab.id],
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    assert_eq!(created["success"], true);
    assert_eq!(created["data"]["status"], "PENDING");
    assert_eq!(created["data"]["reminderRepeat"], 0);
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let response = harness
        .router()
        .oneshot(request("GET", &format!("/api/vocab-trainers/{id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["data"]["name"], "Greetings");
    assert_eq!(fetched["data"]["vocabs"][0]["textSource"], "hello");
}

#[tokio::test]
async fn test_trainer_of_other_user_is_not_found() {
    let harness = Harness::new();
    let vocab = harness.vocab("cat", &["con mèo"]).await;
    let trainer = harness
        .trainers()
        .create(
            USER,
            serde_json::from_value(json!({
                "name": "Animals",
                "questionType": "FLIP_CARD",
                "vocabIds": [vocab.id],
            }))
            .unwrap(),
        )
        .await
        .unwrap();

    let response = harness
        .router()
        .oneshot(
            Request::builder()
                .uri(format!("/api/vocab-trainers/{}", trainer.id))
                .header("x-user-id", "someone-else")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_inline_exam_is_returned_without_job() {
    let harness = Harness::new();
    let vocab = harness.vocab("dog", &["con chó"]).await;
    let trainer = harness
        .trainers()
        .create(
            USER,
            serde_json::from_value(json!({
                "name": "Pets",
                "questionType": "FLIP_CARD",
                "vocabIds": [vocab.id],
            }))
            .unwrap(),
        )
        .await
        .unwrap();

    let response = harness
        .router()
        .oneshot(request("GET", &format!("/api/vocab-trainers/{}/exam", trainer.id), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["data"].get("jobId").is_none());
    assert_eq!(body["data"]["questionAnswers"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_generated_exam_is_accepted_with_job_id() {
    let harness = Harness::new();
    let vocab = harness.vocab("dog", &["con chó"]).await;
    let trainer = harness
        .trainers()
        .create(
            USER,
            serde_json::from_value(json!({
                "name": "Pets",
                "questionType": "MULTIPLE_CHOICE",
                "vocabIds": [vocab.id],
            }))
            .unwrap(),
        )
        .await
        .unwrap();

    let response = harness
        .router()
        .oneshot(request("GET", &format!("/api/vocab-trainers/{}/exam", trainer.id), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    let job_id = body["data"]["jobId"].as_str().unwrap().to_string();

    let response = harness
        .router()
        .oneshot(request("GET", &format!("/api/jobs/{job_id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_stale_version_update_conflicts() {
    let harness = Harness::new();
    let vocab = harness.vocab("dog", &["con chó"]).await;
    let trainer = harness
        .trainers()
        .create(
            USER,
            serde_json::from_value(json!({
                "name": "Pets",
                "questionType": "FLIP_CARD",
                "vocabIds": [vocab.id],
            }))
            .unwrap(),
        )
        .await
        .unwrap();

    let response = harness
        .router()
        .oneshot(request(
            "PUT",
            &format!("/api/vocab-trainers/{}", trainer.id),
            Some(json!({ "name": "Renamed", "version": trainer.version + 7 })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}
