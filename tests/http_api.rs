use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

mod common;

use common::{create_test_app, get, json_body, post_json};

#[tokio::test]
async fn test_health() {
    let app = create_test_app();

    let response = app.oneshot(get("/api/v1/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["assistant"], "offline");
}

#[tokio::test]
async fn test_topics_and_problems() {
    let app = create_test_app();

    let response = app.clone().oneshot(get("/api/v1/topics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let topics = json_body(response).await;
    assert!(topics.as_array().unwrap().iter().any(|t| t["id"] == "graphs"));

    let response = app.clone().oneshot(get("/api/v1/topics/graphs/problems")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let problems = json_body(response).await;
    assert_eq!(problems[0]["difficulty"], "easy");

    let response = app.oneshot(get("/api/v1/topics/quantum/problems")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNKNOWN_TOPIC");
}

#[tokio::test]
async fn test_attempts_drive_mastery_and_progress() {
    let app = create_test_app();

    let outcomes = ["incorrect", "incorrect", "incorrect", "correct"];
    let mut last = json!(null);
    for (i, outcome) in outcomes.iter().enumerate() {
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/attempts",
                json!({
                    "userId": "learner-1",
                    "problemId": "two-sum",
                    "outcome": outcome,
                    "timestamp": format!("2026-01-01T10:00:0{i}Z"),
                    "latencyMs": 30000
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        last = json_body(response).await;
    }
    assert_eq!(last["topicId"], "arrays");
    assert_eq!(last["score"], 0.25);
    assert_eq!(last["attemptCount"], 4);

    let response = app.clone().oneshot(get("/api/v1/mastery?userId=learner-1")).await.unwrap();
    let mastery = json_body(response).await;
    assert_eq!(mastery.as_array().unwrap().len(), 1);

    let response = app.oneshot(get("/api/v1/progress?userId=learner-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let progress = json_body(response).await;
    assert_eq!(progress["totalAttempts"], 4);
    assert_eq!(progress["problemsSolved"], 1);
    assert_eq!(progress["timeInvestedMs"], 120000);
    assert_eq!(progress["scope"], "core");
    let total = progress["totalProblems"].as_u64().unwrap();
    assert!(total > 0);
    assert!((progress["completionRate"].as_f64().unwrap() - 1.0 / total as f64).abs() < 1e-12);
    assert_eq!(progress["topics"][0]["trajectory"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_stale_attempt_conflicts() {
    let app = create_test_app();

    let attempt = |ts: &str| {
        post_json(
            "/api/v1/attempts",
            json!({ "userId": "u", "problemId": "two-sum", "outcome": "correct", "timestamp": ts }),
        )
    };
    let response = app.clone().oneshot(attempt("2026-01-01T10:00:00Z")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.oneshot(attempt("2025-12-31T10:00:00Z")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["code"], "STALE_ATTEMPT");
}

#[tokio::test]
async fn test_practice_next() {
    let app = create_test_app();

    let response = app.clone().oneshot(get("/api/v1/practice/next?userId=u&count=3")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let problems = body["problems"].as_array().unwrap();
    assert_eq!(problems.len(), 3);
    assert!(problems.iter().all(|p| p["difficulty"] == "easy"));

    let response = app.oneshot(get("/api/v1/practice/next?userId=u&scope=advanced")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["code"], "NO_CONTENT_AVAILABLE");
}

#[tokio::test]
async fn test_session_lifecycle() {
    let app = create_test_app();

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/sessions", json!({ "userId": "u" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let session = json_body(response).await;
    let id = session["sessionId"].as_str().unwrap().to_string();
    assert_eq!(session["state"], "active");

    let response = app
        .clone()
        .oneshot(post_json(&format!("/api/v1/sessions/{id}/turns"), json!({ "text": "Can I get a practice problem?" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let chat = json_body(response).await;
    assert_eq!(chat["reply"]["role"], "assistant");
    assert!(chat["recommendation"]["id"].is_string());

    let response = app
        .clone()
        .oneshot(post_json(&format!("/api/v1/sessions/{id}/end"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["closeReason"], "ended");

    let response = app
        .clone()
        .oneshot(post_json(&format!("/api/v1/sessions/{id}/turns"), json!({ "text": "one more?" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["code"], "SESSION_CLOSED");

    let response = app.oneshot(get("/api/v1/sessions/does-not-exist")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_assist() {
    let app = create_test_app();

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/assist", json!({ "question": "How do I think about recursion?" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["response"].as_str().unwrap().contains("base case"));
    assert!(body["codeExample"].is_null());

    let response = app
        .oneshot(post_json("/api/v1/assist", json!({ "question": "   " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
