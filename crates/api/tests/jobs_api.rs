//! Integration tests for job submission, status and cancellation.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::http::StatusCode;
use common::{body_json, build_test_app, delete, get, post_json, post_raw, CallbackReceiver};
use serde_json::json;

/// Poll `GET /api/v1/jobs/{id}` until the job reaches `status`.
async fn wait_for_status(app: &common::TestApp, job_id: &str, status: &str) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let response = get(app.router.clone(), &format!("/api/v1/jobs/{job_id}")).await;
            let json = body_json(response).await;
            if json["data"]["status"] == status {
                return json;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {job_id} never reached {status}"))
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_callback_url_is_rejected_without_scheduling() {
    let app = build_test_app();

    let response = post_json(
        app.router.clone(),
        "/run",
        json!({"task": "find the weather in Paris"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "callback_url is required for async runs");
    assert_eq!(json["code"], "VALIDATION_ERROR");

    assert_eq!(app.state.dispatcher.in_flight(), 0);
    assert!(app.state.tracker.is_empty().await);
    assert_eq!(app.executor.runs.load(Ordering::SeqCst), 0);
    assert_eq!(app.browser_counters.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn non_http_callback_is_rejected() {
    let app = build_test_app();

    let response = post_json(
        app.router.clone(),
        "/api/v1/jobs",
        json!({"task": "x", "callback_url": "ftp://example.com/cb"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("http or https"));
    assert!(app.state.tracker.is_empty().await);
}

#[tokio::test]
async fn malformed_body_uses_error_envelope() {
    let app = build_test_app();

    let response = post_raw(app.router.clone(), "/run", "{not json").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn accepted_before_the_job_completes() {
    let app = build_test_app();
    let receiver = CallbackReceiver::spawn().await;

    let response = post_json(
        app.router.clone(),
        "/run",
        json!({"task": "block", "callback_url": receiver.url}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "accepted");
    assert_eq!(json["detail"], "Work scheduled");
    assert!(json["job_id"].is_string());
    assert!(receiver.received().is_empty());

    app.unblock();
    let callbacks = receiver.wait_for(1).await;
    assert_eq!(callbacks[0], json!({"final_result": "unblocked"}));
}

#[tokio::test]
async fn successful_job_end_to_end() {
    let app = build_test_app();
    let receiver = CallbackReceiver::spawn().await;

    let response = post_json(
        app.router.clone(),
        "/run",
        json!({
            "task": "find the weather in Paris",
            "model": "gpt-4o",
            "callback_url": receiver.url,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job_id = body_json(response).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let callbacks = receiver.wait_for(1).await;
    assert_eq!(
        callbacks[0],
        json!({"final_result": "done: find the weather in Paris"})
    );

    let status = wait_for_status(&app, &job_id, "callback_sent").await;
    assert_eq!(status["data"]["job_id"], job_id);
    assert_eq!(app.browser_counters.opened.load(Ordering::SeqCst), 1);
    assert_eq!(app.browser_counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn screenshots_are_returned_when_requested() {
    let app = build_test_app();
    let receiver = CallbackReceiver::spawn().await;

    post_json(
        app.router.clone(),
        "/run",
        json!({"task": "t", "return_screenshots": true, "callback_url": receiver.url}),
    )
    .await;

    let callbacks = receiver.wait_for(1).await;
    assert_eq!(
        callbacks[0],
        json!({"final_result": "done: t", "screenshots": ["data:image/png;base64,AAA"]})
    );
}

#[tokio::test]
async fn executor_fault_is_delivered_as_error() {
    let app = build_test_app();
    let receiver = CallbackReceiver::spawn().await;

    let response = post_json(
        app.router.clone(),
        "/run",
        json!({"task": "fail", "callback_url": receiver.url}),
    )
    .await;
    let job_id = body_json(response).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let callbacks = receiver.wait_for(1).await;
    assert_eq!(callbacks[0], json!({"error": "navigation timeout"}));

    let status = wait_for_status(&app, &job_id, "callback_sent").await;
    assert_eq!(status["data"]["detail"], "navigation timeout");
    assert_eq!(app.browser_counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_backend_credential_reaches_the_callback() {
    let app = build_test_app();
    let receiver = CallbackReceiver::spawn().await;

    post_json(
        app.router.clone(),
        "/run",
        json!({"task": "t", "model": "gemini-2.0-flash", "callback_url": receiver.url}),
    )
    .await;

    let callbacks = receiver.wait_for(1).await;
    let error = callbacks[0]["error"].as_str().unwrap();
    assert!(error.contains("GEMINI_API_KEY"), "unexpected error: {error}");
    assert_eq!(app.executor.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_jobs_each_get_a_result() {
    let app = build_test_app();
    let receiver = CallbackReceiver::spawn().await;

    for i in 0..5 {
        let response = post_json(
            app.router.clone(),
            "/run",
            json!({"task": format!("job {i}"), "callback_url": receiver.url}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let mut results: Vec<String> = receiver
        .wait_for(5)
        .await
        .iter()
        .map(|body| body["final_result"].as_str().unwrap().to_string())
        .collect();
    results.sort();
    assert_eq!(
        results,
        ["done: job 0", "done: job 1", "done: job 2", "done: job 3", "done: job 4"]
    );
    assert_eq!(app.browser_counters.opened.load(Ordering::SeqCst), 5);
}

// ---------------------------------------------------------------------------
// Status & cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_is_404() {
    let app = build_test_app();
    let id = webpilot_core::types::new_job_id();

    let response = get(app.router.clone(), &format!("/api/v1/jobs/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");

    let response = delete(app.router.clone(), &format!("/api/v1/jobs/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_running_job_delivers_cancellation() {
    let app = build_test_app();
    let receiver = CallbackReceiver::spawn().await;

    let response = post_json(
        app.router.clone(),
        "/api/v1/jobs",
        json!({"task": "block", "callback_url": receiver.url}),
    )
    .await;
    let job_id = body_json(response).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_status(&app, &job_id, "running").await;

    let response = delete(app.router.clone(), &format!("/api/v1/jobs/{job_id}")).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let callbacks = receiver.wait_for(1).await;
    assert_eq!(callbacks[0], json!({"error": "job cancelled"}));

    wait_for_status(&app, &job_id, "callback_sent").await;
    let response = delete(app.router.clone(), &format!("/api/v1/jobs/{job_id}")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(app.browser_counters.closed.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submissions_refused_after_shutdown() {
    let app = build_test_app();
    app.state.dispatcher.shutdown(Duration::from_secs(1)).await;

    let response = post_json(
        app.router.clone(),
        "/run",
        json!({"task": "x", "callback_url": "http://127.0.0.1:1/cb"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn shutdown_cancels_jobs_that_outlive_the_drain() {
    let app = build_test_app();
    let receiver = CallbackReceiver::spawn().await;

    post_json(
        app.router.clone(),
        "/run",
        json!({"task": "block", "callback_url": receiver.url}),
    )
    .await;

    app.state
        .dispatcher
        .shutdown(Duration::from_millis(200))
        .await;

    assert_eq!(app.state.dispatcher.in_flight(), 0);
    assert_eq!(receiver.received(), vec![json!({"error": "job cancelled"})]);
    assert_eq!(app.browser_counters.closed.load(Ordering::SeqCst), 1);
}
