mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use seatwatch::api::router;
use seatwatch::services::Engine;
use seatwatch::state::AppState;

use common::{ManualClock, ScriptedPortal, context, listing, memory_pool};

async fn app(portal: Arc<ScriptedPortal>) -> (Router, Arc<Engine>) {
    let db = memory_pool().await;
    let engine = Arc::new(Engine::new(context(db.clone(), portal, ManualClock::new())));
    let app = router(AppState {
        db,
        engine: engine.clone(),
        default_max_attempts: 2,
        default_delay_seconds: 0,
    });
    (app, engine)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app(ScriptedPortal::with_listings(Vec::new())).await;
    let (status, _) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_watchlist_round_trip() {
    let (app, _) = app(ScriptedPortal::with_listings(Vec::new())).await;

    let (status, body) = send(
        &app,
        "POST",
        "/watchlist",
        Some(json!({ "course_code": "csci1030u", "auto_register": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["course_code"], "CSCI1030U");
    assert_eq!(body["priority"], 1);

    let (status, body) = send(&app, "GET", "/watchlist", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["course_code"], "CSCI1030U");
    assert_eq!(body[0]["available"], false);

    let (status, _) = send(&app, "DELETE", "/watchlist/CSCI1030U", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", "/watchlist/CSCI1030U", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_zero_priority_is_bad_request() {
    let (app, _) = app(ScriptedPortal::with_listings(Vec::new())).await;
    let (status, body) = send(
        &app,
        "POST",
        "/watchlist",
        Some(json!({ "course_code": "CSCI1030U", "priority": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "priority must be at least 1");
}

#[tokio::test]
async fn test_refresh_then_query_courses() {
    let portal = ScriptedPortal::with_listings(vec![
        listing("CSCI1030U", "5/30", "Open"),
        listing("MATH1010U", "0/40", "Closed"),
    ]);
    let (app, _) = app(portal).await;

    let (status, body) = send(&app, "POST", "/courses/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stored"], 2);

    let (_, body) = send(&app, "GET", "/courses/available", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["code"], "CSCI1030U");

    let (status, body) = send(&app, "GET", "/courses/math1010u", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Closed");

    let (status, _) = send(&app, "GET", "/courses/NONE0000U", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_now_returns_outcome() {
    let (app, _) = app(ScriptedPortal::with_listings(Vec::new())).await;
    let (status, body) = send(&app, "POST", "/register/CSCI1030U", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "Success");
}

#[tokio::test]
async fn test_monitor_start_and_status() {
    let portal = ScriptedPortal::with_listings(Vec::new());
    let (app, engine) = app(portal.clone()).await;

    let (status, body) = send(&app, "GET", "/monitor", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Idle");
    assert_eq!(body["running"], false);

    let (status, _) = send(&app, "POST", "/monitor/start", Some(json!({ "max_attempts": 1 }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    for _ in 0..200 {
        if engine.status().last_run.is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let (_, body) = send(&app, "GET", "/monitor", None).await;
    assert_eq!(body["state"], "Stopped");
    assert_eq!(body["last_run"]["stop_reason"], "Completed");
    assert_eq!(body["session_released"], true);

    let (status, _) = send(&app, "POST", "/monitor/start", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The finished run logged out; portal work is refused from here on.
    let (status, _) = send(&app, "POST", "/courses/refresh", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send(&app, "POST", "/register/CSCI1030U", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(portal.attempts().is_empty());

    // Local watchlist queries keep working.
    let (status, _) = send(&app, "GET", "/watchlist", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, "POST", "/monitor/stop", None).await;
    assert_eq!(body["signalled"], false);
}

#[tokio::test]
async fn test_start_monitor_rejects_malformed_body() {
    let (app, _) = app(ScriptedPortal::with_listings(Vec::new())).await;
    let request = Request::builder()
        .method("POST")
        .uri("/monitor/start")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
