use axum::Json;
use axum::body::Bytes;
use axum::extract::Path;
use axum::routing::{delete, post};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::*;
use crate::services::MonitorStatus;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct StartMonitorRequest {
    max_attempts: Option<u32>,
    delay_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    stored: usize,
}

#[derive(Debug, Serialize)]
struct StopResponse {
    signalled: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/courses/available", get(list_available_courses))
        .route("/courses/refresh", post(refresh_courses))
        .route("/courses/{code}", get(get_course))
        .route("/watchlist", get(list_watchlist).post(add_to_watchlist))
        .route("/watchlist/{code}", delete(remove_from_watchlist))
        .route("/register/{code}", post(register_now))
        .route("/monitor", get(monitor_status))
        .route("/monitor/start", post(start_monitor))
        .route("/monitor/stop", post(stop_monitor))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn list_available_courses(State(state): State<AppState>) -> Result<Json<Vec<CourseSnapshot>>, AppError> {
    let courses = state.engine.list_available_courses().await?;
    Ok(Json(courses))
}

async fn refresh_courses(State(state): State<AppState>) -> Result<Json<RefreshResponse>, AppError> {
    let stored = state.engine.refresh_courses().await?;
    Ok(Json(RefreshResponse { stored }))
}

async fn get_course(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<CourseSnapshot>, AppError> {
    let course = state
        .engine
        .get_course_snapshot(&code)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(course))
}

async fn list_watchlist(State(state): State<AppState>) -> Result<Json<Vec<WatchStatus>>, AppError> {
    let watchlist = state.engine.list_watchlist_status().await?;
    Ok(Json(watchlist))
}

async fn add_to_watchlist(
    State(state): State<AppState>,
    Json(req): Json<AddWatchRequest>,
) -> Result<(StatusCode, Json<WatchlistEntry>), AppError> {
    let entry = state
        .engine
        .add_to_watchlist(&req.course_code, req.priority, req.auto_register)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn remove_from_watchlist(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<StatusCode, AppError> {
    state.engine.remove_from_watchlist(&code).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn register_now(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RegistrationOutcome>, AppError> {
    let outcome = state.engine.register_now(&code).await?;
    Ok(Json(outcome))
}

async fn monitor_status(State(state): State<AppState>) -> Json<MonitorStatus> {
    Json(state.engine.status())
}

async fn start_monitor(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    // An empty body means "use the configured defaults".
    let req: StartMonitorRequest = if body.is_empty() {
        StartMonitorRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?
    };
    let max_attempts = req.max_attempts.unwrap_or(state.default_max_attempts);
    let delay_seconds = req.delay_seconds.unwrap_or(state.default_delay_seconds);

    state.engine.start_monitor(max_attempts, delay_seconds)?;
    Ok(StatusCode::ACCEPTED)
}

async fn stop_monitor(State(state): State<AppState>) -> Json<StopResponse> {
    Json(StopResponse {
        signalled: state.engine.stop(),
    })
}
