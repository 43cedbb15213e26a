//! REST endpoints for submitting and observing generation tasks.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use super::response::{ApiError, ApiResponse};
use crate::error::TaskError;
use crate::tasks::model::{TaskParams, TaskSnapshot};
use crate::tasks::service::TaskQueueService;
use crate::worker::Worker;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TaskQueueService>,
    pub worker: Arc<Worker>,
}

/// Build the Axum router with the task endpoints.
pub fn task_routes(service: Arc<TaskQueueService>, worker: Arc<Worker>) -> Router {
    let state = AppState { service, worker };

    Router::new()
        .route("/health", get(health))
        .route("/api/generate-art-photo", post(submit_task))
        .route("/api/task/{id}", get(get_task))
        .route("/api/task/{id}/retry", post(retry_task))
        .route("/api/task/{id}/cancel", post(cancel_task))
        .route("/api/tasks/user/{user_id}", get(list_user_tasks))
        .route("/api/tasks/stats", get(queue_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn parse_task_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::BadRequest(format!("Invalid task ID: {id}")))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "art-queue"
    }))
}

// ── Tasks ───────────────────────────────────────────────────────────────

async fn submit_task(
    State(state): State<AppState>,
    body: Result<Json<TaskParams>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(params) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let task = state.worker.submit(params).await?;
    info!(task_id = %task.id, "Generation task submitted");
    Ok(ApiResponse::ok(TaskSnapshot::from(&task)))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_task_id(&id)?;
    let task = state
        .service
        .get_task(id)
        .await
        .ok_or(TaskError::NotFound { id })?;
    Ok(ApiResponse::ok(TaskSnapshot::from(&task)))
}

async fn retry_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_task_id(&id)?;
    let task = state.worker.retry_task(id).await?;
    Ok(ApiResponse::ok(TaskSnapshot::from(&task)))
}

async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_task_id(&id)?;
    let task = state.worker.cancel_task(id).await?;
    Ok(ApiResponse::ok(TaskSnapshot::from(&task)))
}

async fn list_user_tasks(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let tasks: Vec<TaskSnapshot> = state
        .service
        .list_tasks_by_user(&user_id)
        .await
        .iter()
        .map(TaskSnapshot::from)
        .collect();
    ApiResponse::ok(tasks)
}

async fn queue_stats(State(state): State<AppState>) -> impl IntoResponse {
    ApiResponse::ok(state.service.queue_stats().await)
}
