//! Response envelope and error mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::TaskError;

/// `{ "success": true, "data": ... }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Errors returned by handlers as `{ "success": false, "error": ..., "message": ... }`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Task(TaskError),
}

impl From<TaskError> for ApiError {
    fn from(e: TaskError) -> Self {
        Self::Task(e)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Task(TaskError::NotFound { .. }) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Task(TaskError::InvalidTransition { .. }) => {
                (StatusCode::BAD_REQUEST, "invalid_transition")
            }
            Self::Task(TaskError::InvalidParams { .. }) => {
                (StatusCode::BAD_REQUEST, "invalid_params")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            Self::BadRequest(message) => message.clone(),
            Self::Task(e) => e.to_string(),
        };
        tracing::debug!(status = %status, error = %message, "Request rejected");
        (
            status,
            Json(serde_json::json!({
                "success": false,
                "error": code,
                "message": message,
            })),
        )
            .into_response()
    }
}
