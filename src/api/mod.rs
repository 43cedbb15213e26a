//! HTTP API over the task queue.

pub mod response;
pub mod routes;

pub use response::{ApiError, ApiResponse};
pub use routes::{AppState, task_routes};
