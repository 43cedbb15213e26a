//! Error types for the art task queue.

use std::time::Duration;

use uuid::Uuid;

/// Errors that stop the service from starting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Durable storage errors. Never fatal on the task hot path.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Caller-facing task errors. Surfaced synchronously, never retried.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {id} not found")]
    NotFound { id: Uuid },

    #[error("Task {id} is {state}, cannot transition to {target}")]
    InvalidTransition {
        id: Uuid,
        state: String,
        target: String,
    },

    #[error("Invalid task parameters: {reason}")]
    InvalidParams { reason: String },
}

/// Failures of the external generation call. Handled by the worker's retry
/// bookkeeping, never by the caller.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Invalid response from generation service: {reason}")]
    InvalidResponse { reason: String },

    #[error("Generation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Generation was cancelled")]
    Cancelled,

    #[error("Generation returned no images")]
    NoImages,

    #[error("No history record found for generation handle {handle}")]
    HandleNotFound { handle: String },

    #[error("History lookup failed: {0}")]
    History(#[from] DatabaseError),
}

/// Image re-hosting failures. Degrade to the original URLs.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    #[error("Invalid response from storage service: {reason}")]
    InvalidResponse { reason: String },
}

/// Client-side polling errors.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
