//! Persistence traits for task snapshots and the generation history store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::tasks::model::{GenerationMode, Task};

/// Status of a generation history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Pending,
    Completed,
    Failed,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// An audit row in the generation history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    /// Queue task id, or the opaque handle a generator wrote its output under.
    pub task_id: String,
    pub user_id: String,
    pub mode: Option<GenerationMode>,
    pub original_image_urls: Vec<String>,
    pub generated_image_urls: Vec<String>,
    pub status: HistoryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// A pending record written when a task is submitted.
    pub fn for_submission(task: &Task) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id: task.id.to_string(),
            user_id: task.params.user_id.clone(),
            mode: Some(task.params.mode),
            original_image_urls: task.params.image_urls.clone(),
            generated_image_urls: Vec::new(),
            status: HistoryStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields changed when the worker reports an outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryUpdate {
    pub images: Option<Vec<String>>,
    pub status: HistoryStatus,
}

/// Durable snapshot storage, one full record per task id.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert or replace the snapshot for `task.id`.
    async fn save_task(&self, task: &Task) -> Result<(), DatabaseError>;

    /// Load a snapshot by id.
    async fn load_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError>;

    /// Delete a snapshot. Deleting a missing id is not an error.
    async fn delete_task(&self, id: Uuid) -> Result<(), DatabaseError>;

    /// Load every snapshot (startup recovery).
    async fn load_all_tasks(&self) -> Result<Vec<Task>, DatabaseError>;
}

/// Relational history/audit store. Best-effort, never authoritative for task state.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert a new history record.
    async fn insert(&self, record: &HistoryRecord) -> Result<(), DatabaseError>;

    /// Most recent record for a task id or generator handle.
    async fn get_by_task_id(&self, task_id: &str) -> Result<Option<HistoryRecord>, DatabaseError>;

    /// Update images and status of a record.
    async fn update(&self, record_id: Uuid, update: HistoryUpdate) -> Result<(), DatabaseError>;
}
