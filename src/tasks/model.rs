//! Task data model: the record, its immutable params, and partial updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::TaskStatus;

/// Generation mode requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Several portraits composed into one scene.
    Puzzle,
    /// A single portrait restyled.
    Transform,
}

impl GenerationMode {
    /// Accepted number of user photos for this mode.
    pub fn image_count_range(&self) -> std::ops::RangeInclusive<usize> {
        match self {
            Self::Puzzle => 2..=5,
            Self::Transform => 1..=1,
        }
    }
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Puzzle => write!(f, "puzzle"),
            Self::Transform => write!(f, "transform"),
        }
    }
}

/// Payment tier of the submitting user, forwarded to the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentTier {
    #[default]
    Free,
    Paid,
}

/// Immutable input snapshot captured at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskParams {
    pub mode: GenerationMode,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub template_id: Option<String>,
    /// User photos.
    pub image_urls: Vec<String>,
    /// Template reference image appended after the user photos.
    #[serde(default)]
    pub template_image_url: Option<String>,
    /// Final prompt computed from the template.
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub face_positions: Option<serde_json::Value>,
    #[serde(default)]
    pub payment_tier: PaymentTier,
    #[serde(default)]
    pub model_params: serde_json::Map<String, serde_json::Value>,
    /// Overrides the queue-wide retry budget for this task.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl TaskParams {
    pub fn new(mode: GenerationMode, user_id: impl Into<String>, image_urls: Vec<String>) -> Self {
        Self {
            mode,
            user_id: user_id.into(),
            template_id: None,
            image_urls,
            template_image_url: None,
            prompt: String::new(),
            face_positions: None,
            payment_tier: PaymentTier::Free,
            model_params: serde_json::Map::new(),
            max_retries: None,
        }
    }

    pub fn with_template(mut self, template_id: impl Into<String>, image_url: impl Into<String>) -> Self {
        self.template_id = Some(template_id.into());
        self.template_image_url = Some(image_url.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_face_positions(mut self, positions: serde_json::Value) -> Self {
        self.face_positions = Some(positions);
        self
    }

    pub fn with_payment_tier(mut self, tier: PaymentTier) -> Self {
        self.payment_tier = tier;
        self
    }

    pub fn with_model_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.model_params.insert(key.into(), value);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Check the photo count against the mode's requirements.
    pub fn validate(&self) -> Result<(), String> {
        if self.image_urls.is_empty() {
            return Err("at least one user photo is required".to_string());
        }
        if self.image_urls.iter().any(|u| u.trim().is_empty()) {
            return Err("image URLs must not be empty".to_string());
        }

        let range = self.mode.image_count_range();
        if !range.contains(&self.image_urls.len()) {
            return Err(if range.start() == range.end() {
                format!(
                    "{} mode requires exactly {} photo(s), got {}",
                    self.mode,
                    range.start(),
                    self.image_urls.len()
                )
            } else {
                format!(
                    "{} mode requires {}-{} photos, got {}",
                    self.mode,
                    range.start(),
                    range.end(),
                    self.image_urls.len()
                )
            });
        }
        Ok(())
    }

    /// Images sent to the generator: user photos, then the template image.
    pub fn generation_image_urls(&self) -> Vec<String> {
        self.image_urls
            .iter()
            .chain(self.template_image_url.iter())
            .cloned()
            .collect()
    }
}

/// Output of a completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub images: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Denormalized summary for listing without reading `params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMeta {
    pub mode: GenerationMode,
    pub user_id: String,
    pub template_id: Option<String>,
    pub image_count: usize,
}

impl TaskMeta {
    pub fn from_params(params: &TaskParams) -> Self {
        Self {
            mode: params.mode,
            user_id: params.user_id.clone(),
            template_id: params.template_id.clone(),
            image_count: params.image_urls.len(),
        }
    }
}

/// One tracked unit of generation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub status: TaskStatus,
    /// 0-100.
    pub progress: u8,
    pub message: String,
    pub params: TaskParams,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub meta: TaskMeta,
}

impl Task {
    /// Create a pending task. `default_max_retries` applies unless the params override it.
    pub fn new(params: TaskParams, default_max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: TaskStatus::Pending,
            progress: 0,
            message: "Task created, waiting to be processed".to_string(),
            max_retries: params.max_retries.unwrap_or(default_max_retries),
            meta: TaskMeta::from_params(&params),
            params,
            result: None,
            error: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Whether a failed attempt still has retry budget left.
    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Time since creation.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.created_at)
    }

    /// Merge a partial update and bump `updated_at`.
    pub fn apply(&mut self, update: TaskUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if let Some(result) = update.result {
            self.result = result;
        }
        if let Some(error) = update.error {
            self.error = error;
        }
        if let Some(retry_count) = update.retry_count {
            self.retry_count = retry_count.min(self.max_retries);
        }
        if let Some(started_at) = update.started_at {
            self.started_at = started_at;
        }
        if let Some(completed_at) = update.completed_at {
            self.completed_at = completed_at;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update merged into a task by `TaskQueueService::update_task`.
///
/// Nullable fields use `Option<Option<T>>`: the outer `None` leaves the field
/// untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub result: Option<Option<TaskResult>>,
    pub error: Option<Option<String>>,
    pub retry_count: Option<u32>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

impl TaskUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn result(mut self, result: TaskResult) -> Self {
        self.result = Some(Some(result));
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(Some(error.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn started_now(mut self) -> Self {
        self.started_at = Some(Some(Utc::now()));
        self
    }

    pub fn completed_now(mut self) -> Self {
        self.completed_at = Some(Some(Utc::now()));
        self
    }
}

/// Read-side view of a task returned by the boundary `get` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub meta: TaskMeta,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id,
            status: task.status,
            progress: task.progress,
            message: task.message.clone(),
            result: task.result.clone(),
            error: task.error.clone(),
            retry_count: task.retry_count,
            max_retries: task.max_retries,
            created_at: task.created_at,
            updated_at: task.updated_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
            meta: task.meta.clone(),
        }
    }
}
