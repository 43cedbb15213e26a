//! libSQL backend for task snapshots and generation history.
//!
//! Supports local file and in-memory databases. One connection is shared
//! for all operations.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    HistoryRecord, HistoryStatus, HistoryStore, HistoryUpdate, SnapshotStore,
};
use crate::tasks::model::{GenerationMode, Task};

/// libSQL database backend.
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn task_from_json(data: &str) -> Result<Task, DatabaseError> {
    serde_json::from_str(data)
        .map_err(|e| DatabaseError::Serialization(format!("task snapshot: {e}")))
}

fn url_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn url_list_json(urls: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(urls).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn parse_mode(s: &str) -> Option<GenerationMode> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
}

/// Map a libsql Row to a HistoryRecord.
///
/// Column order matches HISTORY_COLUMNS.
fn row_to_history(row: &libsql::Row) -> Result<HistoryRecord, libsql::Error> {
    let id_str: String = row.get(0)?;
    let task_id: String = row.get(1)?;
    let user_id: String = row.get(2)?;
    let mode_str: Option<String> = row.get(3).ok();
    let original: String = row.get(4)?;
    let generated: String = row.get(5)?;
    let status: String = row.get(6)?;
    let created: String = row.get(7)?;
    let updated: String = row.get(8)?;

    Ok(HistoryRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        task_id,
        user_id,
        mode: mode_str.as_deref().and_then(parse_mode),
        original_image_urls: url_list(&original),
        generated_image_urls: url_list(&generated),
        status: HistoryStatus::parse(&status),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

const HISTORY_COLUMNS: &str = "id, task_id, user_id, mode, original_image_urls, \
     generated_image_urls, status, created_at, updated_at";

// ── Snapshots ───────────────────────────────────────────────────────

#[async_trait]
impl SnapshotStore for LibSqlBackend {
    async fn save_task(&self, task: &Task) -> Result<(), DatabaseError> {
        let data = serde_json::to_string(task)
            .map_err(|e| DatabaseError::Serialization(format!("task snapshot: {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO task_snapshots (id, status, user_id, data, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    data = excluded.data,
                    updated_at = excluded.updated_at",
                params![
                    task.id.to_string(),
                    task.status.to_string(),
                    task.meta.user_id.clone(),
                    data,
                    task.created_at.to_rfc3339(),
                    task.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_task: {e}")))?;

        debug!(task_id = %task.id, status = %task.status, "Task snapshot saved");
        Ok(())
    }

    async fn load_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT data FROM task_snapshots WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_task: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let data: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("load_task row parse: {e}")))?;
                Ok(Some(task_from_json(&data)?))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_task: {e}"))),
        }
    }

    async fn delete_task(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM task_snapshots WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_task: {e}")))?;
        Ok(())
    }

    async fn load_all_tasks(&self) -> Result<Vec<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT id, data FROM task_snapshots ORDER BY created_at", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("load_all_tasks: {e}")))?;

        let mut tasks = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load_all_tasks: {e}")))?
        {
            let id: String = row.get(0).unwrap_or_default();
            let data: String = match row.get(1) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(task_id = %id, error = %e, "Skipping unreadable snapshot row");
                    continue;
                }
            };
            match task_from_json(&data) {
                Ok(task) => tasks.push(task),
                Err(e) => tracing::warn!(task_id = %id, error = %e, "Skipping corrupt snapshot"),
            }
        }
        Ok(tasks)
    }
}

// ── History ─────────────────────────────────────────────────────────

#[async_trait]
impl HistoryStore for LibSqlBackend {
    async fn insert(&self, record: &HistoryRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO generation_history ({HISTORY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    record.id.to_string(),
                    record.task_id.clone(),
                    record.user_id.clone(),
                    opt_text_owned(record.mode.map(|m| m.to_string())),
                    url_list_json(&record.original_image_urls)?,
                    url_list_json(&record.generated_image_urls)?,
                    record.status.as_str(),
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_history: {e}")))?;

        debug!(record_id = %record.id, task_id = %record.task_id, "History record inserted");
        Ok(())
    }

    async fn get_by_task_id(&self, task_id: &str) -> Result<Option<HistoryRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {HISTORY_COLUMNS} FROM generation_history
                     WHERE task_id = ?1 ORDER BY created_at DESC LIMIT 1"
                ),
                params![task_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_history_by_task_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let record = row_to_history(&row).map_err(|e| {
                    DatabaseError::Query(format!("get_history_by_task_id row parse: {e}"))
                })?;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_history_by_task_id: {e}"))),
        }
    }

    async fn update(&self, record_id: Uuid, update: HistoryUpdate) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let affected = match update.images {
            Some(images) => self
                .conn()
                .execute(
                    "UPDATE generation_history
                     SET generated_image_urls = ?1, status = ?2, updated_at = ?3
                     WHERE id = ?4",
                    params![
                        url_list_json(&images)?,
                        update.status.as_str(),
                        now,
                        record_id.to_string()
                    ],
                )
                .await,
            None => self
                .conn()
                .execute(
                    "UPDATE generation_history SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![update.status.as_str(), now, record_id.to_string()],
                )
                .await,
        }
        .map_err(|e| DatabaseError::Query(format!("update_history: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "generation_history".into(),
                id: record_id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::model::{TaskParams, TaskUpdate};
    use crate::tasks::state::TaskStatus;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn sample_task(user: &str) -> Task {
        Task::new(
            TaskParams::new(
                GenerationMode::Puzzle,
                user,
                vec!["a.jpg".into(), "b.jpg".into()],
            ),
            2,
        )
    }

    #[tokio::test]
    async fn snapshot_save_and_load() {
        let db = test_db().await;
        let task = sample_task("u1");
        db.save_task(&task).await.unwrap();

        let loaded = db.load_task(task.id).await.unwrap().unwrap();
        assert_eq!(loaded, task);
    }

    #[tokio::test]
    async fn snapshot_save_overwrites() {
        let db = test_db().await;
        let mut task = sample_task("u1");
        db.save_task(&task).await.unwrap();

        task.apply(TaskUpdate::new().status(TaskStatus::Processing).progress(10));
        db.save_task(&task).await.unwrap();

        let loaded = db.load_task(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Processing);
        assert_eq!(loaded.progress, 10);
        assert_eq!(db.load_all_tasks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn snapshot_delete_and_missing() {
        let db = test_db().await;
        let task = sample_task("u1");
        db.save_task(&task).await.unwrap();
        db.delete_task(task.id).await.unwrap();

        assert!(db.load_task(task.id).await.unwrap().is_none());
        // Deleting twice is fine
        db.delete_task(task.id).await.unwrap();
    }

    #[tokio::test]
    async fn history_insert_lookup_update() {
        let db = test_db().await;
        let task = sample_task("u2");
        let record = HistoryRecord::for_submission(&task);
        db.insert(&record).await.unwrap();

        let found = db
            .get_by_task_id(&task.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, record.id);
        assert_eq!(found.status, HistoryStatus::Pending);
        assert_eq!(found.mode, Some(GenerationMode::Puzzle));
        assert_eq!(found.original_image_urls, vec!["a.jpg", "b.jpg"]);

        db.update(
            record.id,
            HistoryUpdate {
                images: Some(vec!["r1.jpg".into()]),
                status: HistoryStatus::Completed,
            },
        )
        .await
        .unwrap();

        let updated = db
            .get_by_task_id(&task.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, HistoryStatus::Completed);
        assert_eq!(updated.generated_image_urls, vec!["r1.jpg"]);
    }

    #[tokio::test]
    async fn history_update_missing_record() {
        let db = test_db().await;
        let err = db
            .update(
                Uuid::new_v4(),
                HistoryUpdate {
                    images: None,
                    status: HistoryStatus::Failed,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }
}
