//! Persistence layer: libSQL-backed task snapshots and generation history.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{HistoryRecord, HistoryStatus, HistoryStore, HistoryUpdate, SnapshotStore};
