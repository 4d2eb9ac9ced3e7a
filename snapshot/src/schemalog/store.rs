use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SnapshotResult;

/// Schema holding the schemalog table.
pub const SCHEMA_LOG_SCHEMA_NAME: &str = "pgstream";

/// Table recording schema snapshots for the downstream replication pipeline.
pub const SCHEMA_LOG_TABLE_NAME: &str = "schema_log";

/// A row of the schemalog table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LogEntry {
    pub id: String,
    pub version: i64,
    pub schema_name: String,
    pub created_at: DateTime<Utc>,
    pub acked: bool,
}

/// Append-only log telling the replication pipeline where schema state starts.
///
/// The orchestrator only supplies the schema name; the content of each entry is owned by the
/// store.
pub trait SchemaLogStore: Send + Sync {
    /// Records that a snapshot of `schema_name` has been taken.
    fn insert(&self, schema_name: &str) -> impl Future<Output = SnapshotResult<LogEntry>> + Send;

    /// Releases the resources held by the store.
    ///
    /// Must be safe to call more than once. The default implementation is a no-op.
    fn close(&self) -> impl Future<Output = SnapshotResult<()>> + Send {
        async { Ok(()) }
    }
}
