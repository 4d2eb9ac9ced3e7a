use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::error::{SnapshotError, SnapshotResult};
use crate::schemalog::{LogEntry, SchemaLogStore};

type InsertHandler = Arc<dyn Fn(&str) -> SnapshotResult<LogEntry> + Send + Sync>;

/// Builds the entry a store would return for the `version`-th snapshot of `schema_name`.
pub fn log_entry(schema_name: &str, version: i64) -> LogEntry {
    LogEntry {
        id: format!("{schema_name}-{version}"),
        version,
        schema_name: schema_name.to_string(),
        created_at: Utc::now(),
        acked: false,
    }
}

/// [`SchemaLogStore`] answering through a handler and recording inserts and closes.
#[derive(Clone)]
pub struct MockSchemaLogStore {
    handler: InsertHandler,
    inserts: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl MockSchemaLogStore {
    pub fn new<F>(handler: F) -> MockSchemaLogStore
    where
        F: Fn(&str) -> SnapshotResult<LogEntry> + Send + Sync + 'static,
    {
        MockSchemaLogStore {
            handler: Arc::new(handler),
            inserts: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn succeeding() -> MockSchemaLogStore {
        MockSchemaLogStore::new(|schema_name| Ok(log_entry(schema_name, 1)))
    }

    pub fn failing(error: SnapshotError) -> MockSchemaLogStore {
        MockSchemaLogStore::new(move |_| Err(error.clone()))
    }

    /// Panics on any insert.
    pub fn unexpected() -> MockSchemaLogStore {
        MockSchemaLogStore::new(|schema_name| panic!("unexpected schemalog insert for {schema_name}"))
    }

    /// Returns the schema names passed to [`SchemaLogStore::insert`], in order.
    pub fn inserted_schemas(&self) -> Vec<String> {
        self.inserts.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MockSchemaLogStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockSchemaLogStore")
            .field("inserts", &self.inserted_schemas())
            .field("closes", &self.close_calls())
            .finish_non_exhaustive()
    }
}

impl SchemaLogStore for MockSchemaLogStore {
    async fn insert(&self, schema_name: &str) -> SnapshotResult<LogEntry> {
        self.inserts.lock().unwrap().push(schema_name.to_string());

        (self.handler)(schema_name)
    }

    async fn close(&self) -> SnapshotResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}
