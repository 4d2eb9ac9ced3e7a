//! Bookkeeping log consumed by the replication pipeline.

pub mod postgres;
pub mod store;

pub use postgres::PostgresSchemaLogStore;
pub use store::{LogEntry, SCHEMA_LOG_SCHEMA_NAME, SCHEMA_LOG_TABLE_NAME, SchemaLogStore};
