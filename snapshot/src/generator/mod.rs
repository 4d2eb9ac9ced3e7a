//! Schema snapshot generation.

mod base;
mod connect;
mod pg_dump_restore;
mod request;

pub use base::SnapshotGenerator;
pub use connect::{PostgresSnapshotGenerator, connect_snapshot_generator};
pub use pg_dump_restore::PgDumpRestoreSnapshotGenerator;
pub use request::{PUBLIC_SCHEMA, Snapshot, WILDCARD};
