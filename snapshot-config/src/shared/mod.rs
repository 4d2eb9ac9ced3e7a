//! Configuration types shared by the snapshot crates.

mod base;
mod connection;
mod snapshotter;

pub use base::ValidationError;
pub use connection::{
    IntoConnectOptions, PgConnectionConfig, PgConnectionOptions, SCHEMALOG_CONNECTION_OPTIONS,
    SNAPSHOT_CONNECTION_OPTIONS, TlsConfig, quote_connection_value,
};
pub use snapshotter::{SnapshotConfig, SnapshotterConfig};
