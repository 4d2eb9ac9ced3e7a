use std::path::PathBuf;

use serde::Deserialize;

use crate::Config;
use crate::shared::{PgConnectionConfig, ValidationError};

fn default_pg_dump_path() -> PathBuf {
    PathBuf::from("pg_dump")
}

fn default_psql_path() -> PathBuf {
    PathBuf::from("psql")
}

fn default_pg_restore_path() -> PathBuf {
    PathBuf::from("pg_restore")
}

/// What to snapshot and which client binaries to use for it.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    /// Table patterns: `table`, `schema.table` or `schema.*`.
    pub tables: Vec<String>,
    #[serde(default = "default_pg_dump_path")]
    pub pg_dump_path: PathBuf,
    /// Used to apply plain format dumps.
    #[serde(default = "default_psql_path")]
    pub psql_path: PathBuf,
    #[serde(default = "default_pg_restore_path")]
    pub pg_restore_path: PathBuf,
}

impl SnapshotConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tables.is_empty() {
            return Err(ValidationError::NoTablesConfigured);
        }

        Ok(())
    }
}

/// Complete configuration of the snapshotter binary.
///
/// This intentionally does not implement `Serialize` to avoid leaking secrets.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotterConfig {
    /// Database the schemas are read from.
    pub source: PgConnectionConfig,
    /// Database the schemas are restored into.
    pub target: PgConnectionConfig,
    pub snapshot: SnapshotConfig,
}

impl SnapshotterConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.target.validate()?;
        self.snapshot.validate()
    }
}

impl Config for SnapshotterConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["snapshot.tables"];
}
