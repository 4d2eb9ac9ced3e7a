use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use bytes::Bytes;
use tokio::process::Command;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, SnapshotResult};
use crate::postgres::split_password;

/// Name of the `pg_dump` binary looked up on `PATH` by default.
pub const PG_DUMP_PROGRAM: &str = "pg_dump";

/// Environment variable libpq reads the password from.
const PGPASSWORD_ENV: &str = "PGPASSWORD";

/// Prepares a Postgres client binary connecting with `connection_string`.
///
/// The password is moved out of the connection string into `PGPASSWORD`, since command lines are
/// visible to every local user.
pub(crate) fn client_command(program: &Path, connection_string: &str) -> (Command, String) {
    let (connection_string, password) = split_password(connection_string);

    let mut command = Command::new(program);
    if let Some(password) = password {
        command.env(PGPASSWORD_ENV, password);
    }

    (command, connection_string)
}

/// Output format of a dump, matching the `--format` values understood by `pg_dump`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DumpFormat {
    /// Plain SQL script.
    #[default]
    Plain,
    /// Custom archive, restorable with `pg_restore`.
    Custom,
    /// Directory archive.
    Directory,
    /// Tar archive.
    Tar,
}

impl DumpFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DumpFormat::Plain => "p",
            DumpFormat::Custom => "c",
            DumpFormat::Directory => "d",
            DumpFormat::Tar => "t",
        }
    }
}

/// Options for a single `pg_dump` run.
///
/// Schema and table names are expected to be quoted identifiers already.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgDumpOptions {
    pub connection_string: String,
    pub format: DumpFormat,
    pub clean: bool,
    pub schema_only: bool,
    pub schemas: Vec<String>,
    pub exclude_tables: Vec<String>,
}

impl PgDumpOptions {
    /// Renders the options as `pg_dump` command line arguments, connecting with
    /// `connection_string` instead of [`PgDumpOptions::connection_string`].
    pub fn to_args(&self, connection_string: &str) -> Vec<String> {
        let mut args = vec![
            format!("--dbname={connection_string}"),
            format!("--format={}", self.format.as_str()),
        ];

        if self.schema_only {
            args.push("--schema-only".to_string());
        }
        if self.clean {
            args.push("--clean".to_string());
        }

        args.extend(self.schemas.iter().map(|schema| format!("--schema={schema}")));
        args.extend(
            self.exclude_tables
                .iter()
                .map(|table| format!("--exclude-table={table}")),
        );

        args
    }
}

/// Produces dumps of a source database.
pub trait PgDump: Send + Sync {
    /// Runs a dump described by `options` and returns its bytes.
    fn dump(&self, options: &PgDumpOptions) -> impl Future<Output = SnapshotResult<Bytes>> + Send;
}

/// [`PgDump`] implementation running the `pg_dump` binary.
#[derive(Debug, Clone)]
pub struct PgDumpCommand {
    program: PathBuf,
}

impl PgDumpCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PgDumpCommand {
    fn default() -> Self {
        Self::new(PG_DUMP_PROGRAM)
    }
}

impl PgDump for PgDumpCommand {
    async fn dump(&self, options: &PgDumpOptions) -> SnapshotResult<Bytes> {
        // The arguments carry the connection string, so only the shape of the dump is logged.
        debug!(
            program = %self.program.display(),
            schemas = ?options.schemas,
            excluded_tables = options.exclude_tables.len(),
            "running pg_dump"
        );

        let (mut command, connection_string) =
            client_command(&self.program, &options.connection_string);
        let output = command
            .args(options.to_args(&connection_string))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            bail!(
                ErrorKind::DumpFailed,
                "pg_dump failed",
                format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )
            );
        }

        debug!(bytes = output.stdout.len(), "pg_dump finished");

        Ok(Bytes::from(output.stdout))
    }
}
