use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::dump::errors::{PgRestoreError, PgRestoreErrors};
use crate::dump::pg_dump::{DumpFormat, client_command};
use crate::error::{ErrorKind, SnapshotError};
use crate::snapshot_error;

/// Name of the `psql` binary used to apply plain format dumps.
pub const PSQL_PROGRAM: &str = "psql";

/// Name of the `pg_restore` binary used to apply archive format dumps.
pub const PG_RESTORE_PROGRAM: &str = "pg_restore";

/// Options for applying a dump to a destination database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgRestoreOptions {
    pub connection_string: String,
    pub schema_only: bool,
    pub format: DumpFormat,
}

impl PgRestoreOptions {
    /// Renders the options as command line arguments for the program chosen by
    /// [`PgRestoreCommand`]: `psql` for plain dumps, `pg_restore` otherwise.
    ///
    /// `connection_string` replaces [`PgRestoreOptions::connection_string`].
    pub fn to_args(&self, connection_string: &str) -> Vec<String> {
        let mut args = vec![format!("--dbname={connection_string}")];

        match self.format {
            DumpFormat::Plain => {
                args.push("--no-psqlrc".to_string());
            }
            format => {
                args.push(format!("--format={}", format.as_str()));
                if self.schema_only {
                    args.push("--schema-only".to_string());
                }
            }
        }

        args
    }
}

/// Applies dumps to a destination database.
pub trait PgRestore: Send + Sync {
    /// Applies `dump` using `options`.
    ///
    /// Returns the diagnostic output of the restore. Errors reported by the server while applying
    /// the dump are returned as [`PgRestoreError::Issues`] so that callers can decide which of them
    /// matter.
    fn restore(
        &self,
        options: &PgRestoreOptions,
        dump: Bytes,
    ) -> impl Future<Output = Result<String, PgRestoreError>> + Send;
}

/// [`PgRestore`] implementation running `psql` or `pg_restore` with the dump on stdin.
#[derive(Debug, Clone)]
pub struct PgRestoreCommand {
    psql_program: PathBuf,
    pg_restore_program: PathBuf,
}

impl PgRestoreCommand {
    pub fn new(psql_program: impl Into<PathBuf>, pg_restore_program: impl Into<PathBuf>) -> Self {
        Self {
            psql_program: psql_program.into(),
            pg_restore_program: pg_restore_program.into(),
        }
    }

    fn program(&self, format: DumpFormat) -> &PathBuf {
        match format {
            DumpFormat::Plain => &self.psql_program,
            _ => &self.pg_restore_program,
        }
    }
}

impl Default for PgRestoreCommand {
    fn default() -> Self {
        Self::new(PSQL_PROGRAM, PG_RESTORE_PROGRAM)
    }
}

impl PgRestore for PgRestoreCommand {
    async fn restore(
        &self,
        options: &PgRestoreOptions,
        dump: Bytes,
    ) -> Result<String, PgRestoreError> {
        let program = self.program(options.format);
        debug!(
            program = %program.display(),
            format = options.format.as_str(),
            bytes = dump.len(),
            "applying dump"
        );

        let (mut command, connection_string) =
            client_command(program, &options.connection_string);
        let mut child = command
            .args(options.to_args(&connection_string))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SnapshotError::from)?;

        // Stdin is fed from a separate task so that a large dump can't deadlock against the
        // child filling its output pipes.
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                stdin.write_all(&dump).await?;
                stdin.shutdown().await
            })
        });

        let output = child.wait_with_output().await.map_err(SnapshotError::from)?;

        let write_result = match writer {
            Some(writer) => writer.await.map_err(|err| {
                snapshot_error!(
                    ErrorKind::RestoreFailed,
                    "Restore input task failed",
                    source: err
                )
            })?,
            None => Ok(()),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);

        let issues = PgRestoreErrors::from_output(&stderr);
        if !issues.is_empty() {
            return Err(PgRestoreError::Issues(issues));
        }

        if !output.status.success() {
            return Err(snapshot_error!(
                ErrorKind::RestoreFailed,
                "Restore command failed",
                format!("{}: {}", output.status, stderr.trim())
            )
            .into());
        }

        if let Err(err) = write_result {
            warn!(error = %err, "restore command exited before consuming the whole dump");
            return Err(SnapshotError::from(err).into());
        }

        Ok(stdout)
    }
}
