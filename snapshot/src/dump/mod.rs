//! Dump and restore of database schemas through the Postgres client binaries.

pub mod errors;
pub mod pg_dump;
pub mod pg_restore;

pub use errors::{PgRestoreError, PgRestoreErrors, PgRestoreIssue, RestoreIssueClass};
pub use pg_dump::{DumpFormat, PgDump, PgDumpCommand, PgDumpOptions};
pub use pg_restore::{PgRestore, PgRestoreCommand, PgRestoreOptions};
