use std::fmt;

use thiserror::Error;

use crate::error::SnapshotError;

/// Marker preceding the server message in `psql` and `pg_restore` error lines.
const ERROR_MARKER: &str = "ERROR:";

/// Suffix of the messages Postgres emits when a `CREATE` hits an existing object.
const ALREADY_EXISTS: &str = "already exists";

/// How a [`PgRestoreIssue`] affects the outcome of a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreIssueClass {
    /// Expected when restoring into a database that already holds the objects.
    Ignorable,
    /// Anything else.
    Fatal,
}

/// A single error reported while applying a dump.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PgRestoreIssue {
    /// The restored object is already present on the destination.
    #[error("{message}")]
    RelationAlreadyExists { message: String },
    /// Any other error reported by the server.
    #[error("{message}")]
    Other { message: String },
}

impl PgRestoreIssue {
    /// Builds an issue from a server error message.
    pub fn from_message(message: impl Into<String>) -> PgRestoreIssue {
        let message = message.into();
        if message.contains(ALREADY_EXISTS) {
            PgRestoreIssue::RelationAlreadyExists { message }
        } else {
            PgRestoreIssue::Other { message }
        }
    }

    /// Parses one line of restore output, returning [`None`] when the line is not an error.
    pub fn from_output_line(line: &str) -> Option<PgRestoreIssue> {
        let (_, message) = line.split_once(ERROR_MARKER)?;
        let message = message.trim();
        if message.is_empty() {
            return None;
        }

        Some(PgRestoreIssue::from_message(message))
    }

    /// Classifies the issue.
    pub fn class(&self) -> RestoreIssueClass {
        match self {
            PgRestoreIssue::RelationAlreadyExists { .. } => RestoreIssueClass::Ignorable,
            PgRestoreIssue::Other { .. } => RestoreIssueClass::Fatal,
        }
    }

    /// Returns the server message.
    pub fn message(&self) -> &str {
        match self {
            PgRestoreIssue::RelationAlreadyExists { message } | PgRestoreIssue::Other { message } => {
                message
            }
        }
    }
}

/// Ordered list of issues reported by a single restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgRestoreErrors {
    issues: Vec<PgRestoreIssue>,
}

impl PgRestoreErrors {
    pub fn new(issues: Vec<PgRestoreIssue>) -> PgRestoreErrors {
        PgRestoreErrors { issues }
    }

    /// Collects every error line found in the output of `psql` or `pg_restore`.
    pub fn from_output(output: &str) -> PgRestoreErrors {
        let issues = output
            .lines()
            .filter_map(PgRestoreIssue::from_output_line)
            .collect();

        PgRestoreErrors { issues }
    }

    pub fn issues(&self) -> &[PgRestoreIssue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Drops ignorable issues, returning the remaining ones if there are any.
    pub fn into_fatal(self) -> Option<PgRestoreErrors> {
        let issues: Vec<_> = self
            .issues
            .into_iter()
            .filter(|issue| issue.class() == RestoreIssueClass::Fatal)
            .collect();

        if issues.is_empty() {
            None
        } else {
            Some(PgRestoreErrors { issues })
        }
    }
}

impl fmt::Display for PgRestoreErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.issues.len();
        write!(
            f,
            "{} error{} during restore",
            count,
            if count == 1 { "" } else { "s" }
        )?;

        for issue in &self.issues {
            write!(f, "\n{issue}")?;
        }

        Ok(())
    }
}

impl std::error::Error for PgRestoreErrors {}

impl FromIterator<PgRestoreIssue> for PgRestoreErrors {
    fn from_iter<I: IntoIterator<Item = PgRestoreIssue>>(iter: I) -> Self {
        PgRestoreErrors::new(iter.into_iter().collect())
    }
}

/// Failure returned by a [`crate::dump::PgRestore`] implementation.
#[derive(Debug, Clone, Error)]
pub enum PgRestoreError {
    /// The restore ran and the server reported one or more errors.
    #[error(transparent)]
    Issues(PgRestoreErrors),
    /// The restore could not be carried out.
    #[error(transparent)]
    Failed(SnapshotError),
}

impl From<PgRestoreErrors> for PgRestoreError {
    fn from(errors: PgRestoreErrors) -> Self {
        PgRestoreError::Issues(errors)
    }
}

impl From<SnapshotError> for PgRestoreError {
    fn from(error: SnapshotError) -> Self {
        PgRestoreError::Failed(error)
    }
}
