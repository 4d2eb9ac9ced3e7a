//! Error types and result definitions for snapshot operations.
//!
//! Provides a single error type with classification, aggregation, and captured diagnostic
//! metadata. The [`SnapshotError`] type supports single errors, errors with additional detail,
//! and multiple aggregated errors, for example when several schemas fail in one run.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for snapshot operations using [`SnapshotError`] as the error type.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Detailed payload stored for single [`SnapshotError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for snapshot operations.
///
/// Cloning is cheap: sources and backtraces are reference counted, which lets test doubles hand
/// out the same error more than once.
#[derive(Debug, Clone)]
pub struct SnapshotError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors.
    Many {
        errors: Vec<SnapshotError>,
        location: &'static Location<'static>,
    },
}

/// Specific categories of errors that can occur while taking a snapshot.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection Errors
    ConnectionFailed,
    AuthenticationError,

    // Query & Execution Errors
    QueryFailed,
    PermissionDenied,
    LockTimeout,
    OperationCanceled,
    DatabaseShutdown,
    DatabaseInRecovery,

    // Schema Errors
    SchemaError,

    // Data & Transformation Errors
    ConversionError,
    InvalidData,
    ValidationError,

    // Dump & Restore Errors
    DumpFailed,
    RestoreFailed,
    /// The target database rejected part of a dump. The error source is the
    /// [`crate::dump::PgRestoreErrors`] left after dropping ignorable issues.
    DestinationRestoreFailed,

    // Bookkeeping Errors
    SchemaLogInsertFailed,

    // Configuration Errors
    ConfigError,

    // IO & Serialization Errors
    IoError,
    SerializationError,
    DeserializationError,

    // Security Errors
    EncryptionError,

    // State Errors
    InvalidState,

    // Unknown / Uncategorized
    Unknown,
}

impl SnapshotError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the static description of this error.
    ///
    /// Aggregated errors have no description of their own.
    pub fn description(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.description.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the aggregated errors, or an empty slice for single errors.
    pub fn errors(&self) -> &[SnapshotError] {
        match self.repr {
            ErrorRepr::Single(_) => &[],
            ErrorRepr::Many { ref errors, .. } => errors,
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward their first error as the source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }

        self
    }

    /// Creates a [`SnapshotError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        SnapshotError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for SnapshotError {
    fn eq(&self, other: &SnapshotError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => {
                a.kind == b.kind && a.description == b.description
            }
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => errors_a == errors_b,
            _ => false,
        }
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                write_detail(payload.detail.as_deref(), f, 1)?;
                write_backtrace(payload.backtrace.as_ref(), f, 1)?;

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if errors.is_empty() {
                    write!(f, "\n  (no inner errors provided)")?;
                }

                for (index, error) in errors.iter().enumerate() {
                    let rendered = format!("{error}");
                    let mut lines = rendered.lines();
                    if let Some(first_line) = lines.next() {
                        write!(f, "\n  {}. {}", index + 1, first_line)?;
                    } else {
                        write!(f, "\n  {}.", index + 1)?;
                    }

                    for line in lines {
                        if line.is_empty() {
                            write!(f, "\n     ")?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            // For aggregated errors, we forward the first contained error as the source.
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Writes the captured backtrace with indentation.
fn write_backtrace(
    backtrace: &Backtrace,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    let indent_str = "  ".repeat(indent);

    let rendered_backtrace = format!("{backtrace}");
    if !rendered_backtrace.trim().is_empty() {
        write!(f, "\n{indent_str}Backtrace:")?;
        for line in rendered_backtrace.lines() {
            if line.trim().is_empty() {
                write!(f, "\n{indent_str}  ")?;
            } else {
                write!(f, "\n{indent_str}  {line}")?;
            }
        }
    }

    Ok(())
}

/// Writes the detail block with indentation.
fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    if let Some(detail) = detail {
        let indent_str = "  ".repeat(indent);
        if detail.trim().is_empty() {
            write!(f, "\n{indent_str}Detail: <empty>")?;
        } else {
            write!(f, "\n{indent_str}Detail:")?;
            for line in detail.lines() {
                if line.trim().is_empty() {
                    write!(f, "\n{indent_str}  ")?;
                } else {
                    write!(f, "\n{indent_str}  {line}")?;
                }
            }
        }
    }

    Ok(())
}

/// Creates a [`SnapshotError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for SnapshotError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> SnapshotError {
        SnapshotError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`SnapshotError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for SnapshotError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> SnapshotError {
        SnapshotError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates a [`SnapshotError`] from a vector of errors for aggregation.
///
/// If the vector contains exactly one error, returns that error directly.
impl<E> From<Vec<E>> for SnapshotError
where
    E: Into<SnapshotError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> SnapshotError {
        let location = Location::caller();

        let mut errors: Vec<SnapshotError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        SnapshotError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`std::io::Error`] to [`SnapshotError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for SnapshotError {
    #[track_caller]
    fn from(err: std::io::Error) -> SnapshotError {
        let detail = err.to_string();
        SnapshotError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`serde_json::Error`] to [`SnapshotError`] with the appropriate error kind.
impl From<serde_json::Error> for SnapshotError {
    #[track_caller]
    fn from(err: serde_json::Error) -> SnapshotError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        SnapshotError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`std::string::FromUtf8Error`] to [`SnapshotError`] with [`ErrorKind::ConversionError`].
impl From<std::string::FromUtf8Error> for SnapshotError {
    #[track_caller]
    fn from(err: std::string::FromUtf8Error) -> SnapshotError {
        let detail = err.to_string();
        SnapshotError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("UTF-8 string conversion failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`tokio_postgres::Error`] to [`SnapshotError`] with the appropriate error kind.
///
/// Maps errors based on Postgres SQLSTATE codes. Errors without a SQLSTATE come from the client
/// side of the connection and are classified as connection failures.
impl From<tokio_postgres::Error> for SnapshotError {
    #[track_caller]
    fn from(err: tokio_postgres::Error) -> SnapshotError {
        let (kind, description) = match err.code() {
            Some(sqlstate) => {
                use tokio_postgres::error::SqlState;

                match *sqlstate {
                    // Connection errors (08xxx)
                    SqlState::CONNECTION_EXCEPTION
                    | SqlState::CONNECTION_DOES_NOT_EXIST
                    | SqlState::CONNECTION_FAILURE
                    | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
                    | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION
                    | SqlState::TOO_MANY_CONNECTIONS => (
                        ErrorKind::ConnectionFailed,
                        "PostgreSQL connection failed",
                    ),

                    // Authentication errors (28xxx)
                    SqlState::INVALID_AUTHORIZATION_SPECIFICATION | SqlState::INVALID_PASSWORD => (
                        ErrorKind::AuthenticationError,
                        "PostgreSQL authentication failed",
                    ),

                    SqlState::INSUFFICIENT_PRIVILEGE => (
                        ErrorKind::PermissionDenied,
                        "PostgreSQL permission denied",
                    ),

                    // Schema/object errors (42xxx, 3Fxxx)
                    SqlState::UNDEFINED_TABLE
                    | SqlState::UNDEFINED_COLUMN
                    | SqlState::UNDEFINED_FUNCTION
                    | SqlState::UNDEFINED_SCHEMA
                    | SqlState::INVALID_SCHEMA_NAME => (
                        ErrorKind::SchemaError,
                        "PostgreSQL schema object not found",
                    ),

                    // Data conversion errors (22xxx)
                    SqlState::DATA_EXCEPTION | SqlState::INVALID_TEXT_REPRESENTATION => (
                        ErrorKind::ConversionError,
                        "PostgreSQL data conversion failed",
                    ),

                    // Operator intervention errors (57xxx)
                    SqlState::QUERY_CANCELED | SqlState::OPERATOR_INTERVENTION => (
                        ErrorKind::OperationCanceled,
                        "PostgreSQL operation canceled",
                    ),
                    SqlState::ADMIN_SHUTDOWN | SqlState::CRASH_SHUTDOWN => (
                        ErrorKind::DatabaseShutdown,
                        "PostgreSQL database shutdown",
                    ),
                    SqlState::CANNOT_CONNECT_NOW => (
                        ErrorKind::DatabaseInRecovery,
                        "PostgreSQL database in recovery",
                    ),

                    SqlState::LOCK_NOT_AVAILABLE => {
                        (ErrorKind::LockTimeout, "PostgreSQL lock not available")
                    }

                    // Default for other SQL states
                    _ => (ErrorKind::QueryFailed, "PostgreSQL query failed"),
                }
            }
            // No SQL state means connection issue
            None => (
                ErrorKind::ConnectionFailed,
                "PostgreSQL connection failed",
            ),
        };

        let detail = err.to_string();
        SnapshotError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`sqlx::Error`] to [`SnapshotError`] with the appropriate error kind.
impl From<sqlx::Error> for SnapshotError {
    #[track_caller]
    fn from(err: sqlx::Error) -> SnapshotError {
        let kind = match &err {
            sqlx::Error::Database(_) => ErrorKind::QueryFailed,
            sqlx::Error::Io(_) => ErrorKind::IoError,
            sqlx::Error::Tls(_) => ErrorKind::EncryptionError,
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => ErrorKind::ConnectionFailed,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                ErrorKind::ConversionError
            }
            _ => ErrorKind::QueryFailed,
        };

        let detail = err.to_string();
        SnapshotError::from_components(
            kind,
            Cow::Borrowed("Database operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`rustls::Error`] to [`SnapshotError`] with [`ErrorKind::EncryptionError`].
impl From<rustls::Error> for SnapshotError {
    #[track_caller]
    fn from(err: rustls::Error) -> SnapshotError {
        let detail = err.to_string();
        SnapshotError::from_components(
            ErrorKind::EncryptionError,
            Cow::Borrowed("TLS configuration failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn single_error_exposes_kind_description_and_detail() {
        let err = SnapshotError::from((ErrorKind::DumpFailed, "pg_dump failed", "exit code 1"));

        assert_eq!(err.kind(), ErrorKind::DumpFailed);
        assert_eq!(err.description(), Some("pg_dump failed"));
        assert_eq!(err.detail(), Some("exit code 1"));
        assert!(err.errors().is_empty());
    }

    #[test]
    fn source_is_preserved_across_clones() {
        let cause = SnapshotError::from((ErrorKind::QueryFailed, "boom"));
        let err = SnapshotError::from((ErrorKind::SchemaLogInsertFailed, "wrapped"))
            .with_source(cause.clone());

        let cloned = err.clone();
        let source = cloned
            .source()
            .and_then(|source| source.downcast_ref::<SnapshotError>())
            .expect("source should be a snapshot error");

        assert_eq!(source, &cause);
    }

    #[test]
    fn single_element_vector_is_not_wrapped() {
        let err = SnapshotError::from(vec![SnapshotError::from((
            ErrorKind::ConnectionFailed,
            "connection failed",
        ))]);

        assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
        assert!(err.errors().is_empty());
    }

    #[test]
    fn aggregated_errors_report_all_kinds() {
        let err = SnapshotError::from(vec![
            SnapshotError::from((ErrorKind::DumpFailed, "dump failed")),
            SnapshotError::from((ErrorKind::RestoreFailed, "restore failed")),
        ]);

        assert_eq!(err.kind(), ErrorKind::DumpFailed);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::DumpFailed, ErrorKind::RestoreFailed]
        );
        assert_eq!(err.errors().len(), 2);
        assert!(err.to_string().starts_with("[Many] 2 errors aggregated"));
    }
}
