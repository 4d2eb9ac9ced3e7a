use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// Nothing would be snapshotted.
    #[error("`snapshot.tables` must list at least one table pattern")]
    NoTablesConfigured,
    /// A required string setting is empty.
    #[error("`{0}` cannot be empty")]
    EmptyValue(&'static str),
}
