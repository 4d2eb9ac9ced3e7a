use std::future::Future;

use crate::error::SnapshotResult;
use crate::generator::request::Snapshot;

/// Produces snapshots of database schemas.
///
/// A generator keeps no state between calls, so snapshots of different schemas may be created
/// concurrently. Callers snapshotting the same schema concurrently must coordinate themselves.
pub trait SnapshotGenerator {
    /// Creates the snapshot described by `snapshot`.
    fn create_snapshot(
        &self,
        snapshot: &Snapshot,
    ) -> impl Future<Output = SnapshotResult<()>> + Send;

    /// Releases the resources retained by the generator.
    ///
    /// Calling it more than once is allowed.
    fn close(&self) -> impl Future<Output = SnapshotResult<()>> + Send;
}
