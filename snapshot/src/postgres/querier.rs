use std::future::Future;

use futures::stream::BoxStream;

use crate::error::SnapshotResult;

/// A single row returned by a [`Querier`], read column by column.
///
/// Reading a column can fail independently of the query that produced the row, for example when
/// the column type does not match the requested Rust type.
pub trait RowScan: Send {
    /// Reads the column at `index` as text.
    fn scan_string(&self, index: usize) -> SnapshotResult<String>;

    /// Reads the column at `index` as a boolean.
    fn scan_bool(&self, index: usize) -> SnapshotResult<bool>;
}

/// Stream of rows produced by [`Querier::query`].
///
/// Errors surfaced while iterating (after the query itself was accepted) are yielded as items.
pub type RowStream = BoxStream<'static, SnapshotResult<Box<dyn RowScan>>>;

/// A query-capable handle on a single Postgres database.
///
/// All parameters are sent as text, which covers every catalog lookup performed while taking a
/// snapshot.
pub trait Querier: Send + Sync {
    /// Executes a statement and returns the number of affected rows.
    fn exec(&self, query: &str, params: &[&str]) -> impl Future<Output = SnapshotResult<u64>> + Send;

    /// Runs a query and returns its rows as a stream.
    fn query(
        &self,
        query: &str,
        params: &[&str],
    ) -> impl Future<Output = SnapshotResult<RowStream>> + Send;

    /// Runs a query expected to return exactly one row.
    fn query_row(
        &self,
        query: &str,
        params: &[&str],
    ) -> impl Future<Output = SnapshotResult<Box<dyn RowScan>>> + Send;
}

/// Builds [`Querier`]s from connection strings.
///
/// The same builder is used for both the source and the target database, only the connection
/// string differs.
pub trait QuerierBuilder: Send + Sync {
    type Querier: Querier;

    /// Opens a new connection described by `connection_string`.
    fn connect(
        &self,
        connection_string: &str,
    ) -> impl Future<Output = SnapshotResult<Self::Querier>> + Send;
}
