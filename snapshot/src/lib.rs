//! Copies the structure of Postgres schemas from a source database to a target database.
//!
//! A [`generator::PgDumpRestoreSnapshotGenerator`] dumps the requested tables of a schema with
//! `pg_dump`, creates the schema on the target, restores the dump there and, when the
//! replication pipeline's schemalog is available, records the snapshot in it.
//!
//! The collaborators of the generator are traits ([`postgres::QuerierBuilder`],
//! [`dump::PgDump`], [`dump::PgRestore`] and [`schemalog::SchemaLogStore`]) so that each step
//! can be replaced, which the in-memory doubles in `test_utils` rely on.

pub mod dump;
pub mod error;
mod macros;
pub mod generator;
pub mod postgres;
pub mod schemalog;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
