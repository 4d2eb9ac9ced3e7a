//! In-memory doubles for the collaborators of a snapshot generator.
//!
//! Every double is cheaply cloneable and shares its recorded calls between clones, so a test can
//! hand one clone to the code under test and keep another to inspect what happened. Handlers that
//! were not configured panic when invoked, which makes unexpected calls fail the test.

pub mod dump;
pub mod querier;
pub mod schemalog;
