//! Postgres access used while taking snapshots.

pub mod client;
pub mod conninfo;
pub mod querier;

pub use client::{PgQuerier, PgQuerierBuilder};
pub use conninfo::{ConnInfo, split_password, split_root_cert};
pub use querier::{Querier, QuerierBuilder, RowScan, RowStream};
