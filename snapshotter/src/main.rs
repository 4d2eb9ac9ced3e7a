//! Schema snapshot binary.
//!
//! Copies the structure of the configured tables from the source database to the target database
//! and exits with a non-zero status if any schema could not be snapshotted.

use snapshot_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_snapshotter_config;
use crate::core::run_snapshots;

mod config;
mod core;

fn main() -> anyhow::Result<()> {
    let config = load_snapshotter_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    // Fails only when a provider is already installed, which is fine.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run_snapshots(config));

    if let Err(err) = &result {
        error!("schema snapshot failed: {err:#}");
    }

    result
}
