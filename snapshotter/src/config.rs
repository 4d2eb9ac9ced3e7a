use anyhow::Context;
use snapshot_config::load_config;
use snapshot_config::shared::SnapshotterConfig;

/// Loads and validates the snapshotter configuration.
pub fn load_snapshotter_config() -> anyhow::Result<SnapshotterConfig> {
    let config = load_config::<SnapshotterConfig>().context("loading configuration")?;
    config.validate().context("validating configuration")?;

    Ok(config)
}
