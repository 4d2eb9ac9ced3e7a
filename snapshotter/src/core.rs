use snapshot::error::SnapshotResult;
use snapshot::generator::{Snapshot, SnapshotGenerator, connect_snapshot_generator};
use snapshot_config::shared::SnapshotterConfig;
use tracing::{error, info};

/// Snapshots every schema named by the configured table patterns.
pub async fn run_snapshots(config: SnapshotterConfig) -> anyhow::Result<()> {
    let snapshots = Snapshot::from_table_patterns(&config.snapshot.tables)?;

    info!(
        source = %config.source,
        target = %config.target,
        schemas = snapshots.len(),
        "starting schema snapshots"
    );

    let generator = connect_snapshot_generator(&config).await?;

    let result = create_snapshots(&generator, &snapshots).await;
    let close_result = generator.close().await;

    result?;
    close_result?;

    info!("all schema snapshots completed");

    Ok(())
}

/// Creates `snapshots` one after the other.
///
/// A failing schema does not stop the others; all failures are returned together.
pub async fn create_snapshots<G>(generator: &G, snapshots: &[Snapshot]) -> SnapshotResult<()>
where
    G: SnapshotGenerator,
{
    let mut errors = Vec::new();

    for snapshot in snapshots {
        match generator.create_snapshot(snapshot).await {
            Ok(()) => info!(
                schema_name = %snapshot.schema_name,
                tables = ?snapshot.table_names,
                "schema snapshot succeeded"
            ),
            Err(err) => {
                error!(
                    schema_name = %snapshot.schema_name,
                    error = %err,
                    "schema snapshot failed"
                );
                errors.push(err);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}
