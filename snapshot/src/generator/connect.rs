use std::io::Write;

use snapshot_config::shared::{PgConnectionConfig, SNAPSHOT_CONNECTION_OPTIONS, SnapshotterConfig};
use tempfile::NamedTempFile;
use tracing::info;

use crate::dump::{PgDumpCommand, PgRestoreCommand};
use crate::error::SnapshotResult;
use crate::generator::base::SnapshotGenerator;
use crate::generator::pg_dump_restore::PgDumpRestoreSnapshotGenerator;
use crate::generator::request::Snapshot;
use crate::postgres::PgQuerierBuilder;
use crate::schemalog::PostgresSchemaLogStore;

/// Generator wired to real Postgres databases and client binaries.
///
/// Owns the trusted root certificate files its connection strings point to. They are removed
/// when the generator is dropped.
#[derive(Debug)]
pub struct PostgresSnapshotGenerator {
    generator: PgDumpRestoreSnapshotGenerator<
        PgQuerierBuilder,
        PgDumpCommand,
        PgRestoreCommand,
        PostgresSchemaLogStore,
    >,
    _root_cert_files: Vec<NamedTempFile>,
}

impl PostgresSnapshotGenerator {
    pub fn has_schemalog_store(&self) -> bool {
        self.generator.has_schemalog_store()
    }
}

impl SnapshotGenerator for PostgresSnapshotGenerator {
    async fn create_snapshot(&self, snapshot: &Snapshot) -> SnapshotResult<()> {
        self.generator.create_snapshot(snapshot).await
    }

    async fn close(&self) -> SnapshotResult<()> {
        self.generator.close().await
    }
}

/// Writes the trusted roots of `config` to a PEM file when TLS is enabled.
fn root_cert_file(config: &PgConnectionConfig) -> SnapshotResult<Option<NamedTempFile>> {
    if !config.tls.enabled {
        return Ok(None);
    }

    let mut file = tempfile::Builder::new()
        .prefix("snapshot-root-certs-")
        .suffix(".pem")
        .tempfile()?;
    file.write_all(config.tls.trusted_root_certs.as_bytes())?;
    file.flush()?;

    Ok(Some(file))
}

/// Renders the connection string used for `config` by both the catalog connections and the
/// client binaries.
///
/// Returns the root certificate file the string points to, which must outlive every use of it.
fn connection_string(
    config: &PgConnectionConfig,
) -> SnapshotResult<(String, Option<NamedTempFile>)> {
    let root_cert_file = root_cert_file(config)?;
    let connection_string = config.to_connection_string(
        Some(&SNAPSHOT_CONNECTION_OPTIONS),
        root_cert_file.as_ref().map(NamedTempFile::path),
    );

    Ok((connection_string, root_cert_file))
}

/// Creates the generator described by `config`.
///
/// Each database is verified against its own trusted roots. Snapshots are recorded in the
/// schemalog only when its table exists on the source database.
pub async fn connect_snapshot_generator(
    config: &SnapshotterConfig,
) -> SnapshotResult<PostgresSnapshotGenerator> {
    let (source_url, source_root_certs) = connection_string(&config.source)?;
    let (target_url, target_root_certs) = connection_string(&config.target)?;

    let mut generator = PgDumpRestoreSnapshotGenerator::new(
        source_url,
        target_url,
        PgQuerierBuilder::new(),
        PgDumpCommand::new(config.snapshot.pg_dump_path.clone()),
        PgRestoreCommand::new(
            config.snapshot.psql_path.clone(),
            config.snapshot.pg_restore_path.clone(),
        ),
    );

    if generator.schemalog_exists().await? {
        let store = PostgresSchemaLogStore::connect(&config.source).await?;
        info!(source = %config.source, "recording snapshots in the schemalog");
        generator = generator.with_schemalog_store(store);
    } else {
        info!(
            source = %config.source,
            "schemalog table not found on source, snapshots won't be recorded"
        );
    }

    Ok(PostgresSnapshotGenerator {
        generator,
        _root_cert_files: source_root_certs
            .into_iter()
            .chain(target_root_certs)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use snapshot_config::shared::TlsConfig;

    use super::*;
    use crate::postgres::ConnInfo;

    const ROOT_CERTS: &str = "-----BEGIN CERTIFICATE-----\nMIIBsource\n-----END CERTIFICATE-----\n";

    fn config(tls: TlsConfig) -> PgConnectionConfig {
        PgConnectionConfig {
            host: "db.internal".to_string(),
            port: 5432,
            name: "app".to_string(),
            username: "postgres".to_string(),
            password: Some("secret".to_string().into()),
            tls,
        }
    }

    #[test]
    fn tls_connection_verifies_against_its_own_roots() {
        let config = config(TlsConfig {
            trusted_root_certs: ROOT_CERTS.to_string(),
            enabled: true,
        });

        let (connection_string, root_cert_file) = connection_string(&config).unwrap();
        let root_cert_file = root_cert_file.expect("a root certificate file should be written");

        assert_eq!(
            std::fs::read_to_string(root_cert_file.path()).unwrap(),
            ROOT_CERTS
        );

        let conninfo = ConnInfo::parse(&connection_string).unwrap();
        assert_eq!(conninfo.get("sslmode"), Some("verify-full"));
        assert_eq!(
            conninfo.get("sslrootcert"),
            root_cert_file.path().to_str()
        );
    }

    #[test]
    fn plain_connection_writes_no_root_certs() {
        let (connection_string, root_cert_file) =
            connection_string(&config(TlsConfig::disabled())).unwrap();

        assert!(root_cert_file.is_none());

        let conninfo = ConnInfo::parse(&connection_string).unwrap();
        assert_eq!(conninfo.get("sslmode"), Some("prefer"));
        assert_eq!(conninfo.get("sslrootcert"), None);
    }
}
