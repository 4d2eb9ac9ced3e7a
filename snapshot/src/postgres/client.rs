use std::io::BufReader;

use futures::StreamExt;
use rustls::ClientConfig;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config, Connection, NoTls, Row, Socket};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{Instrument, debug, error, info};

use crate::error::{ErrorKind, SnapshotError, SnapshotResult};
use crate::postgres::conninfo::split_root_cert;
use crate::postgres::querier::{Querier, QuerierBuilder, RowScan, RowStream};
use crate::snapshot_error;

/// Spawns a background task to monitor a Postgres connection until it terminates.
fn spawn_postgres_connection<T>(connection: Connection<Socket, T::Stream>)
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let span = tracing::Span::current();
    let task = async move {
        let result = connection.await;

        match result {
            Err(err) => error!("an error occurred during the postgres connection: {}", err),
            Ok(()) => debug!("postgres connection terminated successfully"),
        }
    }
    .instrument(span);

    // The connection is terminated by dropping the `Client`, so the handle is not tracked.
    tokio::spawn(task);
}

/// Converts text parameters into the form expected by [`tokio_postgres`].
fn to_sql_params<'a>(params: &'a [&'a str]) -> Vec<&'a (dyn ToSql + Sync)> {
    params
        .iter()
        .map(|param| param as &(dyn ToSql + Sync))
        .collect()
}

/// Builds a rustls client config trusting the PEM-encoded `root_certs`.
fn client_config_from_pem(root_certs: &[u8]) -> SnapshotResult<ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();
    let mut root_certs_reader = BufReader::new(root_certs);
    for cert in rustls_pemfile::certs(&mut root_certs_reader) {
        let cert = cert?;
        root_store.add(cert)?;
    }

    Ok(ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth())
}

/// [`QuerierBuilder`] backed by [`tokio_postgres`].
///
/// TLS is negotiated per connection: a connection string naming an `sslrootcert` file is
/// connected over TLS trusting only the certificates of that file. Other connection strings are
/// connected without TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgQuerierBuilder;

impl PgQuerierBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl QuerierBuilder for PgQuerierBuilder {
    type Querier = PgQuerier;

    async fn connect(&self, connection_string: &str) -> SnapshotResult<PgQuerier> {
        let (connection_string, root_cert_path) = split_root_cert(connection_string);

        let tls_config = match root_cert_path {
            Some(path) => {
                let root_certs = tokio::fs::read(&path).await.map_err(|err| {
                    snapshot_error!(
                        ErrorKind::IoError,
                        "Failed to read trusted root certificates",
                        path.display().to_string(),
                        source: err
                    )
                })?;
                Some(client_config_from_pem(&root_certs)?)
            }
            None => None,
        };

        let config: Config = connection_string.parse().map_err(|err| {
            snapshot_error!(
                ErrorKind::ConfigError,
                "Invalid Postgres connection string",
                source: err
            )
        })?;

        let client = match tls_config {
            Some(tls_config) => {
                let (client, connection) =
                    config.connect(MakeRustlsConnect::new(tls_config)).await?;
                spawn_postgres_connection::<MakeRustlsConnect>(connection);
                info!("successfully connected to postgres with tls");

                client
            }
            None => {
                let (client, connection) = config.connect(NoTls).await?;
                spawn_postgres_connection::<NoTls>(connection);
                info!("successfully connected to postgres without tls");

                client
            }
        };

        Ok(PgQuerier { client })
    }
}

/// [`Querier`] over a single [`tokio_postgres`] client.
///
/// The underlying connection is closed when the querier is dropped.
#[derive(Debug)]
pub struct PgQuerier {
    client: Client,
}

impl Querier for PgQuerier {
    async fn exec(&self, query: &str, params: &[&str]) -> SnapshotResult<u64> {
        let params = to_sql_params(params);
        let affected_rows = self.client.execute(query, &params).await?;

        Ok(affected_rows)
    }

    async fn query(&self, query: &str, params: &[&str]) -> SnapshotResult<RowStream> {
        let params = to_sql_params(params);
        let rows = self.client.query_raw(query, params).await?;

        let rows = rows
            .map(|row| {
                row.map(|row| Box::new(PgRow(row)) as Box<dyn RowScan>)
                    .map_err(SnapshotError::from)
            })
            .boxed();

        Ok(rows)
    }

    async fn query_row(&self, query: &str, params: &[&str]) -> SnapshotResult<Box<dyn RowScan>> {
        let params = to_sql_params(params);
        let row = self.client.query_one(query, &params).await?;

        Ok(Box::new(PgRow(row)))
    }
}

/// [`RowScan`] over a [`tokio_postgres::Row`].
struct PgRow(Row);

impl PgRow {
    fn column<'a, T>(&'a self, index: usize) -> SnapshotResult<T>
    where
        T: tokio_postgres::types::FromSql<'a>,
    {
        self.0.try_get::<_, T>(index).map_err(|err| {
            snapshot_error!(
                ErrorKind::ConversionError,
                "Failed to read column value",
                format!("column index {index}"),
                source: err
            )
        })
    }
}

impl RowScan for PgRow {
    fn scan_string(&self, index: usize) -> SnapshotResult<String> {
        self.column::<String>(index)
    }

    fn scan_bool(&self, index: usize) -> SnapshotResult<bool> {
        self.column::<bool>(index)
    }
}
