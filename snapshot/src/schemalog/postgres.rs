use snapshot_config::shared::{
    IntoConnectOptions, PgConnectionConfig, SCHEMALOG_CONNECTION_OPTIONS,
};
use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use tracing::{debug, info};

use crate::error::SnapshotResult;
use crate::schemalog::store::{LogEntry, SchemaLogStore};

const NUM_POOL_CONNECTIONS: u32 = 1;

/// A schemalog store writing to the `pgstream.schema_log` table of the source database.
///
/// The table and its helper functions are provisioned by the replication pipeline, so this store
/// must only be used once the table is known to exist.
#[derive(Debug, Clone)]
pub struct PostgresSchemaLogStore {
    pool: PgPool,
}

impl PostgresSchemaLogStore {
    pub fn new(pool: PgPool) -> PostgresSchemaLogStore {
        PostgresSchemaLogStore { pool }
    }

    /// Connects to the database described by `config` with a single connection pool.
    pub async fn connect(config: &PgConnectionConfig) -> SnapshotResult<PostgresSchemaLogStore> {
        let options: PgConnectOptions = config.with_db(Some(&SCHEMALOG_CONNECTION_OPTIONS));

        let pool = PgPoolOptions::new()
            .max_connections(NUM_POOL_CONNECTIONS)
            .min_connections(NUM_POOL_CONNECTIONS)
            .connect_with(options)
            .await?;

        Ok(PostgresSchemaLogStore { pool })
    }
}

impl SchemaLogStore for PostgresSchemaLogStore {
    async fn insert(&self, schema_name: &str) -> SnapshotResult<LogEntry> {
        debug!(schema_name, "inserting schemalog entry");

        let entry = sqlx::query_as::<_, LogEntry>(
            r#"
            insert into pgstream.schema_log (id, version, schema_name, schema)
            values (
                pgstream.xid(),
                coalesce((select max(version) + 1 from pgstream.schema_log where schema_name = $1), 1),
                $1,
                pgstream.get_schema($1)
            )
            returning id::text as id, version, schema_name, created_at::timestamptz as created_at, acked
            "#,
        )
        .bind(schema_name)
        .fetch_one(&self.pool)
        .await?;

        info!(
            schema_name,
            version = entry.version,
            "inserted schemalog entry"
        );

        Ok(entry)
    }

    async fn close(&self) -> SnapshotResult<()> {
        if !self.pool.is_closed() {
            self.pool.close().await;
        }

        Ok(())
    }
}
