use bytes::Bytes;
use futures::TryStreamExt;
use pg_escape::{quote_identifier, quote_literal};
use tracing::{Instrument, debug, info, info_span};

use crate::bail;
use crate::dump::{
    DumpFormat, PgDump, PgDumpOptions, PgRestore, PgRestoreError, PgRestoreOptions,
};
use crate::error::{ErrorKind, SnapshotResult};
use crate::generator::base::SnapshotGenerator;
use crate::generator::request::{PUBLIC_SCHEMA, Snapshot};
use crate::postgres::{Querier, QuerierBuilder};
use crate::schemalog::{SCHEMA_LOG_SCHEMA_NAME, SCHEMA_LOG_TABLE_NAME, SchemaLogStore};
use crate::snapshot_error;

const SCHEMA_LOG_EXISTS_QUERY: &str = "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2)";

/// Builds the query listing the tables of `schema_name` that are not part of a snapshot of
/// `included_tables` tables, bound as `$1..$n`.
fn excluded_tables_query(schema_name: &str, included_tables: usize) -> String {
    let placeholders = (1..=included_tables)
        .map(|index| format!("${index}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT tablename FROM pg_tables WHERE schemaname = {} AND tablename NOT IN ({placeholders})",
        quote_literal(schema_name)
    )
}

/// [`SnapshotGenerator`] copying schema definitions with `pg_dump` and applying them on the
/// target database.
///
/// The source and target databases are reached through a [`QuerierBuilder`], the dump and
/// restore through [`PgDump`] and [`PgRestore`]. When a [`SchemaLogStore`] is attached, each
/// successful snapshot is recorded in it.
#[derive(Debug)]
pub struct PgDumpRestoreSnapshotGenerator<B, D, R, S> {
    source_url: String,
    target_url: String,
    querier_builder: B,
    pg_dump: D,
    pg_restore: R,
    schemalog_store: Option<S>,
}

impl<B, D, R, S> PgDumpRestoreSnapshotGenerator<B, D, R, S>
where
    B: QuerierBuilder,
    D: PgDump,
    R: PgRestore,
    S: SchemaLogStore,
{
    pub fn new(
        source_url: impl Into<String>,
        target_url: impl Into<String>,
        querier_builder: B,
        pg_dump: D,
        pg_restore: R,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            target_url: target_url.into(),
            querier_builder,
            pg_dump,
            pg_restore,
            schemalog_store: None,
        }
    }

    /// Records every successful snapshot in `store`.
    pub fn with_schemalog_store(mut self, store: S) -> Self {
        self.schemalog_store = Some(store);
        self
    }

    pub fn has_schemalog_store(&self) -> bool {
        self.schemalog_store.is_some()
    }

    /// Returns whether the schemalog table exists on the source database.
    pub async fn schemalog_exists(&self) -> SnapshotResult<bool> {
        let querier = self.querier_builder.connect(&self.source_url).await?;
        let row = querier
            .query_row(
                SCHEMA_LOG_EXISTS_QUERY,
                &[SCHEMA_LOG_SCHEMA_NAME, SCHEMA_LOG_TABLE_NAME],
            )
            .await?;

        row.scan_bool(0)
    }

    async fn snapshot_schema(&self, snapshot: &Snapshot) -> SnapshotResult<()> {
        if snapshot.schema_name.is_empty() {
            bail!(
                ErrorKind::InvalidData,
                "Snapshot schema name can't be empty"
            );
        }

        let excluded_tables = if snapshot.is_wildcard() {
            Vec::new()
        } else {
            self.excluded_tables(snapshot).await?
        };

        info!(
            excluded_tables = excluded_tables.len(),
            "dumping schema from source database"
        );
        let dump = self
            .pg_dump
            .dump(&self.dump_options(&snapshot.schema_name, &excluded_tables))
            .await?;

        if snapshot.schema_name != PUBLIC_SCHEMA {
            self.create_schema(&snapshot.schema_name).await?;
        }

        self.restore(dump).await?;
        self.insert_schemalog(&snapshot.schema_name).await?;

        info!("schema snapshot completed");

        Ok(())
    }

    /// Lists the tables of the snapshot schema that were not requested.
    async fn excluded_tables(&self, snapshot: &Snapshot) -> SnapshotResult<Vec<String>> {
        let querier = self.querier_builder.connect(&self.source_url).await?;

        let query = excluded_tables_query(&snapshot.schema_name, snapshot.table_names.len());
        let params: Vec<&str> = snapshot.table_names.iter().map(String::as_str).collect();
        let mut rows = querier.query(&query, &params).await?;

        let mut excluded_tables = Vec::new();
        while let Some(row) = rows.try_next().await? {
            excluded_tables.push(row.scan_string(0)?);
        }

        debug!(?excluded_tables, "resolved tables excluded from snapshot");

        Ok(excluded_tables)
    }

    fn dump_options(&self, schema_name: &str, excluded_tables: &[String]) -> PgDumpOptions {
        PgDumpOptions {
            connection_string: self.source_url.clone(),
            format: DumpFormat::Plain,
            clean: false,
            schema_only: true,
            schemas: vec![quote_identifier(schema_name).into_owned()],
            exclude_tables: excluded_tables
                .iter()
                .map(|table| quote_identifier(table).into_owned())
                .collect(),
        }
    }

    async fn create_schema(&self, schema_name: &str) -> SnapshotResult<()> {
        let querier = self.querier_builder.connect(&self.target_url).await?;
        let query = format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_identifier(schema_name)
        );
        querier.exec(&query, &[]).await?;

        Ok(())
    }

    /// Applies `dump` on the target, tolerating errors caused by objects that already exist.
    ///
    /// Remaining issues fail with [`ErrorKind::DestinationRestoreFailed`], whose source is the
    /// [`crate::dump::PgRestoreErrors`] holding only those issues.
    async fn restore(&self, dump: Bytes) -> SnapshotResult<()> {
        let options = PgRestoreOptions {
            connection_string: self.target_url.clone(),
            schema_only: true,
            format: DumpFormat::Plain,
        };

        match self.pg_restore.restore(&options, dump).await {
            Ok(output) => {
                debug!(output = %output.trim(), "schema restored on target database");
                Ok(())
            }
            Err(PgRestoreError::Failed(err)) => Err(err),
            Err(PgRestoreError::Issues(issues)) => {
                let reported = issues.len();
                match issues.into_fatal() {
                    None => {
                        info!(
                            ignored_errors = reported,
                            "ignored restore errors for objects already present on target"
                        );
                        Ok(())
                    }
                    Some(fatal) => {
                        let detail = fatal.to_string();
                        Err(snapshot_error!(
                            ErrorKind::DestinationRestoreFailed,
                            "Restoring the schema on the target database failed",
                            detail = detail,
                            source: fatal
                        ))
                    }
                }
            }
        }
    }

    async fn insert_schemalog(&self, schema_name: &str) -> SnapshotResult<()> {
        let Some(store) = &self.schemalog_store else {
            return Ok(());
        };

        store.insert(schema_name).await.map_err(|err| {
            let detail = err.to_string().lines().next().unwrap_or_default().to_string();
            snapshot_error!(
                ErrorKind::SchemaLogInsertFailed,
                "inserting schemalog entry after schema snapshot",
                detail = detail,
                source: err
            )
        })?;

        Ok(())
    }
}

impl<B, D, R, S> SnapshotGenerator for PgDumpRestoreSnapshotGenerator<B, D, R, S>
where
    B: QuerierBuilder,
    D: PgDump,
    R: PgRestore,
    S: SchemaLogStore,
{
    async fn create_snapshot(&self, snapshot: &Snapshot) -> SnapshotResult<()> {
        if snapshot.has_no_tables() {
            debug!(
                schema_name = %snapshot.schema_name,
                "no tables requested, skipping snapshot"
            );
            return Ok(());
        }

        let span = info_span!("create_snapshot", schema_name = %snapshot.schema_name);
        self.snapshot_schema(snapshot).instrument(span).await
    }

    async fn close(&self) -> SnapshotResult<()> {
        if let Some(store) = &self.schemalog_store {
            store.close().await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use snapshot_telemetry::tracing::init_test_tracing;

    use super::*;
    use crate::dump::{PgRestoreErrors, PgRestoreIssue};
    use crate::error::SnapshotError;
    use crate::test_utils::dump::{MockPgDump, MockPgRestore};
    use crate::test_utils::querier::{
        MockQuerier, MockQuerierBuilder, MockRow, QuerierCall, QuerierMethod,
    };
    use crate::test_utils::schemalog::MockSchemaLogStore;

    const SOURCE_URL: &str = "source-url";
    const TARGET_URL: &str = "target-url";
    const TEST_SCHEMA: &str = "test_schema";
    const TEST_TABLE: &str = "test_table";
    const EXCLUDED_TABLE: &str = "excluded_test_table";
    const TEST_DUMP: &[u8] = b"test dump";

    type TestGenerator = PgDumpRestoreSnapshotGenerator<
        MockQuerierBuilder,
        MockPgDump,
        MockPgRestore,
        MockSchemaLogStore,
    >;

    fn test_error() -> SnapshotError {
        SnapshotError::from((ErrorKind::Unknown, "oh noes"))
    }

    fn generator(
        querier_builder: &MockQuerierBuilder,
        pg_dump: &MockPgDump,
        pg_restore: &MockPgRestore,
    ) -> TestGenerator {
        PgDumpRestoreSnapshotGenerator::new(
            SOURCE_URL,
            TARGET_URL,
            querier_builder.clone(),
            pg_dump.clone(),
            pg_restore.clone(),
        )
    }

    fn test_snapshot() -> Snapshot {
        Snapshot::new(TEST_SCHEMA, vec![TEST_TABLE.to_string()])
    }

    fn excluded_tables_query_for(schema_name: &str) -> String {
        format!(
            "SELECT tablename FROM pg_tables WHERE schemaname = '{schema_name}' AND tablename NOT IN ($1)"
        )
    }

    fn source_querier() -> MockQuerier {
        MockQuerier::new()
            .with_query(|_, _| Ok(vec![Ok(MockRow::text(EXCLUDED_TABLE))]))
            .with_exec(|_, _| Ok(0))
    }

    fn expected_dump_options(schema: &str, exclude_tables: Vec<String>) -> PgDumpOptions {
        PgDumpOptions {
            connection_string: SOURCE_URL.to_string(),
            format: DumpFormat::Plain,
            clean: false,
            schema_only: true,
            schemas: vec![schema.to_string()],
            exclude_tables,
        }
    }

    fn expected_restore_options() -> PgRestoreOptions {
        PgRestoreOptions {
            connection_string: TARGET_URL.to_string(),
            schema_only: true,
            format: DumpFormat::Plain,
        }
    }

    #[tokio::test]
    async fn snapshot_of_listed_tables_excludes_the_others() {
        init_test_tracing();

        let querier = source_querier();
        let querier_builder = MockQuerierBuilder::returning(querier.clone());
        let pg_dump = MockPgDump::returning(Bytes::from_static(TEST_DUMP));
        let pg_restore = MockPgRestore::succeeding();
        let store = MockSchemaLogStore::succeeding();

        let generator =
            generator(&querier_builder, &pg_dump, &pg_restore).with_schemalog_store(store.clone());

        generator.create_snapshot(&test_snapshot()).await.unwrap();

        assert_eq!(
            querier.calls(),
            vec![
                QuerierCall {
                    method: QuerierMethod::Query,
                    query: excluded_tables_query_for(TEST_SCHEMA),
                    params: vec![TEST_TABLE.to_string()],
                },
                QuerierCall {
                    method: QuerierMethod::Exec,
                    query: "CREATE SCHEMA IF NOT EXISTS test_schema".to_string(),
                    params: vec![],
                },
            ]
        );
        assert_eq!(querier_builder.connections(), vec![SOURCE_URL, TARGET_URL]);
        assert_eq!(
            pg_dump.calls(),
            vec![expected_dump_options(
                TEST_SCHEMA,
                vec![EXCLUDED_TABLE.to_string()]
            )]
        );
        assert_eq!(
            pg_restore.calls(),
            vec![(expected_restore_options(), Bytes::from_static(TEST_DUMP))]
        );
        assert_eq!(store.inserted_schemas(), vec![TEST_SCHEMA]);
    }

    #[tokio::test]
    async fn wildcard_snapshot_skips_exclusion_lookup() {
        init_test_tracing();

        let querier = MockQuerier::new().with_exec(|_, _| Ok(0));
        let querier_builder = MockQuerierBuilder::returning(querier.clone());
        let pg_dump = MockPgDump::returning(Bytes::from_static(TEST_DUMP));
        let pg_restore = MockPgRestore::succeeding();

        let generator = generator(&querier_builder, &pg_dump, &pg_restore);

        generator
            .create_snapshot(&Snapshot::wildcard(TEST_SCHEMA))
            .await
            .unwrap();

        assert_eq!(querier.calls_to(QuerierMethod::Query), vec![]);
        assert_eq!(querier_builder.connections(), vec![TARGET_URL]);
        assert_eq!(
            pg_dump.calls(),
            vec![expected_dump_options(TEST_SCHEMA, vec![])]
        );
        assert_eq!(pg_restore.calls().len(), 1);
    }

    #[tokio::test]
    async fn snapshot_without_tables_does_nothing() {
        init_test_tracing();

        let querier_builder = MockQuerierBuilder::unexpected();
        let pg_dump = MockPgDump::unexpected();
        let pg_restore = MockPgRestore::unexpected();
        let store = MockSchemaLogStore::unexpected();

        let generator =
            generator(&querier_builder, &pg_dump, &pg_restore).with_schemalog_store(store.clone());

        for schema in [PUBLIC_SCHEMA, TEST_SCHEMA] {
            generator
                .create_snapshot(&Snapshot::new(schema, vec![]))
                .await
                .unwrap();
        }

        assert!(querier_builder.connections().is_empty());
        assert!(store.inserted_schemas().is_empty());
    }

    #[tokio::test]
    async fn empty_schema_name_is_rejected() {
        init_test_tracing();

        let querier_builder = MockQuerierBuilder::unexpected();
        let pg_dump = MockPgDump::unexpected();
        let pg_restore = MockPgRestore::unexpected();

        let generator = generator(&querier_builder, &pg_dump, &pg_restore);

        let err = generator
            .create_snapshot(&Snapshot::new("", vec![TEST_TABLE.to_string()]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(querier_builder.connections().is_empty());
    }

    #[tokio::test]
    async fn source_connection_error_aborts_snapshot() {
        init_test_tracing();

        let querier_builder = MockQuerierBuilder::failing(test_error());
        let pg_dump = MockPgDump::unexpected();
        let pg_restore = MockPgRestore::unexpected();

        let generator = generator(&querier_builder, &pg_dump, &pg_restore);

        let err = generator.create_snapshot(&test_snapshot()).await.unwrap_err();

        assert_eq!(err, test_error());
        assert_eq!(querier_builder.connections(), vec![SOURCE_URL]);
        assert!(pg_dump.calls().is_empty());
    }

    #[tokio::test]
    async fn exclusion_query_error_aborts_snapshot() {
        init_test_tracing();

        let querier = MockQuerier::new().with_query(|_, _| Err(test_error()));
        let querier_builder = MockQuerierBuilder::returning(querier);
        let pg_dump = MockPgDump::unexpected();
        let pg_restore = MockPgRestore::unexpected();

        let generator = generator(&querier_builder, &pg_dump, &pg_restore);

        let err = generator.create_snapshot(&test_snapshot()).await.unwrap_err();

        assert_eq!(err, test_error());
    }

    #[tokio::test]
    async fn exclusion_row_scan_error_aborts_snapshot() {
        init_test_tracing();

        let querier =
            MockQuerier::new().with_query(|_, _| Ok(vec![Ok(MockRow::failing(test_error()))]));
        let querier_builder = MockQuerierBuilder::returning(querier);
        let pg_dump = MockPgDump::unexpected();
        let pg_restore = MockPgRestore::unexpected();

        let generator = generator(&querier_builder, &pg_dump, &pg_restore);

        let err = generator.create_snapshot(&test_snapshot()).await.unwrap_err();

        assert_eq!(err, test_error());
    }

    #[tokio::test]
    async fn exclusion_row_iteration_error_aborts_snapshot() {
        init_test_tracing();

        let querier = MockQuerier::new().with_query(|_, _| {
            Ok(vec![Ok(MockRow::text(EXCLUDED_TABLE)), Err(test_error())])
        });
        let querier_builder = MockQuerierBuilder::returning(querier);
        let pg_dump = MockPgDump::unexpected();
        let pg_restore = MockPgRestore::unexpected();

        let generator = generator(&querier_builder, &pg_dump, &pg_restore);

        let err = generator.create_snapshot(&test_snapshot()).await.unwrap_err();

        assert_eq!(err, test_error());
    }

    #[tokio::test]
    async fn dump_error_aborts_before_touching_target() {
        init_test_tracing();

        let querier = MockQuerier::new()
            .with_query(|_, _| Ok(vec![Ok(MockRow::text(EXCLUDED_TABLE))]));
        let querier_builder = MockQuerierBuilder::returning(querier.clone());
        let pg_dump = MockPgDump::failing(test_error());
        let pg_restore = MockPgRestore::unexpected();

        let generator = generator(&querier_builder, &pg_dump, &pg_restore);

        let err = generator.create_snapshot(&test_snapshot()).await.unwrap_err();

        assert_eq!(err, test_error());
        assert_eq!(querier.calls_to(QuerierMethod::Exec), vec![]);
        assert_eq!(querier_builder.connections(), vec![SOURCE_URL]);
    }

    #[tokio::test]
    async fn target_connection_error_aborts_snapshot() {
        init_test_tracing();

        let querier = source_querier();
        let querier_builder = MockQuerierBuilder::new(move |connection_string| {
            if connection_string == TARGET_URL {
                Err(test_error())
            } else {
                Ok(querier.clone())
            }
        });
        let pg_dump = MockPgDump::returning(Bytes::from_static(TEST_DUMP));
        let pg_restore = MockPgRestore::unexpected();

        let generator = generator(&querier_builder, &pg_dump, &pg_restore);

        let err = generator.create_snapshot(&test_snapshot()).await.unwrap_err();

        assert_eq!(err, test_error());
        assert_eq!(querier_builder.connections(), vec![SOURCE_URL, TARGET_URL]);
    }

    #[tokio::test]
    async fn create_schema_error_aborts_snapshot() {
        init_test_tracing();

        let querier = MockQuerier::new()
            .with_query(|_, _| Ok(vec![Ok(MockRow::text(EXCLUDED_TABLE))]))
            .with_exec(|_, _| Err(test_error()));
        let querier_builder = MockQuerierBuilder::returning(querier);
        let pg_dump = MockPgDump::returning(Bytes::from_static(TEST_DUMP));
        let pg_restore = MockPgRestore::unexpected();

        let generator = generator(&querier_builder, &pg_dump, &pg_restore);

        let err = generator.create_snapshot(&test_snapshot()).await.unwrap_err();

        assert_eq!(err, test_error());
    }

    #[tokio::test]
    async fn public_schema_is_not_created() {
        init_test_tracing();

        let querier = MockQuerier::new()
            .with_query(|_, _| Ok(vec![Ok(MockRow::text(EXCLUDED_TABLE))]));
        let querier_builder = MockQuerierBuilder::returning(querier.clone());
        let pg_dump = MockPgDump::returning(Bytes::from_static(TEST_DUMP));
        let pg_restore = MockPgRestore::succeeding();

        let generator = generator(&querier_builder, &pg_dump, &pg_restore);

        generator
            .create_snapshot(&Snapshot::new(PUBLIC_SCHEMA, vec![TEST_TABLE.to_string()]))
            .await
            .unwrap();

        assert_eq!(
            querier.calls(),
            vec![QuerierCall {
                method: QuerierMethod::Query,
                query: excluded_tables_query_for(PUBLIC_SCHEMA),
                params: vec![TEST_TABLE.to_string()],
            }]
        );
        assert_eq!(querier_builder.connections(), vec![SOURCE_URL]);
        assert_eq!(pg_restore.calls().len(), 1);
    }

    #[tokio::test]
    async fn non_composite_restore_error_is_returned_unchanged() {
        init_test_tracing();

        let querier = source_querier();
        let querier_builder = MockQuerierBuilder::returning(querier);
        let pg_dump = MockPgDump::returning(Bytes::from_static(TEST_DUMP));
        let pg_restore = MockPgRestore::returning_error(PgRestoreError::Failed(test_error()));
        let store = MockSchemaLogStore::unexpected();

        let generator =
            generator(&querier_builder, &pg_dump, &pg_restore).with_schemalog_store(store);

        let err = generator.create_snapshot(&test_snapshot()).await.unwrap_err();

        assert_eq!(err, test_error());
    }

    #[tokio::test]
    async fn fatal_restore_issues_fail_the_snapshot() {
        init_test_tracing();

        let querier = source_querier();
        let querier_builder = MockQuerierBuilder::returning(querier);
        let pg_dump = MockPgDump::returning(Bytes::from_static(TEST_DUMP));
        let pg_restore = MockPgRestore::returning_error(PgRestoreError::Issues(
            PgRestoreErrors::new(vec![PgRestoreIssue::from_message("oh noes")]),
        ));

        let generator = generator(&querier_builder, &pg_dump, &pg_restore);

        let err = generator.create_snapshot(&test_snapshot()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DestinationRestoreFailed);
        let source = err
            .source()
            .and_then(|source| source.downcast_ref::<PgRestoreErrors>())
            .expect("restore errors should be the source");
        assert_eq!(
            source.issues(),
            &[PgRestoreIssue::Other {
                message: "oh noes".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn ignorable_restore_issues_are_tolerated() {
        init_test_tracing();

        let querier = source_querier();
        let querier_builder = MockQuerierBuilder::returning(querier);
        let pg_dump = MockPgDump::returning(Bytes::from_static(TEST_DUMP));
        let pg_restore = MockPgRestore::returning_error(PgRestoreError::Issues(
            PgRestoreErrors::new(vec![
                PgRestoreIssue::from_message("relation \"test_table\" already exists"),
                PgRestoreIssue::from_message("type \"mood\" already exists"),
            ]),
        ));
        let store = MockSchemaLogStore::succeeding();

        let generator =
            generator(&querier_builder, &pg_dump, &pg_restore).with_schemalog_store(store.clone());

        generator.create_snapshot(&test_snapshot()).await.unwrap();

        assert_eq!(store.inserted_schemas(), vec![TEST_SCHEMA]);
    }

    #[tokio::test]
    async fn mixed_restore_issues_keep_only_fatal_ones() {
        init_test_tracing();

        let querier = source_querier();
        let querier_builder = MockQuerierBuilder::returning(querier);
        let pg_dump = MockPgDump::returning(Bytes::from_static(TEST_DUMP));
        let pg_restore = MockPgRestore::returning_error(PgRestoreError::Issues(
            PgRestoreErrors::new(vec![
                PgRestoreIssue::from_message("relation \"test_table\" already exists"),
                PgRestoreIssue::from_message("permission denied for schema test_schema"),
            ]),
        ));

        let generator = generator(&querier_builder, &pg_dump, &pg_restore);

        let err = generator.create_snapshot(&test_snapshot()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DestinationRestoreFailed);
        let source = err
            .source()
            .and_then(|source| source.downcast_ref::<PgRestoreErrors>())
            .expect("restore errors should be the source");
        assert_eq!(source.len(), 1);
        assert_eq!(
            source.issues()[0].message(),
            "permission denied for schema test_schema"
        );
    }

    #[tokio::test]
    async fn schemalog_insert_error_is_wrapped() {
        init_test_tracing();

        let querier = source_querier();
        let querier_builder = MockQuerierBuilder::returning(querier);
        let pg_dump = MockPgDump::returning(Bytes::from_static(TEST_DUMP));
        let pg_restore = MockPgRestore::succeeding();
        let store = MockSchemaLogStore::failing(test_error());

        let generator =
            generator(&querier_builder, &pg_dump, &pg_restore).with_schemalog_store(store.clone());

        let err = generator.create_snapshot(&test_snapshot()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SchemaLogInsertFailed);
        assert_eq!(
            err.description(),
            Some("inserting schemalog entry after schema snapshot")
        );
        let source = err
            .source()
            .and_then(|source| source.downcast_ref::<SnapshotError>())
            .expect("store error should be the source");
        assert_eq!(source, &test_error());
        assert_eq!(store.inserted_schemas(), vec![TEST_SCHEMA]);
    }

    #[tokio::test]
    async fn identifiers_are_quoted() {
        init_test_tracing();

        let querier = MockQuerier::new()
            .with_query(|_, _| Ok(vec![Ok(MockRow::text("Audit Log"))]))
            .with_exec(|_, _| Ok(0));
        let querier_builder = MockQuerierBuilder::returning(querier.clone());
        let pg_dump = MockPgDump::returning(Bytes::from_static(TEST_DUMP));
        let pg_restore = MockPgRestore::succeeding();

        let generator = generator(&querier_builder, &pg_dump, &pg_restore);

        generator
            .create_snapshot(&Snapshot::new("Sales", vec!["Orders".to_string()]))
            .await
            .unwrap();

        assert_eq!(
            querier.calls_to(QuerierMethod::Query)[0].query,
            excluded_tables_query_for("Sales")
        );
        assert_eq!(
            querier.calls_to(QuerierMethod::Exec)[0].query,
            "CREATE SCHEMA IF NOT EXISTS \"Sales\""
        );
        assert_eq!(
            pg_dump.calls(),
            vec![expected_dump_options(
                "\"Sales\"",
                vec!["\"Audit Log\"".to_string()]
            )]
        );
    }

    #[tokio::test]
    async fn close_closes_the_schemalog_store() {
        init_test_tracing();

        let querier_builder = MockQuerierBuilder::unexpected();
        let pg_dump = MockPgDump::unexpected();
        let pg_restore = MockPgRestore::unexpected();
        let store = MockSchemaLogStore::succeeding();

        let generator = generator(&querier_builder, &pg_dump, &pg_restore);
        generator.close().await.unwrap();

        let generator = generator.with_schemalog_store(store.clone());
        generator.close().await.unwrap();
        generator.close().await.unwrap();

        assert_eq!(store.close_calls(), 2);
    }

    #[tokio::test]
    async fn schemalog_exists_reads_the_catalog() {
        init_test_tracing();

        for exists in [true, false] {
            let querier = MockQuerier::new().with_query_row(move |_, _| Ok(MockRow::bool(exists)));
            let querier_builder = MockQuerierBuilder::returning(querier.clone());
            let pg_dump = MockPgDump::unexpected();
            let pg_restore = MockPgRestore::unexpected();

            let generator = generator(&querier_builder, &pg_dump, &pg_restore);

            assert_eq!(generator.schemalog_exists().await.unwrap(), exists);
            assert_eq!(
                querier.calls(),
                vec![QuerierCall {
                    method: QuerierMethod::QueryRow,
                    query: SCHEMA_LOG_EXISTS_QUERY.to_string(),
                    params: vec!["pgstream".to_string(), "schema_log".to_string()],
                }]
            );
            assert_eq!(querier_builder.connections(), vec![SOURCE_URL]);
        }
    }

    #[tokio::test]
    async fn schemalog_exists_propagates_errors() {
        init_test_tracing();

        let pg_dump = MockPgDump::unexpected();
        let pg_restore = MockPgRestore::unexpected();

        let failing_builder = MockQuerierBuilder::failing(test_error());
        let err = generator(&failing_builder, &pg_dump, &pg_restore)
            .schemalog_exists()
            .await
            .unwrap_err();
        assert_eq!(err, test_error());

        let querier =
            MockQuerier::new().with_query_row(|_, _| Ok(MockRow::failing(test_error())));
        let scanning_builder = MockQuerierBuilder::returning(querier);
        let err = generator(&scanning_builder, &pg_dump, &pg_restore)
            .schemalog_exists()
            .await
            .unwrap_err();
        assert_eq!(err, test_error());
    }
}
