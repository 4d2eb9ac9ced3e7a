use std::fmt;
use std::sync::{Arc, Mutex};

use futures::StreamExt;

use crate::error::{ErrorKind, SnapshotError, SnapshotResult};
use crate::postgres::{Querier, QuerierBuilder, RowScan, RowStream};
use crate::snapshot_error;

type ExecHandler = Arc<dyn Fn(&str, &[&str]) -> SnapshotResult<u64> + Send + Sync>;
type QueryHandler =
    Arc<dyn Fn(&str, &[&str]) -> SnapshotResult<Vec<SnapshotResult<MockRow>>> + Send + Sync>;
type QueryRowHandler = Arc<dyn Fn(&str, &[&str]) -> SnapshotResult<MockRow> + Send + Sync>;
type ConnectHandler = Arc<dyn Fn(&str) -> SnapshotResult<MockQuerier> + Send + Sync>;

/// Method of [`Querier`] that was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerierMethod {
    Exec,
    Query,
    QueryRow,
}

/// A call recorded by [`MockQuerier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerierCall {
    pub method: QuerierMethod,
    pub query: String,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockValue {
    Text(String),
    Bool(bool),
}

/// Row returned by [`MockQuerier`], optionally failing every scan.
#[derive(Debug, Clone)]
pub struct MockRow {
    values: Result<Vec<MockValue>, SnapshotError>,
}

impl MockRow {
    pub fn new(values: Vec<MockValue>) -> MockRow {
        MockRow { values: Ok(values) }
    }

    pub fn text(value: impl Into<String>) -> MockRow {
        MockRow::new(vec![MockValue::Text(value.into())])
    }

    pub fn bool(value: bool) -> MockRow {
        MockRow::new(vec![MockValue::Bool(value)])
    }

    /// Creates a row whose scans all fail with `error`.
    pub fn failing(error: SnapshotError) -> MockRow {
        MockRow { values: Err(error) }
    }

    fn value(&self, index: usize) -> SnapshotResult<&MockValue> {
        let values = self.values.as_ref().map_err(Clone::clone)?;
        values.get(index).ok_or_else(|| {
            snapshot_error!(
                ErrorKind::ConversionError,
                "Column index out of range",
                format!("column index {index}")
            )
        })
    }
}

impl RowScan for MockRow {
    fn scan_string(&self, index: usize) -> SnapshotResult<String> {
        match self.value(index)? {
            MockValue::Text(value) => Ok(value.clone()),
            other => Err(snapshot_error!(
                ErrorKind::ConversionError,
                "Column is not text",
                format!("{other:?}")
            )),
        }
    }

    fn scan_bool(&self, index: usize) -> SnapshotResult<bool> {
        match self.value(index)? {
            MockValue::Bool(value) => Ok(*value),
            other => Err(snapshot_error!(
                ErrorKind::ConversionError,
                "Column is not a boolean",
                format!("{other:?}")
            )),
        }
    }
}

/// [`Querier`] answering through configurable handlers and recording every call.
#[derive(Clone, Default)]
pub struct MockQuerier {
    exec: Option<ExecHandler>,
    query: Option<QueryHandler>,
    query_row: Option<QueryRowHandler>,
    calls: Arc<Mutex<Vec<QuerierCall>>>,
}

impl MockQuerier {
    pub fn new() -> MockQuerier {
        MockQuerier::default()
    }

    pub fn with_exec<F>(mut self, handler: F) -> MockQuerier
    where
        F: Fn(&str, &[&str]) -> SnapshotResult<u64> + Send + Sync + 'static,
    {
        self.exec = Some(Arc::new(handler));
        self
    }

    pub fn with_query<F>(mut self, handler: F) -> MockQuerier
    where
        F: Fn(&str, &[&str]) -> SnapshotResult<Vec<SnapshotResult<MockRow>>>
            + Send
            + Sync
            + 'static,
    {
        self.query = Some(Arc::new(handler));
        self
    }

    pub fn with_query_row<F>(mut self, handler: F) -> MockQuerier
    where
        F: Fn(&str, &[&str]) -> SnapshotResult<MockRow> + Send + Sync + 'static,
    {
        self.query_row = Some(Arc::new(handler));
        self
    }

    /// Returns every call made on this querier or its clones, in order.
    pub fn calls(&self) -> Vec<QuerierCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: QuerierMethod) -> Vec<QuerierCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method)
            .collect()
    }

    fn record(&self, method: QuerierMethod, query: &str, params: &[&str]) {
        self.calls.lock().unwrap().push(QuerierCall {
            method,
            query: query.to_string(),
            params: params.iter().map(|param| param.to_string()).collect(),
        });
    }
}

impl fmt::Debug for MockQuerier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockQuerier")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl Querier for MockQuerier {
    async fn exec(&self, query: &str, params: &[&str]) -> SnapshotResult<u64> {
        self.record(QuerierMethod::Exec, query, params);
        let handler = self
            .exec
            .as_ref()
            .unwrap_or_else(|| panic!("unexpected exec call: {query}"));

        handler(query, params)
    }

    async fn query(&self, query: &str, params: &[&str]) -> SnapshotResult<RowStream> {
        self.record(QuerierMethod::Query, query, params);
        let handler = self
            .query
            .as_ref()
            .unwrap_or_else(|| panic!("unexpected query call: {query}"));

        let rows = handler(query, params)?;
        let stream = futures::stream::iter(rows)
            .map(|row| row.map(|row| Box::new(row) as Box<dyn RowScan>));

        Ok(stream.boxed())
    }

    async fn query_row(&self, query: &str, params: &[&str]) -> SnapshotResult<Box<dyn RowScan>> {
        self.record(QuerierMethod::QueryRow, query, params);
        let handler = self
            .query_row
            .as_ref()
            .unwrap_or_else(|| panic!("unexpected query_row call: {query}"));

        Ok(Box::new(handler(query, params)?))
    }
}

/// [`QuerierBuilder`] handing out [`MockQuerier`]s and recording the connection strings used.
#[derive(Clone)]
pub struct MockQuerierBuilder {
    connect: ConnectHandler,
    connections: Arc<Mutex<Vec<String>>>,
}

impl MockQuerierBuilder {
    pub fn new<F>(handler: F) -> MockQuerierBuilder
    where
        F: Fn(&str) -> SnapshotResult<MockQuerier> + Send + Sync + 'static,
    {
        MockQuerierBuilder {
            connect: Arc::new(handler),
            connections: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Hands out clones of `querier` for every connection string.
    pub fn returning(querier: MockQuerier) -> MockQuerierBuilder {
        MockQuerierBuilder::new(move |_| Ok(querier.clone()))
    }

    pub fn failing(error: SnapshotError) -> MockQuerierBuilder {
        MockQuerierBuilder::new(move |_| Err(error.clone()))
    }

    /// Panics on any connection attempt.
    pub fn unexpected() -> MockQuerierBuilder {
        MockQuerierBuilder::new(|connection_string| {
            panic!("unexpected connection to {connection_string}")
        })
    }

    pub fn connections(&self) -> Vec<String> {
        self.connections.lock().unwrap().clone()
    }
}

impl fmt::Debug for MockQuerierBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockQuerierBuilder")
            .field("connections", &self.connections())
            .finish_non_exhaustive()
    }
}

impl QuerierBuilder for MockQuerierBuilder {
    type Querier = MockQuerier;

    async fn connect(&self, connection_string: &str) -> SnapshotResult<MockQuerier> {
        self.connections
            .lock()
            .unwrap()
            .push(connection_string.to_string());

        (self.connect)(connection_string)
    }
}
