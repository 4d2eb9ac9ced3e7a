use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::dump::{PgDump, PgDumpOptions, PgRestore, PgRestoreError, PgRestoreOptions};
use crate::error::{SnapshotError, SnapshotResult};

type DumpHandler = Arc<dyn Fn(&PgDumpOptions) -> SnapshotResult<Bytes> + Send + Sync>;
type RestoreHandler =
    Arc<dyn Fn(&PgRestoreOptions, &Bytes) -> Result<String, PgRestoreError> + Send + Sync>;

/// [`PgDump`] answering through a handler and recording the options of every dump.
#[derive(Clone)]
pub struct MockPgDump {
    handler: DumpHandler,
    calls: Arc<Mutex<Vec<PgDumpOptions>>>,
}

impl MockPgDump {
    pub fn new<F>(handler: F) -> MockPgDump
    where
        F: Fn(&PgDumpOptions) -> SnapshotResult<Bytes> + Send + Sync + 'static,
    {
        MockPgDump {
            handler: Arc::new(handler),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn returning(dump: Bytes) -> MockPgDump {
        MockPgDump::new(move |_| Ok(dump.clone()))
    }

    pub fn failing(error: SnapshotError) -> MockPgDump {
        MockPgDump::new(move |_| Err(error.clone()))
    }

    /// Panics on any dump.
    pub fn unexpected() -> MockPgDump {
        MockPgDump::new(|options| panic!("unexpected dump: {options:?}"))
    }

    pub fn calls(&self) -> Vec<PgDumpOptions> {
        self.calls.lock().unwrap().clone()
    }
}

impl fmt::Debug for MockPgDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockPgDump")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl PgDump for MockPgDump {
    async fn dump(&self, options: &PgDumpOptions) -> SnapshotResult<Bytes> {
        self.calls.lock().unwrap().push(options.clone());

        (self.handler)(options)
    }
}

/// [`PgRestore`] answering through a handler and recording every restore.
#[derive(Clone)]
pub struct MockPgRestore {
    handler: RestoreHandler,
    calls: Arc<Mutex<Vec<(PgRestoreOptions, Bytes)>>>,
}

impl MockPgRestore {
    pub fn new<F>(handler: F) -> MockPgRestore
    where
        F: Fn(&PgRestoreOptions, &Bytes) -> Result<String, PgRestoreError> + Send + Sync + 'static,
    {
        MockPgRestore {
            handler: Arc::new(handler),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn succeeding() -> MockPgRestore {
        MockPgRestore::new(|_, _| Ok(String::new()))
    }

    pub fn returning_error(error: PgRestoreError) -> MockPgRestore {
        MockPgRestore::new(move |_, _| Err(error.clone()))
    }

    /// Panics on any restore.
    pub fn unexpected() -> MockPgRestore {
        MockPgRestore::new(|options, _| panic!("unexpected restore: {options:?}"))
    }

    pub fn calls(&self) -> Vec<(PgRestoreOptions, Bytes)> {
        self.calls.lock().unwrap().clone()
    }
}

impl fmt::Debug for MockPgRestore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockPgRestore")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl PgRestore for MockPgRestore {
    async fn restore(
        &self,
        options: &PgRestoreOptions,
        dump: Bytes,
    ) -> Result<String, PgRestoreError> {
        self.calls
            .lock()
            .unwrap()
            .push((options.clone(), dump.clone()));

        (self.handler)(options, &dump)
    }
}
