use std::io;
use std::sync::Once;

use snapshot_config::Environment;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Flushes buffered log lines when dropped.
///
/// Must be held until the process exits, otherwise the last log lines may be lost.
pub type LogFlusher = WorkerGuard;

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to determine the runtime environment: {0}")]
    Environment(#[from] io::Error),

    #[error("failed to install the log tracer: {0}")]
    LogTracer(#[from] tracing_log::log::SetLoggerError),

    #[error("failed to install the tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Default filter used when `RUST_LOG` is not set.
fn default_filter(app_name: &str) -> EnvFilter {
    EnvFilter::new(format!("{}=info,snapshot=info", app_name.replace('-', "_")))
}

/// Initializes logging for the binary `app_name`.
///
/// Logs are written to stdout through a non-blocking writer, as JSON in production and in a human
/// readable format otherwise. `RUST_LOG` overrides the default filter. Records emitted through
/// the `log` crate are forwarded to `tracing`.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load()?;

    LogTracer::init()?;

    let (writer, flusher) = tracing_appender::non_blocking(io::stdout());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(app_name));
    let registry = tracing_subscriber::registry().with(filter);

    match environment {
        Environment::Prod => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(writer),
            )
            .try_init()?,
        Environment::Dev => registry
            .with(fmt::layer().with_writer(writer))
            .try_init()?,
    }

    ::tracing::info!(app_name, %environment, "tracing initialized");

    Ok(flusher)
}

/// Initializes logging for tests, at most once per process.
///
/// Output is captured by the test harness and filtered by `RUST_LOG`, which defaults to off.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));

        // Another subscriber may already be installed by the test binary.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_can_be_initialized_repeatedly() {
        init_test_tracing();
        init_test_tracing();
    }
}
