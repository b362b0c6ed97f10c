use std::io;
use std::sync::Once;

use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use ingest_config::Environment;

/// Default filter applied when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install the log bridge: {0}")]
    LogBridge(#[from] tracing_log::log::SetLoggerError),

    #[error("failed to install the global tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),

    #[error("failed to determine the runtime environment: {0}")]
    Environment(#[from] io::Error),
}

/// Flushes buffered log lines when dropped.
///
/// Binaries must keep the flusher alive for the whole lifetime of the process.
#[must_use = "dropping the flusher stops the background log writer"]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Installs the global tracing subscriber for a binary.
///
/// Logs are written to stdout through a non-blocking writer, as JSON in production and in a
/// human readable form otherwise. Records emitted through the `log` facade are forwarded to
/// `tracing`.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    LogTracer::init()?;

    let environment = Environment::load()?;
    let (writer, guard) = tracing_appender::non_blocking(io::stdout());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match environment {
        Environment::Prod => {
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_env_filter(filter)
                .with_writer(writer)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        Environment::Dev => {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_span_events(FmtSpan::NONE)
                .with_writer(writer)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    tracing::info!(app = app_name, %environment, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}

static TEST_TRACING: Once = Once::new();

/// Installs a test subscriber once per process.
///
/// Output is captured by the test harness and filtered through `RUST_LOG`, so tests stay quiet
/// unless it is set.
pub fn init_test_tracing() {
    TEST_TRACING.call_once(|| {
        let Ok(filter) = EnvFilter::try_from_default_env() else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
