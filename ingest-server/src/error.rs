use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use ingest::error::IngestError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Captured backtrace wrapper for error variants that do not carry one.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for the ingestion server.
///
/// Wraps [`IngestError`] for pipeline errors and provides variants for infrastructure errors.
#[derive(Debug)]
pub enum ServerError {
    /// Ingestion pipeline error.
    Ingest(IngestError),
    /// Configuration error.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// I/O error.
    Io(std::io::Error, CapturedBacktrace),
    /// Any other error raised while running the server.
    Runtime(anyhow::Error),
}

impl ServerError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            ServerError::Ingest(_) => "ingestion error",
            ServerError::Config(_, _) => "configuration error",
            ServerError::Io(_, _) => "i/o error",
            ServerError::Runtime(_) => "runtime error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            ServerError::Ingest(err) => err.backtrace(),
            ServerError::Config(_, cb) => Some(&cb.0),
            ServerError::Io(_, cb) => Some(&cb.0),
            ServerError::Runtime(err) => Some(err.backtrace()),
        }
    }

    /// Creates a configuration error from any error.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        ServerError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("ingest server failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {}\n", self));

        if !matches!(self, ServerError::Ingest(err) if err.errors().is_some()) {
            let mut source = Error::source(self);
            let mut idx = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {idx}: {err}\n"));
                source = err.source();
                idx += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Ingest(err) => write!(f, "{err}"),
            ServerError::Config(source, _) => write!(f, "configuration error: {source}"),
            ServerError::Io(source, _) => write!(f, "i/o error: {source}"),
            ServerError::Runtime(err) => write!(f, "{err:#}"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ServerError::Ingest(err) => err.source(),
            ServerError::Config(source, _) => Some(source.as_ref()),
            ServerError::Io(source, _) => Some(source),
            ServerError::Runtime(err) => err.source(),
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<IngestError> for ServerError {
    fn from(err: IngestError) -> Self {
        ServerError::Ingest(err)
    }
}

impl From<anyhow::Error> for ServerError {
    /// Unwraps ingestion errors so they keep their own report.
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<IngestError>() {
            Ok(err) => ServerError::Ingest(err),
            Err(err) => ServerError::Runtime(err),
        }
    }
}
