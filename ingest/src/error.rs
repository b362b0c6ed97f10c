//! Error types and result definitions for ingestion operations.
//!
//! [`IngestError`] carries a classification, a static description, optional dynamic detail,
//! an optional source error and the callsite it was created at. Errors raised by concurrent
//! workers can be aggregated into a single value.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Detailed payload stored for single [`IngestError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for ingestion operations.
#[derive(Debug, Clone)]
pub struct IngestError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Multiple aggregated errors, mainly produced when several workers fail.
    Many {
        errors: Vec<IngestError>,
        location: &'static Location<'static>,
    },
}

/// Classification of ingestion errors.
///
/// The kind drives how a failure is handled: connection failures are retried after a delay,
/// coordination failures abort schema reconciliation, and most other per-record failures are
/// routed to the fallback log.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Destination errors
    DestinationConnectionFailed,
    DestinationQueryFailed,
    DestinationTableMissing,
    DestinationSchemaError,

    // Coordination errors
    CoordinationFailed,

    // Record processing errors
    MappingFailed,
    ConversionError,
    InvalidData,
    TransformFailed,
    EnrichmentFailed,

    // Configuration errors
    ConfigError,

    // Queue errors
    QueueClosed,

    // IO & serialization errors
    IoError,
    SerializationError,
    DeserializationError,

    // Worker errors
    WorkerPanic,
    WorkerCancelled,
    InvalidState,

    Unknown,
}

impl IngestError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or [`ErrorKind::Unknown`] when
    /// the list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s contained in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the static description of this error.
    ///
    /// For aggregated errors, returns the description of the first error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.description.as_ref(),
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.description())
                .unwrap_or("multiple errors"),
        }
    }

    /// Returns the dynamic detail, if any.
    ///
    /// For aggregated errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the aggregated errors, or [`None`] for a single error.
    pub fn errors(&self) -> Option<&[IngestError]> {
        match self.repr {
            ErrorRepr::Single(_) => None,
            ErrorRepr::Many { ref errors, .. } => Some(errors),
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the callsite at which this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Replaces the dynamic detail and returns the modified instance.
    ///
    /// Has no effect on aggregated errors.
    pub fn with_detail(mut self, detail: impl Into<Cow<'static, str>>) -> Self {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.detail = Some(detail.into());
        }
        self
    }

    /// Attaches an originating error and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward their first error as source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Renders the error as a single line without location or backtrace.
    ///
    /// This is the text stored alongside failed records in the fallback log and events cache.
    pub fn to_compact_string(&self) -> String {
        match &self.repr {
            ErrorRepr::Single(payload) => match payload.detail.as_deref() {
                Some(detail) => format!("{}: {}", payload.description, detail),
                None => payload.description.to_string(),
            },
            ErrorRepr::Many { errors, .. } => errors
                .iter()
                .map(|err| err.to_compact_string())
                .collect::<Vec<_>>()
                .join("; "),
        }
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        IngestError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for IngestError {
    fn eq(&self, other: &IngestError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl Hash for IngestError {
    /// Hashes only the kind and static description so that occurrences of the same failure
    /// group together regardless of detail or location.
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.repr).hash(state);
        match &self.repr {
            ErrorRepr::Single(payload) => {
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                errors.len().hash(state);
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, "\n  Detail:")?;
                    for line in detail.lines() {
                        write!(f, "\n    {line}")?;
                    }
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write!(f, "\n  Backtrace:")?;
                    for line in backtrace.lines() {
                        write!(f, "\n    {line}")?;
                    }
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    if let Some(first_line) = lines.next() {
                        write!(f, "\n  {}. {}", index + 1, first_line)?;
                    }
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for IngestError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates an [`IngestError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for IngestError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> IngestError {
        IngestError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`IngestError`] from an error kind, static description and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for IngestError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> IngestError {
        IngestError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A vector holding exactly one error yields that error unchanged.
impl<E> From<Vec<E>> for IngestError
where
    E: Into<IngestError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> IngestError {
        let location = Location::caller();
        let mut errors: Vec<IngestError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        IngestError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for IngestError {
    #[track_caller]
    fn from(err: std::io::Error) -> IngestError {
        let detail = err.to_string();
        IngestError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps [`serde_json::Error`] to a serialization or deserialization failure.
impl From<serde_json::Error> for IngestError {
    #[track_caller]
    fn from(err: serde_json::Error) -> IngestError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        IngestError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<std::num::ParseIntError> for IngestError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> IngestError {
        let detail = err.to_string();
        IngestError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Integer parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<std::num::ParseFloatError> for IngestError {
    #[track_caller]
    fn from(err: std::num::ParseFloatError) -> IngestError {
        let detail = err.to_string();
        IngestError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Float parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<chrono::ParseError> for IngestError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> IngestError {
        let detail = err.to_string();
        IngestError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Datetime parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<regex::Error> for IngestError {
    #[track_caller]
    fn from(err: regex::Error) -> IngestError {
        let detail = err.to_string();
        IngestError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Regular expression compilation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
