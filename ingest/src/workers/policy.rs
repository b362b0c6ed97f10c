use crate::error::{ErrorKind, IngestError};

/// Retry behavior for a classified error.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RetryDirective {
    /// The event is enqueued again and retried after the destination's retry delay.
    Timed,
    /// The event is written to the fallback log.
    NoRetry,
}

/// Policy describing how an [`IngestError`] raised while writing an event is handled.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ErrorHandlingPolicy {
    retry_directive: RetryDirective,
    solution: Option<&'static str>,
}

impl ErrorHandlingPolicy {
    const fn new(retry_directive: RetryDirective, solution: Option<&'static str>) -> Self {
        Self {
            retry_directive,
            solution,
        }
    }

    pub fn retry_directive(&self) -> RetryDirective {
        self.retry_directive
    }

    /// Returns an optional operator-facing solution message.
    pub fn solution(&self) -> Option<&'static str> {
        self.solution
    }
}

/// Builds the [`ErrorHandlingPolicy`] of an error.
pub fn build_error_handling_policy(error: &IngestError) -> ErrorHandlingPolicy {
    match error.kind() {
        // Only connectivity failures are expected to recover without changing the event.
        ErrorKind::DestinationConnectionFailed => {
            ErrorHandlingPolicy::new(RetryDirective::Timed, None)
        }

        ErrorKind::DestinationSchemaError | ErrorKind::DestinationTableMissing => {
            ErrorHandlingPolicy::new(
                RetryDirective::NoRetry,
                Some("Check the destination table schema, then replay the fallback log."),
            )
        }
        ErrorKind::CoordinationFailed => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Check the coordination service, then replay the fallback log."),
        ),
        ErrorKind::ConversionError | ErrorKind::InvalidData | ErrorKind::MappingFailed => {
            ErrorHandlingPolicy::new(
                RetryDirective::NoRetry,
                Some("Fix the event or the destination's mapping and type configuration."),
            )
        }

        _ => ErrorHandlingPolicy::new(RetryDirective::NoRetry, None),
    }
}
