use std::fmt;

use crate::error::IngestResult;
use crate::types::Record;

/// Adds derived data to a raw record before it is mapped.
///
/// Failures should be reported with [`crate::error::ErrorKind::EnrichmentFailed`].
pub trait Enricher: fmt::Debug {
    fn enrich(&self, record: &mut Record) -> IngestResult<()>;
}

/// Enricher leaving records untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnricher;

impl Enricher for NoopEnricher {
    fn enrich(&self, _record: &mut Record) -> IngestResult<()> {
        Ok(())
    }
}
