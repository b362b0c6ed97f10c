//! Event ingestion core.
//!
//! Turns semi-structured event records into typed rows addressed to named tables and keeps each
//! destination table's schema in step with the inferred schema while several processes write to
//! the same destination.
//!
//! The pipeline for a single record is: table name extraction, enrichment, field mapping,
//! optional transform, flattening, type resolution and column name folding. The resulting
//! [`types::Envelope`]s are reconciled against the destination schema by
//! [`schema::table_helper::TableHelper`] and written by a [`destination::Destination`].

pub mod concurrency;
pub mod coordination;
pub mod destination;
pub mod error;
pub mod events;
pub mod fallback;
mod macros;
pub mod metrics;
pub mod processing;
pub mod queue;
pub mod schema;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
