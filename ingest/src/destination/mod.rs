//! Destination adapter abstractions.
//!
//! A [`Destination`] owns the physical tables of one target system. The pipeline only ever asks
//! it for a table's live schema, to create a table, to apply an additive schema change and to
//! insert rows.

mod base;
pub mod memory;

pub use base::Destination;
