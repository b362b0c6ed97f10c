//! Turns raw events into typed rows addressed to tables.

pub mod enrichment;
pub mod processed;
pub mod processor;
pub mod transform;
