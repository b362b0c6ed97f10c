//! Per-destination cache of recently processed events.
//!
//! The cache records the outcome of every event a worker consumed so operators can inspect what
//! happened to an event without going through the destination.

mod base;
pub mod memory;

pub use base::EventsCache;
