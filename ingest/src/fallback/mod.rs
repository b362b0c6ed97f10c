//! Durable log of events that could not be written.
//!
//! Every event failing permanently ends up in the fallback log of its destination together with
//! the error, so it can be inspected and replayed once the cause is fixed.

mod base;
pub mod file;
pub mod memory;

pub use base::{FallbackEntry, FallbackLog, replay};
