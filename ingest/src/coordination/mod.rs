//! Cross-process coordination of schema changes.
//!
//! Server processes writing to the same destination agree on schema changes through a
//! [`Coordinator`]: an advisory lock per table serializes DDL and a per-table version counter
//! tells a process that its cached schema is stale.

mod base;
pub mod memory;

pub use base::Coordinator;
