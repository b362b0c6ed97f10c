//! Queues feeding events to streaming workers.

mod base;
pub mod memory;

pub use base::{EventQueue, QueuedEvent};
