//! Workers driving events from queues into destinations.

pub mod base;
pub mod batch;
pub mod policy;
pub mod pool;
pub mod streaming;
