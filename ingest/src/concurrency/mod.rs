//! Concurrency primitives shared by workers.

pub mod shutdown;
