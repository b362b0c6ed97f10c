//! Tracing initialization shared by the ingestion binaries and tests.

pub mod tracing;

pub use crate::tracing::init_test_tracing;
