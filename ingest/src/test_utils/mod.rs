//! Utilities for testing ingestion workers and schema reconciliation.
//!
//! The wrappers in this module inject failures into destinations and coordinators, count the
//! calls they receive and let tests wait for a number of calls without sleeping.

pub mod fault;
pub mod faulty_coordinator;
pub mod faulty_destination;
pub mod notify;
pub mod scripted_queue;
