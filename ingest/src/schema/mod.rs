//! Schema inference and evolution.
//!
//! Records are flattened, typed and named by the pure components of this module. The inferred
//! schema is then reconciled with the physical schema of the destination by
//! [`table_helper::TableHelper`].

pub mod cache;
pub mod column_name;
pub mod flattener;
pub mod mapping;
pub mod table_helper;
pub mod table_name;
pub mod type_map;
pub mod typing;
