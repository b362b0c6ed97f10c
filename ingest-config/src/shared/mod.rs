//! Shared configuration types for ingestion services.

mod base;
mod destination;
mod mapping;
mod server;

pub use base::ValidationError;
pub use destination::{DestinationConfig, DestinationKind, EventsCacheConfig, FieldType};
pub use mapping::{MappingAction, MappingConfig, MappingRule};
pub use server::{FallbackConfig, ServerConfig};
