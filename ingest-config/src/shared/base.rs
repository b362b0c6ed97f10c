use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// No destination is configured.
    #[error("at least one destination must be configured")]
    NoDestinations,
    /// Two destinations share the same id.
    #[error("destination id `{0}` is configured more than once")]
    DuplicateDestinationId(String),
    /// A field holds a value outside its allowed range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
    /// A mapping rule is missing a part required by its action.
    #[error("invalid mapping rule #{index} of destination `{destination_id}`: {reason}")]
    InvalidMappingRule {
        destination_id: String,
        index: usize,
        reason: String,
    },
}
