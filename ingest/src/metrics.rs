//! Metric names and labels emitted through the `metrics` facade.

/// Label for the destination id.
pub const DESTINATION_ID_LABEL: &str = "destination_id";

/// Label for the source tag of an event.
pub const SOURCE_LABEL: &str = "source";

/// Label for the table name.
pub const TABLE_NAME_LABEL: &str = "table_name";

/// Label for the error kind.
pub const ERROR_KIND_LABEL: &str = "error_kind";

// Event accounting

/// Counter for events written to a destination.
pub const INGEST_EVENTS_SUCCEEDED_TOTAL: &str = "ingest_events_succeeded_total";

/// Counter for events routed to the fallback log.
pub const INGEST_EVENTS_FAILED_TOTAL: &str = "ingest_events_failed_total";

/// Counter for events skipped by table name extraction or transform.
pub const INGEST_EVENTS_SKIPPED_TOTAL: &str = "ingest_events_skipped_total";

/// Counter for events re-enqueued after a connection failure.
pub const INGEST_EVENTS_RETRIED_TOTAL: &str = "ingest_events_retried_total";

// Schema evolution

/// Counter for tables created in a destination.
pub const INGEST_TABLES_CREATED_TOTAL: &str = "ingest_tables_created_total";

/// Counter for schema patches applied to a destination table.
pub const INGEST_SCHEMA_PATCHES_TOTAL: &str = "ingest_schema_patches_total";
