mod event;
mod field;
mod header;
mod table;
mod value;

pub use event::{DEFAULT_SOURCE, Event, EventContext};
pub use field::{DataType, Field, SqlTypeSuggestion};
pub use header::{BatchHeader, Envelope};
pub use table::{SqlColumn, Table, TableDiff, TableKey};
pub use value::{Record, Value, format_timestamp, get_path, remove_path, set_path, split_path};
