use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::IngestResult;
use crate::fallback::{FallbackEntry, FallbackLog};

/// In-process [`FallbackLog`] used in tests.
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryFallbackLog {
    entries: Arc<Mutex<Vec<FallbackEntry>>>,
}

impl MemoryFallbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<FallbackEntry> {
        self.entries.lock().await.clone()
    }
}

impl FallbackLog for MemoryFallbackLog {
    async fn append(&self, entry: FallbackEntry) -> IngestResult<()> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}
