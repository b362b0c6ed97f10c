use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{ErrorKind, IngestResult};
use crate::fallback::{FallbackEntry, FallbackLog};
use crate::ingest_error;

/// [`FallbackLog`] appending one JSON object per line to `<dir>/fallback.<destination_id>.log`.
///
/// Clones share the same file handle.
#[derive(Debug, Clone)]
pub struct FileFallbackLog {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl FileFallbackLog {
    /// Opens the fallback log of a destination, creating the directory and file if needed.
    pub async fn open(directory: impl AsRef<Path>, destination_id: &str) -> IngestResult<Self> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory).await?;

        let path = Self::path_for(directory, destination_id);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!(path = %path.display(), "opened fallback log");

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Returns the path of the fallback log of a destination inside `directory`.
    pub fn path_for(directory: impl AsRef<Path>, destination_id: &str) -> PathBuf {
        directory
            .as_ref()
            .join(format!("fallback.{destination_id}.log"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FallbackLog for FileFallbackLog {
    async fn append(&self, entry: FallbackEntry) -> IngestResult<()> {
        let mut line = serde_json::to_vec(&entry).map_err(|err| {
            ingest_error!(
                ErrorKind::SerializationError,
                "Fallback entry could not be serialized",
                source: err
            )
        })?;
        line.push(b'\n');

        warn!(
            destination_id = %entry.destination_id,
            event_id = ?entry.event_id,
            error = %entry.error,
            "event written to fallback log"
        );

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;

        Ok(())
    }
}

/// Reads every entry of a fallback log.
///
/// Blank lines are ignored. A malformed line fails the whole read.
pub async fn read_entries(path: impl AsRef<Path>) -> IngestResult<Vec<FallbackEntry>> {
    let contents = fs::read_to_string(path.as_ref()).await?;

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|err| {
                ingest_error!(
                    ErrorKind::DeserializationError,
                    "Fallback log line is malformed",
                    format!("{}:{}", path.as_ref().display(), index + 1),
                    source: err
                )
            })
        })
        .collect()
}
