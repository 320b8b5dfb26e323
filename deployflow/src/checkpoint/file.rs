//! One-file-per-stage checkpoint store.

use super::CheckpointStore;
use crate::errors::CheckpointError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

const EXTENSION: &str = "json";

/// Stores each checkpoint as `{name}.json` inside a directory.
///
/// Writes go to a hidden temporary file in the same directory, are synced,
/// and then renamed over the target, so a crash never leaves a torn file.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding checkpoint files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the checkpoint file for `name`.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{EXTENSION}"))
    }

    fn storage(name: &str, source: std::io::Error) -> CheckpointError {
        CheckpointError::Storage {
            name: name.to_string(),
            source,
        }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::storage(name, e))?;

        let target = self.path_for(name);
        let temp = self.dir.join(format!(".{name}.{EXTENSION}.tmp"));

        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| Self::storage(name, e))?;
        file.write_all(bytes).await.map_err(|e| Self::storage(name, e))?;
        file.sync_all().await.map_err(|e| Self::storage(name, e))?;
        drop(file);

        tokio::fs::rename(&temp, &target)
            .await
            .map_err(|e| Self::storage(name, e))?;
        debug!(path = %target.display(), bytes = bytes.len(), "Checkpoint written");
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        match tokio::fs::read(self.path_for(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::storage(name, e)),
        }
    }

    async fn remove(&self, name: &str) -> Result<(), CheckpointError> {
        match tokio::fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::storage(name, e)),
        }
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::storage("*", e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::storage("*", e))? {
            let path = entry.path();
            let is_checkpoint = path.extension().and_then(|e| e.to_str()) == Some(EXTENSION);
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_checkpoint && !stem.starts_with('.') {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
