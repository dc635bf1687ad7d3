//! JSON-file implementation of `QueueStateRepositoryPort`.
//!
//! The whole queue is one document, rewritten on every save. Writes go to
//! `<file>.tmp` first and are renamed over the real file, so a crash never
//! leaves a half-written queue behind.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dcq_core::{PersistedItem, QueueStateRepositoryPort, RepositoryError};

/// Current document layout.
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct QueueDocument {
    version: u32,
    items: Vec<PersistedItem>,
}

/// Borrowing twin of [`QueueDocument`] for writing.
#[derive(Serialize)]
struct QueueDocumentRef<'a> {
    version: u32,
    items: &'a [PersistedItem],
}

/// Queue persistence in a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    /// Create a repository backed by `path`. Nothing is touched until the
    /// first save or load.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

fn storage(e: &io::Error) -> RepositoryError {
    RepositoryError::Storage(e.to_string())
}

#[async_trait]
impl QueueStateRepositoryPort for JsonFileRepository {
    async fn save(&self, items: &[PersistedItem]) -> Result<(), RepositoryError> {
        let document = QueueDocumentRef {
            version: FORMAT_VERSION,
            items,
        };
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage(&e))?;
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, bytes)
            .await
            .map_err(|e| storage(&e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| storage(&e))?;
        Ok(())
    }

    async fn load(&self) -> Result<Vec<PersistedItem>, RepositoryError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage(&e)),
        };
        let document: QueueDocument = serde_json::from_slice(&bytes)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        if document.version != FORMAT_VERSION {
            return Err(RepositoryError::Serialization(format!(
                "unsupported queue file version {}",
                document.version
            )));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = document.items.iter().find(|item| !seen.insert(item.id)) {
            return Err(RepositoryError::Constraint(format!(
                "item {} stored twice",
                dup.id
            )));
        }
        Ok(document.items)
    }
}
