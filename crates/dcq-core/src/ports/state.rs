//! Queue state repository port definition.
//!
//! # Persistence Scope
//!
//! **Persisted:** items, their priority and target, verified segments with
//! the leaf hashes observed for them, fetched tree leaves, known sources.
//!
//! **In-memory only:** in-flight transfers, throughput, online flags. An
//! in-flight segment restarts from scratch after a restore.

use async_trait::async_trait;

use super::RepositoryError;
use crate::download::PersistedItem;

/// Port for persisting the queue between runs.
#[async_trait]
pub trait QueueStateRepositoryPort: Send + Sync {
    /// Replace the stored queue with `items`.
    async fn save(&self, items: &[PersistedItem]) -> Result<(), RepositoryError>;

    /// Load the stored queue. An absent store yields an empty queue.
    async fn load(&self) -> Result<Vec<PersistedItem>, RepositoryError>;
}
