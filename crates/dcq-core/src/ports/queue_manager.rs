//! Queue manager port definition.
//!
//! The public interface of the download queue. Only core domain types appear
//! in signatures; channels, tasks and cancellation tokens stay inside the
//! implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::download::{
    ContentId, DownloadResult, EnqueueRequest, ItemId, ItemSources, ItemSummary, PeerHandle,
    Priority, QueueSnapshot, SourceOffer,
};

/// Port for managing the download queue.
///
/// # Usage
///
/// ```ignore
/// let queue: Arc<dyn QueueManagerPort> = /* ... */;
///
/// let id = queue.enqueue(EnqueueRequest::new(root, size, "/data/file.iso")).await?;
/// queue.attach_source(id, offer).await?;
/// queue.set_priority(id, Priority::High).await?;
/// ```
#[async_trait]
pub trait QueueManagerPort: Send + Sync {
    /// Add a new item.
    async fn enqueue(&self, request: EnqueueRequest) -> DownloadResult<ItemId>;

    /// Parse a magnet link and enqueue it into `directory`.
    async fn add_magnet(&self, magnet: &str, directory: &Path) -> DownloadResult<ItemId>;

    /// Remove an item, cancelling its transfers. Absent ids are not an error.
    async fn remove_item(&self, id: ItemId, remove_partial: bool) -> DownloadResult<()>;

    /// Set a manual priority. `Paused` stops new assignments only.
    async fn set_priority(&self, id: ItemId, priority: Priority) -> DownloadResult<()>;

    /// Pause an item, optionally cancelling its in-flight transfers.
    async fn pause(&self, id: ItemId, disconnect: bool) -> DownloadResult<()>;

    /// Change the target path of a queued item.
    async fn move_item(&self, id: ItemId, target: PathBuf) -> DownloadResult<()>;

    /// Attach a source to a specific item.
    async fn attach_source(&self, id: ItemId, offer: SourceOffer) -> DownloadResult<()>;

    /// A peer was found offering `content`; attach it wherever it fits.
    async fn source_found(&self, content: ContentId, offer: SourceOffer) -> DownloadResult<()>;

    /// A peer went away.
    async fn source_lost(&self, peer: PeerHandle) -> DownloadResult<()>;

    /// An asynchronous search result arrived.
    async fn search_result(&self, offer: SourceOffer) -> DownloadResult<()>;

    /// Feed the current average upload speed (bytes/s) to the slot manager.
    async fn report_upload_speed(&self, bytes_per_sec: u64) -> DownloadResult<()>;

    /// Summaries of all items in queue order.
    async fn list_items(&self) -> DownloadResult<Vec<ItemSummary>>;

    /// Snapshot of the queue.
    async fn snapshot(&self) -> DownloadResult<QueueSnapshot>;

    /// Target paths of all items.
    async fn list_targets(&self) -> DownloadResult<Vec<PathBuf>>;

    /// Sources of one item.
    async fn sources(&self, id: ItemId) -> DownloadResult<ItemSources>;

    /// Run a scheduling pass now.
    async fn tick(&self) -> DownloadResult<()>;

    /// Persist the queue now.
    async fn save(&self) -> DownloadResult<()>;

    /// Cancel all transfers, persist, and stop background work.
    async fn shutdown(&self) -> DownloadResult<()>;
}
