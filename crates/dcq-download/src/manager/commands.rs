//! Messages processed by the queue runner.
//!
//! API calls carry a oneshot reply; worker and background-task reports are
//! fire-and-forget and stamped with the lease they belong to.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::oneshot;

use dcq_core::{
    DownloadResult, EnqueueRequest, ItemId, ItemSources, ItemSummary, ListingEntry, PeerHandle,
    Priority, QueueSnapshot, RemoteTree, SourceOffer, TigerHash,
};

use crate::queue::LeaseId;

pub type Reply<T> = oneshot::Sender<DownloadResult<T>>;

/// Report from a transfer worker.
#[derive(Debug)]
pub enum WorkerEvent {
    /// `delta` new bytes; `received` in total for the segment.
    Progress { delta: u64, received: u64 },
    /// All bytes arrived; the last block is being checked.
    Verifying,
    /// Every block matched its leaf.
    Verified { leaves: Vec<TigerHash> },
    Failed { error: dcq_core::DownloadError },
}

#[derive(Debug)]
pub enum Command {
    Enqueue {
        request: EnqueueRequest,
        reply: Reply<ItemId>,
    },
    AddMagnet {
        magnet: String,
        directory: PathBuf,
        reply: Reply<ItemId>,
    },
    Remove {
        id: ItemId,
        remove_partial: bool,
        reply: Reply<()>,
    },
    SetPriority {
        id: ItemId,
        priority: Priority,
        reply: Reply<()>,
    },
    Pause {
        id: ItemId,
        disconnect: bool,
        reply: Reply<()>,
    },
    Move {
        id: ItemId,
        target: PathBuf,
        reply: Reply<()>,
    },
    AttachSource {
        id: ItemId,
        offer: SourceOffer,
        reply: Reply<()>,
    },
    SourceFound {
        offer: SourceOffer,
    },
    SourceLost {
        peer: PeerHandle,
    },
    UploadSpeed {
        bytes_per_sec: u64,
    },
    List {
        reply: Reply<Vec<ItemSummary>>,
    },
    Snapshot {
        reply: Reply<QueueSnapshot>,
    },
    Targets {
        reply: Reply<Vec<PathBuf>>,
    },
    Sources {
        id: ItemId,
        reply: Reply<ItemSources>,
    },
    Tick {
        reply: Reply<()>,
    },
    Save {
        reply: Reply<()>,
    },
    Shutdown {
        reply: Reply<()>,
    },

    Worker {
        lease: LeaseId,
        event: WorkerEvent,
    },
    TreeFetched {
        lease: LeaseId,
        result: DownloadResult<RemoteTree>,
    },
    /// The target file of a completed item was written (or failed to be).
    Finalized {
        id: ItemId,
        result: DownloadResult<()>,
    },
    SearchHits {
        offers: Vec<SourceOffer>,
    },
    SearchFlooded {
        retry_after: Duration,
    },
    SearchDone,
    ListingFetched {
        peer: PeerHandle,
        result: DownloadResult<Vec<ListingEntry>>,
    },
}
