//! Transfer worker pipeline.
//!
//! This module contains segment transfer and tree fetch execution, isolated
//! from queue state. Workers operate on value types and cloned Arc
//! dependencies and never touch the queue.
//!
//! # Design Principles
//!
//! - A worker receives an `Assignment` (value type) and `WorkerDeps` (cloned Arcs)
//! - Results and progress go back to the runner as lease-stamped commands
//! - Cancellation is handled via `tokio::select!` around every read and write
//! - The slot permit is released before the final report is sent

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use dcq_core::{DiscoveryPort, DownloadError, DownloadResult, TigerHash};

use super::commands::{Command, WorkerEvent};
use super::now;
use super::partial;
use crate::progress::ProgressThrottle;
use crate::queue::{Assignment, LeaseId, TreeFetch};
use crate::slots::SlotHandle;
use crate::tree::{HashTree, hash_block};

/// Read buffer size.
const READ_CHUNK: usize = 64 * 1024;

/// Dependencies for transfer workers.
#[derive(Clone)]
pub struct WorkerDeps {
    pub discovery: Arc<dyn DiscoveryPort>,
    pub commands: mpsc::Sender<Command>,
    pub progress_interval: Duration,
}

impl WorkerDeps {
    async fn report(&self, lease: LeaseId, event: WorkerEvent) {
        // The runner is gone only during shutdown.
        let _ = self.commands.send(Command::Worker { lease, event }).await;
    }
}

/// A segment transfer to run.
pub struct TransferJob {
    pub assignment: Assignment,
    pub cancel: CancellationToken,
    pub slot: SlotHandle,
}

/// Run a segment transfer to completion and report the outcome.
pub async fn run_transfer(job: TransferJob, deps: WorkerDeps) {
    let TransferJob {
        assignment,
        cancel,
        slot,
    } = job;
    let lease = assignment.lease;

    let event = match execute_transfer(&assignment, &cancel, &deps).await {
        Ok(leaves) => WorkerEvent::Verified { leaves },
        Err(error) => {
            debug!(
                target: "dcq.download",
                item = %assignment.item,
                peer = %assignment.peer,
                %lease,
                %error,
                "Segment transfer ended"
            );
            WorkerEvent::Failed { error }
        }
    };
    drop(slot);
    deps.report(lease, event).await;
}

/// Blocks of one segment as they fill up.
struct BlockCursor {
    tree: Arc<HashTree>,
    block_size: usize,
    leaf: u64,
    offset: u64,
    buffer: Vec<u8>,
    leaves: Vec<TigerHash>,
}

impl BlockCursor {
    fn new(assignment: &Assignment) -> Self {
        let block_size = usize::try_from(assignment.tree.block_size()).unwrap_or(usize::MAX);
        Self {
            tree: Arc::clone(&assignment.tree),
            block_size,
            leaf: assignment.first_leaf(),
            offset: assignment.request.offset,
            buffer: Vec::with_capacity(block_size.min(16 * 1024 * 1024)),
            leaves: Vec::new(),
        }
    }

    /// Room left in the current block.
    fn room(&self) -> usize {
        self.block_size - self.buffer.len()
    }

    fn is_full(&self) -> bool {
        self.buffer.len() == self.block_size
    }

    /// Hash the buffered block, check it against its leaf and write it.
    async fn commit(
        &mut self,
        partial_path: &std::path::Path,
        cancel: &CancellationToken,
    ) -> DownloadResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let data = std::mem::take(&mut self.buffer);
        let (hash, data) = tokio::task::spawn_blocking(move || (hash_block(&data), data))
            .await
            .map_err(|e| DownloadError::other(format!("hashing task failed: {e}")))?;

        let expected = usize::try_from(self.leaf)
            .ok()
            .and_then(|index| self.tree.leaves().get(index));
        if expected != Some(&hash) {
            return Err(DownloadError::ChecksumMismatch { block: self.leaf });
        }
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        partial::write_at(partial_path, self.offset, &data).await?;
        self.offset += data.len() as u64;
        self.leaf += 1;
        self.leaves.push(hash);
        self.buffer = data;
        self.buffer.clear();
        Ok(())
    }
}

/// Stream a segment, verifying and writing block by block.
async fn execute_transfer(
    assignment: &Assignment,
    cancel: &CancellationToken,
    deps: &WorkerDeps,
) -> DownloadResult<Vec<TigerHash>> {
    let request = assignment.request;
    let mut stream = tokio::select! {
        biased;

        () = cancel.cancelled() => return Err(DownloadError::Cancelled),

        opened = deps.discovery.open_connection(&assignment.peer, &request) => opened?,
    };

    let mut cursor = BlockCursor::new(assignment);
    let mut throttle = ProgressThrottle::new(deps.progress_interval);
    let mut buf = vec![0u8; READ_CHUNK];
    let mut received = 0u64;

    while received < request.length {
        let remaining = usize::try_from(request.length - received).unwrap_or(usize::MAX);
        let want = remaining.min(buf.len());
        let read = tokio::select! {
            biased;

            () = cancel.cancelled() => return Err(DownloadError::Cancelled),

            read = stream.read(&mut buf[..want]) => {
                read.map_err(|e| DownloadError::network(e.to_string()))?
            }
        };
        if read == 0 {
            return Err(DownloadError::network(format!(
                "connection closed after {received} of {} bytes",
                request.length
            )));
        }
        received += read as u64;

        let mut chunk = &buf[..read];
        while !chunk.is_empty() {
            let take = cursor.room().min(chunk.len());
            cursor.buffer.extend_from_slice(&chunk[..take]);
            chunk = &chunk[take..];
            if cursor.is_full() {
                cursor.commit(&assignment.partial, cancel).await?;
            }
        }

        if let Some(delta) = throttle.record(now(), read as u64) {
            deps.report(assignment.lease, WorkerEvent::Progress { delta, received })
                .await;
        }
    }

    let delta = throttle.flush();
    if delta > 0 {
        deps.report(assignment.lease, WorkerEvent::Progress { delta, received })
            .await;
    }
    deps.report(assignment.lease, WorkerEvent::Verifying).await;
    cursor.commit(&assignment.partial, cancel).await?;
    Ok(cursor.leaves)
}

/// Fetch an item's tree from one peer and report it.
pub async fn run_tree_fetch(fetch: TreeFetch, cancel: CancellationToken, deps: WorkerDeps) {
    let result = tokio::select! {
        biased;

        () = cancel.cancelled() => Err(DownloadError::Cancelled),

        fetched = deps.discovery.fetch_tree(&fetch.peer, &fetch.root) => fetched,
    };
    if let Err(error) = &result {
        debug!(
            target: "dcq.download",
            item = %fetch.item,
            peer = %fetch.peer,
            %error,
            "Tree fetch failed"
        );
    }
    let _ = deps
        .commands
        .send(Command::TreeFetched {
            lease: fetch.lease,
            result,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use dcq_core::{
        ByteStream, ContentId, ItemId, ListingEntry, PeerHandle, RemoteTree, SegmentRequest,
        SlotConfig, SourceOffer,
    };
    use tempfile::TempDir;

    use crate::slots::{SlotKind, SlotLedger};

    /// Serves `data` for every request, optionally flipping one byte.
    struct StaticPeer {
        data: Vec<u8>,
        corrupt_at: Option<usize>,
    }

    #[async_trait]
    impl DiscoveryPort for StaticPeer {
        async fn open_connection(
            &self,
            _peer: &PeerHandle,
            request: &SegmentRequest,
        ) -> DownloadResult<ByteStream> {
            let start = request.offset as usize;
            let mut bytes = self.data[start..start + request.length as usize].to_vec();
            if let Some(at) = self.corrupt_at.and_then(|at| at.checked_sub(start)) {
                if at < bytes.len() {
                    bytes[at] ^= 0xFF;
                }
            }
            Ok(Box::pin(std::io::Cursor::new(bytes)))
        }

        async fn fetch_tree(&self, _peer: &PeerHandle, _root: &ContentId) -> DownloadResult<RemoteTree> {
            Err(DownloadError::other("unused"))
        }

        async fn search(&self, _content: &ContentId) -> DownloadResult<Vec<SourceOffer>> {
            Ok(Vec::new())
        }

        async fn fetch_listing(&self, _peer: &PeerHandle) -> DownloadResult<Vec<ListingEntry>> {
            Ok(Vec::new())
        }
    }

    fn setup(corrupt_at: Option<usize>) -> (TempDir, Vec<u8>, TransferJob, WorkerDeps, mpsc::Receiver<Command>) {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 253) as u8).collect();
        let tree = Arc::new(HashTree::from_data(&data, 64 * 1024).unwrap());
        let (tx, rx) = mpsc::channel(1024);
        let deps = WorkerDeps {
            discovery: Arc::new(StaticPeer {
                data: data.clone(),
                corrupt_at,
            }),
            commands: tx,
            progress_interval: Duration::from_millis(1),
        };
        let ledger = SlotLedger::new(&SlotConfig::default());
        let job = TransferJob {
            assignment: Assignment {
                item: ItemId::new(1),
                lease: LeaseId::new(7),
                peer: PeerHandle::new("peer", "hub"),
                request: SegmentRequest {
                    content: *tree.root(),
                    offset: 0,
                    length: data.len() as u64,
                },
                partial: dir.path().join("file.dctmp"),
                tree,
            },
            cancel: CancellationToken::new(),
            slot: ledger.try_acquire(SlotKind::Download).unwrap(),
        };
        (dir, data, job, deps, rx)
    }

    fn last_event(rx: &mut mpsc::Receiver<Command>) -> WorkerEvent {
        let mut last = None;
        while let Ok(command) = rx.try_recv() {
            if let Command::Worker { event, .. } = command {
                last = Some(event);
            }
        }
        last.unwrap()
    }

    #[tokio::test]
    async fn test_transfer_verifies_and_writes() {
        let (dir, data, job, deps, mut rx) = setup(None);
        run_transfer(job, deps).await;

        match last_event(&mut rx) {
            WorkerEvent::Verified { leaves } => assert_eq!(leaves.len(), 5),
            other => panic!("unexpected event: {other:?}"),
        }
        let written = tokio::fs::read(dir.path().join("file.dctmp")).await.unwrap();
        assert_eq!(written, data);
    }

    #[tokio::test]
    async fn test_corrupt_block_reports_checksum_mismatch() {
        let (_dir, _data, job, deps, mut rx) = setup(Some(70_000));
        run_transfer(job, deps).await;

        match last_event(&mut rx) {
            WorkerEvent::Failed { error } => {
                assert_eq!(error, DownloadError::ChecksumMismatch { block: 1 });
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (_dir, _data, job, deps, mut rx) = setup(None);
        job.cancel.cancel();
        run_transfer(job, deps).await;

        match last_event(&mut rx) {
            WorkerEvent::Failed { error } => assert!(error.is_cancelled()),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
