//! Shared fakes for queue integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use dcq_core::{
    ByteStream, ContentId, DiscoveryPort, DownloadError, DownloadResult, ListingEntry,
    PeerHandle, QueueEvent, QueueEventEmitterPort, RemoteTree, SegmentRequest, SourceOffer,
};
use dcq_download::HashTree;
use dcq_download::tree::MIN_BLOCK_SIZE;
use mockall::mock;
use tokio::io::AsyncWriteExt;

/// Route engine logs to the test harness once per binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dcq=debug")
            .with_test_writer()
            .try_init();
    });
}

/// Deterministic test payload.
pub fn payload(size: usize, seed: u8) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8 ^ seed).collect()
}

/// Root hash of `data`.
pub fn root_of(data: &[u8]) -> ContentId {
    *HashTree::from_data(data, MIN_BLOCK_SIZE).unwrap().root()
}

pub fn peer(name: &str) -> PeerHandle {
    PeerHandle::new(name, "testhub")
}

/// In-memory peers sharing files.
#[derive(Default)]
pub struct FakeNetwork {
    files: Mutex<HashMap<ContentId, Vec<u8>>>,
    corrupt: Mutex<HashSet<PeerHandle>>,
    unreachable: Mutex<HashSet<PeerHandle>>,
    search_hits: Mutex<HashMap<ContentId, Vec<SourceOffer>>>,
    listings: Mutex<HashMap<PeerHandle, Vec<ListingEntry>>>,
    trickle: Mutex<HashMap<PeerHandle, usize>>,
    connections: AtomicUsize,
    searches: AtomicUsize,
    listing_fetches: AtomicUsize,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Share `data`; returns its content id.
    pub fn share(&self, data: Vec<u8>) -> ContentId {
        let root = root_of(&data);
        self.files.lock().unwrap().insert(root, data);
        root
    }

    /// `peer` flips a byte at the start of everything it sends.
    pub fn corrupt(&self, peer: PeerHandle) {
        self.corrupt.lock().unwrap().insert(peer);
    }

    /// `peer` sends `bytes_per_sec` bytes once a second.
    pub fn trickle(&self, peer: PeerHandle, bytes_per_sec: usize) {
        self.trickle.lock().unwrap().insert(peer, bytes_per_sec);
    }

    pub fn unreachable(&self, peer: PeerHandle) {
        self.unreachable.lock().unwrap().insert(peer);
    }

    pub fn add_search_hit(&self, offer: SourceOffer) {
        self.search_hits
            .lock()
            .unwrap()
            .entry(offer.content)
            .or_default()
            .push(offer);
    }

    pub fn set_listing(&self, peer: PeerHandle, entries: Vec<ListingEntry>) {
        self.listings.lock().unwrap().insert(peer, entries);
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn listing_fetches(&self) -> usize {
        self.listing_fetches.load(Ordering::SeqCst)
    }

    /// Wait up to five seconds for `cond` to hold.
    pub async fn wait_until(&self, cond: impl Fn(&Self) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            if cond(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

#[async_trait]
impl DiscoveryPort for FakeNetwork {
    async fn open_connection(
        &self,
        peer: &PeerHandle,
        request: &SegmentRequest,
    ) -> DownloadResult<ByteStream> {
        if self.unreachable.lock().unwrap().contains(peer) {
            return Err(DownloadError::PassiveUserUnreachable { peer: peer.clone() });
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        let mut bytes = {
            let files = self.files.lock().unwrap();
            let data = files
                .get(&request.content)
                .ok_or_else(|| DownloadError::network("file not shared"))?;
            let start = request.offset as usize;
            data[start..start + request.length as usize].to_vec()
        };
        if self.corrupt.lock().unwrap().contains(peer) {
            bytes[0] ^= 0xFF;
        }
        let rate = self.trickle.lock().unwrap().get(peer).copied();
        if let Some(rate) = rate {
            let (mut writer, reader) = tokio::io::duplex(64 * 1024);
            tokio::spawn(async move {
                for chunk in bytes.chunks(rate.max(1)) {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    if writer.write_all(chunk).await.is_err() {
                        return;
                    }
                }
            });
            return Ok(Box::pin(reader));
        }
        Ok(Box::pin(std::io::Cursor::new(bytes)))
    }

    async fn fetch_tree(&self, peer: &PeerHandle, root: &ContentId) -> DownloadResult<RemoteTree> {
        if self.unreachable.lock().unwrap().contains(peer) {
            return Err(DownloadError::PassiveUserUnreachable { peer: peer.clone() });
        }
        let files = self.files.lock().unwrap();
        let data = files
            .get(root)
            .ok_or_else(|| DownloadError::network("file not shared"))?;
        let tree = HashTree::from_data(data, MIN_BLOCK_SIZE)
            .map_err(|e| DownloadError::other(e.to_string()))?;
        Ok(RemoteTree {
            block_size: MIN_BLOCK_SIZE,
            leaves: tree.leaves().to_vec(),
        })
    }

    async fn search(&self, content: &ContentId) -> DownloadResult<Vec<SourceOffer>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .search_hits
            .lock()
            .unwrap()
            .get(content)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_listing(&self, peer: &PeerHandle) -> DownloadResult<Vec<ListingEntry>> {
        self.listing_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .listings
            .lock()
            .unwrap()
            .get(peer)
            .cloned()
            .unwrap_or_default())
    }
}

/// Emitter recording every event.
#[derive(Clone, Default)]
pub struct RecordingEmitter {
    events: Arc<Mutex<Vec<QueueEvent>>>,
}

impl RecordingEmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<QueueEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn any(&self, pred: impl Fn(&QueueEvent) -> bool) -> bool {
        self.events.lock().unwrap().iter().any(pred)
    }

    /// Wait up to five seconds for an event matching `pred`.
    pub async fn wait_for(&self, pred: impl Fn(&QueueEvent) -> bool) -> bool {
        self.wait_within(Duration::from_secs(5), pred).await
    }

    pub async fn wait_within(&self, timeout: Duration, pred: impl Fn(&QueueEvent) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.any(&pred) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl QueueEventEmitterPort for RecordingEmitter {
    fn emit(&self, event: QueueEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn clone_box(&self) -> Box<dyn QueueEventEmitterPort> {
        Box::new(self.clone())
    }
}

mock! {
    pub Emitter {}

    impl QueueEventEmitterPort for Emitter {
        fn emit(&self, event: QueueEvent);
        fn clone_box(&self) -> Box<dyn QueueEventEmitterPort>;
    }
}
