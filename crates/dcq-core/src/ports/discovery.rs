//! Discovery port definition.
//!
//! The session layer (hub connections, peer handshakes, search dispatch)
//! lives outside the engine. This port is everything the engine asks of it.

use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::download::{ContentId, DownloadResult, PeerHandle, SourceOffer, TigerHash};

/// Raw bytes of one requested range, as delivered by a peer connection.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// A byte range request sent to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRequest {
    /// Content being downloaded.
    pub content: ContentId,
    /// First byte.
    pub offset: u64,
    /// Number of bytes.
    pub length: u64,
}

/// Leaf level of a hash tree as served by a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTree {
    /// Bytes covered by each leaf.
    pub block_size: u64,
    /// Leaf hashes in file order.
    pub leaves: Vec<TigerHash>,
}

/// One file in a peer's listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub content: ContentId,
    pub size: u64,
    /// Path inside the peer's share.
    pub path: String,
}

/// Port for reaching peers.
///
/// Failures are reported with the engine's error taxonomy: in particular
/// `PassiveUserUnreachable` when no connection is possible,
/// `RemoteLacksVerification` when a peer cannot serve tree leaves and
/// `SearchFlood` when the hub refuses another search.
#[async_trait]
pub trait DiscoveryPort: Send + Sync {
    /// Open a transfer for `request` from `peer`.
    async fn open_connection(
        &self,
        peer: &PeerHandle,
        request: &SegmentRequest,
    ) -> DownloadResult<ByteStream>;

    /// Fetch the leaf hashes of `root` from `peer`.
    async fn fetch_tree(&self, peer: &PeerHandle, root: &ContentId) -> DownloadResult<RemoteTree>;

    /// Search all hubs for peers offering `content`.
    async fn search(&self, content: &ContentId) -> DownloadResult<Vec<SourceOffer>>;

    /// Fetch the full file listing of `peer`.
    async fn fetch_listing(&self, peer: &PeerHandle) -> DownloadResult<Vec<ListingEntry>>;
}
