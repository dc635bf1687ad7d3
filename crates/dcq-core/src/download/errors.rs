//! Download error types.
//!
//! These errors are designed to be serializable and not depend on external
//! error types like `std::io::Error`. For I/O errors, we capture the kind
//! and message as strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{ContentId, ItemId, PeerHandle};

/// Error type for queue and transfer operations.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownloadError {
    /// An item with the same content and size is already queued.
    #[error("Duplicate item: {content} is already queued as {existing}")]
    DuplicateItem {
        /// The item already holding this content.
        existing: ItemId,
        /// The duplicated content identifier.
        content: ContentId,
    },

    /// Another item already downloads to this target path.
    #[error("Already queued: {target}")]
    AlreadyQueued {
        /// The contested target path.
        target: String,
    },

    /// The item does not exist (or was removed).
    #[error("Item not found: {id}")]
    ItemNotFound {
        /// The unknown id.
        id: ItemId,
    },

    /// A source's declared content or size does not match the item.
    #[error("Incompatible source {peer}: {reason}")]
    IncompatibleSource {
        /// The rejected peer.
        peer: PeerHandle,
        /// What did not match.
        reason: String,
    },

    /// A single block failed its leaf hash check.
    #[error("Checksum mismatch in block {block}")]
    ChecksumMismatch {
        /// Index of the offending leaf.
        block: u64,
    },

    /// Whole-tree recombination did not reproduce the root.
    #[error("Full tree does not match root: expected {expected}, got {actual}")]
    TreeMismatch {
        /// Declared root.
        expected: String,
        /// Root recomputed from leaves (or a description when unbuildable).
        actual: String,
    },

    /// A source was dropped for sustained low throughput.
    #[error("Source too slow: {peer} at {bytes_per_sec} B/s")]
    SourceTooSlow {
        /// The dropped peer.
        peer: PeerHandle,
        /// Observed throughput when dropped.
        bytes_per_sec: u64,
    },

    /// Both ends are passive; no connection is possible.
    #[error("Passive user unreachable: {peer}")]
    PassiveUserUnreachable {
        /// The unreachable peer.
        peer: PeerHandle,
    },

    /// The peer cannot supply per-block hashes for verification.
    #[error("Remote client does not fully support TTH: {peer}")]
    RemoteLacksVerification {
        /// The peer lacking tree support.
        peer: PeerHandle,
    },

    /// No slot was free for a new transfer.
    #[error("No slots available")]
    NoSlotsAvailable,

    /// The discovery layer refused a search (flood protection).
    #[error("Search flood: retry in {retry_after_secs}s")]
    SearchFlood {
        /// Suggested wait before the next search.
        retry_after_secs: u64,
    },

    /// Malformed magnet link.
    #[error("Invalid magnet: {reason}")]
    InvalidMagnet {
        /// What was wrong with it.
        reason: String,
    },

    /// I/O error during file operations.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., "not found", "permission denied").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// Transport failure talking to a peer.
    #[error("Network error: {message}")]
    Network {
        /// Detailed error message.
        message: String,
    },

    /// Transfer was cancelled (pause, drop, removal).
    #[error("Transfer cancelled")]
    Cancelled,

    /// General/uncategorized error.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl DownloadError {
    /// Create a duplicate item error.
    pub const fn duplicate(existing: ItemId, content: ContentId) -> Self {
        Self::DuplicateItem { existing, content }
    }

    /// Create an already queued error.
    pub fn already_queued(target: impl Into<String>) -> Self {
        Self::AlreadyQueued {
            target: target.into(),
        }
    }

    /// Create an item not found error.
    #[must_use]
    pub const fn not_found(id: ItemId) -> Self {
        Self::ItemNotFound { id }
    }

    /// Create an incompatible source error.
    pub fn incompatible(peer: PeerHandle, reason: impl Into<String>) -> Self {
        Self::IncompatibleSource {
            peer,
            reason: reason.into(),
        }
    }

    /// Create a tree mismatch error.
    pub fn tree_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TreeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an invalid magnet error.
    pub fn invalid_magnet(reason: impl Into<String>) -> Self {
        Self::InvalidMagnet {
            reason: reason.into(),
        }
    }

    /// Create an I/O error from kind and message strings.
    pub fn io(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error from a `std::io::Error`.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Closed classification of this error.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::DuplicateItem { .. } => FailureKind::DuplicateItem,
            Self::AlreadyQueued { .. } => FailureKind::AlreadyQueued,
            Self::ItemNotFound { .. } => FailureKind::ItemNotFound,
            Self::IncompatibleSource { .. } => FailureKind::IncompatibleSource,
            Self::ChecksumMismatch { .. } => FailureKind::ChecksumMismatch,
            Self::TreeMismatch { .. } => FailureKind::TreeMismatch,
            Self::SourceTooSlow { .. } => FailureKind::SourceTooSlow,
            Self::PassiveUserUnreachable { .. } => FailureKind::PassiveUserUnreachable,
            Self::RemoteLacksVerification { .. } => FailureKind::RemoteLacksVerification,
            Self::NoSlotsAvailable => FailureKind::NoSlotsAvailable,
            Self::SearchFlood { .. } => FailureKind::SearchFlood,
            Self::InvalidMagnet { .. } => FailureKind::InvalidMagnet,
            Self::Io { .. } => FailureKind::Io,
            Self::Network { .. } => FailureKind::Network,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Other { .. } => FailureKind::Other,
        }
    }

    /// Check if this error is recoverable (retried by the engine).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }

    /// Check if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Convert to a user-friendly message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::DuplicateItem { .. } => "This file is already in the download queue.".to_string(),
            Self::AlreadyQueued { target } => {
                format!("Another download already writes to '{target}'.")
            }
            Self::ItemNotFound { id } => format!("Queue item {id} does not exist."),
            Self::IncompatibleSource { peer, reason } => {
                format!("Source {peer} does not offer this file: {reason}")
            }
            Self::ChecksumMismatch { block } => {
                format!("Block {block} failed verification and will be downloaded again.")
            }
            Self::TreeMismatch { .. } => {
                "Full tree does not match TTH root. The file will be downloaded again.".to_string()
            }
            Self::SourceTooSlow { peer, .. } => format!("Source too slow: {peer}"),
            Self::PassiveUserUnreachable { peer } => {
                format!("Passive user {peer} cannot be reached while this client is passive.")
            }
            Self::RemoteLacksVerification { peer } => {
                format!("Remote client {peer} does not fully support TTH - cannot download.")
            }
            Self::NoSlotsAvailable => "No download slots.".to_string(),
            Self::SearchFlood { retry_after_secs } => {
                format!("Searching too often; wait {retry_after_secs} seconds.")
            }
            Self::InvalidMagnet { reason } => format!("Invalid magnet link: {reason}"),
            Self::Io { message, .. } => format!("File operation failed: {message}"),
            Self::Network { message } => format!("Connection error: {message}"),
            Self::Cancelled => "Transfer was cancelled.".to_string(),
            Self::Other { message } => message.clone(),
        }
    }
}

/// Closed classification of failures, used in events and item error state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DuplicateItem,
    AlreadyQueued,
    ItemNotFound,
    IncompatibleSource,
    ChecksumMismatch,
    TreeMismatch,
    SourceTooSlow,
    PassiveUserUnreachable,
    RemoteLacksVerification,
    NoSlotsAvailable,
    SearchFlood,
    InvalidMagnet,
    Io,
    Network,
    Cancelled,
    Other,
}

impl FailureKind {
    /// Whether the engine retries after this kind of failure.
    ///
    /// `ChecksumMismatch` resets one segment and `TreeMismatch` resets the
    /// whole item; both keep the item in the queue.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(
            self,
            Self::NoSlotsAvailable
                | Self::SourceTooSlow
                | Self::PassiveUserUnreachable
                | Self::SearchFlood
                | Self::ChecksumMismatch
                | Self::TreeMismatch
                | Self::Network
                | Self::Io
        )
    }
}

/// Error state recorded on a queue item for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    /// Classification.
    pub kind: FailureKind,
    /// Human-readable reason.
    pub reason: String,
}

impl From<&DownloadError> for ItemError {
    fn from(err: &DownloadError) -> Self {
        Self {
            kind: err.kind(),
            reason: err.user_message(),
        }
    }
}

/// Convenience result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;
