//! Queue events - discriminated union for all reported state changes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::errors::{DownloadError, FailureKind};
use super::queue::ItemSummary;
use super::types::{ContentId, ItemId, ItemStatus, PeerHandle, Priority};

/// Single discriminated union for all queue events.
///
/// Serialized with a `type` tag:
///
/// ```text
/// { "type": "item_added", "id": 1, "content": "...", "size": 100, ... }
/// { "type": "segment_progress", "id": 1, "offset": 0, "received": 4096, ... }
/// { "type": "item_failed", "id": 1, "kind": "tree_mismatch", "reason": "..." }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// Snapshot of the entire queue.
    QueueSnapshot {
        /// All items in queue order.
        items: Vec<ItemSummary>,
    },

    /// A new item was enqueued.
    ItemAdded {
        id: ItemId,
        content: ContentId,
        size: u64,
        target: PathBuf,
        priority: Priority,
    },

    /// An item left the queue.
    ItemRemoved { id: ItemId },

    /// An item changed lifecycle status.
    StatusChanged { id: ItemId, status: ItemStatus },

    /// An item's priority changed.
    PriorityChanged { id: ItemId, priority: Priority },

    /// An item was retargeted.
    ItemMoved { id: ItemId, target: PathBuf },

    /// Bytes arrived for an in-flight segment.
    SegmentProgress {
        id: ItemId,
        /// Segment start offset.
        offset: u64,
        /// Bytes received for this segment so far.
        received: u64,
        /// Segment length.
        length: u64,
        /// Current throughput in bytes per second.
        speed_bps: u64,
    },

    /// A segment passed block verification.
    SegmentVerified {
        id: ItemId,
        offset: u64,
        length: u64,
        /// Total verified bytes of the item.
        verified: u64,
        /// Item size.
        total: u64,
    },

    /// All data verified and the target file written.
    ItemFinished { id: ItemId, target: PathBuf },

    /// A failure was recorded against an item.
    ///
    /// Recoverable kinds (e.g. `tree_mismatch`) leave the item queued.
    ItemFailed {
        id: ItemId,
        kind: FailureKind,
        reason: String,
    },

    /// A source was attached to an item.
    SourceAdded { id: ItemId, peer: PeerHandle },

    /// A source was dropped, disconnected or removed from an item.
    SourceDropped {
        id: ItemId,
        peer: PeerHandle,
        reason: FailureKind,
        /// Whether the source stays known (disconnect-only).
        kept: bool,
    },

    /// An extra upload slot was opened.
    ExtraSlotGranted,

    /// The extra upload slot was closed again.
    ExtraSlotReclaimed,
}

impl QueueEvent {
    /// Create a queue snapshot event.
    #[must_use]
    pub const fn queue_snapshot(items: Vec<ItemSummary>) -> Self {
        Self::QueueSnapshot { items }
    }

    /// Create a status changed event.
    #[must_use]
    pub const fn status(id: ItemId, status: ItemStatus) -> Self {
        Self::StatusChanged { id, status }
    }

    /// Create a failure event from an error.
    #[must_use]
    pub fn failed(id: ItemId, error: &DownloadError) -> Self {
        Self::ItemFailed {
            id,
            kind: error.kind(),
            reason: error.to_string(),
        }
    }

    /// Create a source dropped event.
    #[must_use]
    pub const fn source_dropped(id: ItemId, peer: PeerHandle, reason: FailureKind, kept: bool) -> Self {
        Self::SourceDropped {
            id,
            peer,
            reason,
            kept,
        }
    }

    /// Get the item ID associated with this event (if any).
    #[must_use]
    pub const fn item_id(&self) -> Option<ItemId> {
        match self {
            Self::ItemAdded { id, .. }
            | Self::ItemRemoved { id }
            | Self::StatusChanged { id, .. }
            | Self::PriorityChanged { id, .. }
            | Self::ItemMoved { id, .. }
            | Self::SegmentProgress { id, .. }
            | Self::SegmentVerified { id, .. }
            | Self::ItemFinished { id, .. }
            | Self::ItemFailed { id, .. }
            | Self::SourceAdded { id, .. }
            | Self::SourceDropped { id, .. } => Some(*id),
            Self::QueueSnapshot { .. } | Self::ExtraSlotGranted | Self::ExtraSlotReclaimed => None,
        }
    }

    /// Get the event type name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::QueueSnapshot { .. } => "queue_snapshot",
            Self::ItemAdded { .. } => "item_added",
            Self::ItemRemoved { .. } => "item_removed",
            Self::StatusChanged { .. } => "status_changed",
            Self::PriorityChanged { .. } => "priority_changed",
            Self::ItemMoved { .. } => "item_moved",
            Self::SegmentProgress { .. } => "segment_progress",
            Self::SegmentVerified { .. } => "segment_verified",
            Self::ItemFinished { .. } => "item_finished",
            Self::ItemFailed { .. } => "item_failed",
            Self::SourceAdded { .. } => "source_added",
            Self::SourceDropped { .. } => "source_dropped",
            Self::ExtraSlotGranted => "extra_slot_granted",
            Self::ExtraSlotReclaimed => "extra_slot_reclaimed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tag() {
        let event = QueueEvent::status(ItemId::new(4), ItemStatus::Running);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"status_changed""#));
        assert!(json.contains(r#""status":"running""#));
    }

    #[test]
    fn test_failed_event_carries_kind() {
        let err = DownloadError::tree_mismatch("AAA", "BBB");
        let event = QueueEvent::failed(ItemId::new(2), &err);
        match &event {
            QueueEvent::ItemFailed { kind, .. } => assert_eq!(*kind, FailureKind::TreeMismatch),
            other => panic!("unexpected event {other:?}"),
        }
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("tree_mismatch"));
    }

    #[test]
    fn test_item_id_and_name() {
        let event = QueueEvent::ItemRemoved { id: ItemId::new(9) };
        assert_eq!(event.item_id(), Some(ItemId::new(9)));
        assert_eq!(event.event_name(), "item_removed");
        assert_eq!(QueueEvent::ExtraSlotGranted.item_id(), None);
    }
}
