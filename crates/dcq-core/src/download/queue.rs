//! Queue DTOs for API responses, snapshots and persistence.
//!
//! These types are "UI safe" - Clone + Debug + Serialize + Deserialize with no
//! infrastructure dependencies. They're used for listing queue state
//! (`queue.list`, `queue.getsources`) and for the persisted queue file.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ItemError;
use super::types::{ContentId, ItemId, ItemKind, ItemStatus, PeerHandle, Priority, TigerHash};

/// Snapshot of the entire queue.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Items in queue order.
    pub items: Vec<ItemSummary>,
    /// Items with at least one transfer in flight.
    pub running_count: u32,
    /// Items waiting for sources or slots.
    pub waiting_count: u32,
}

impl QueueSnapshot {
    /// Build a snapshot from item summaries, deriving the counters.
    #[must_use]
    pub fn from_items(items: Vec<ItemSummary>) -> Self {
        let count = |status: ItemStatus| {
            u32::try_from(items.iter().filter(|i| i.status == status).count()).unwrap_or(u32::MAX)
        };
        let running_count = count(ItemStatus::Running);
        let waiting_count = count(ItemStatus::Waiting);
        Self {
            items,
            running_count,
            waiting_count,
        }
    }

    /// Check if the queue is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the total number of items.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.items.len()
    }

    /// Get an item by its ID.
    #[must_use]
    pub fn get(&self, id: ItemId) -> Option<&ItemSummary> {
        self.items.iter().find(|item| item.id == id)
    }
}

/// A single queue item as shown in listings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: ItemId,
    pub content: ContentId,
    pub size: u64,
    pub target: PathBuf,
    pub kind: ItemKind,
    pub priority: Priority,
    pub status: ItemStatus,

    /// Verified bytes.
    pub downloaded: u64,

    /// Segments in the current split (0 before the first split).
    pub segments: u32,

    /// Segments with a transfer in flight.
    pub active_segments: u32,

    /// Known sources.
    pub sources: u32,

    /// Sources currently online.
    pub online_sources: u32,

    /// Aggregate throughput of running transfers (bytes/s).
    pub speed_bps: u64,

    /// Last error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,

    pub added_at: DateTime<Utc>,
}

impl ItemSummary {
    /// Progress as percentage (0.0 - 100.0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percent(&self) -> f64 {
        if self.size == 0 {
            return 100.0;
        }
        (self.downloaded as f64 / self.size as f64) * 100.0
    }
}

/// One source of an item, as reported by `sources(id)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub peer: PeerHandle,
    pub online: bool,
    /// Rolling throughput (bytes/s).
    pub speed_bps: u64,
    pub failures: u32,
    /// Whether the source currently holds a segment.
    pub transferring: bool,
}

/// Sources of one item, as reported by `sources(id)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSources {
    pub sources: Vec<SourceSummary>,
    /// How many of `sources` are online.
    pub online: u32,
}

impl ItemSources {
    /// Build from summaries, counting the online ones.
    #[must_use]
    pub fn from_sources(sources: Vec<SourceSummary>) -> Self {
        let online = u32::try_from(sources.iter().filter(|s| s.online).count()).unwrap_or(u32::MAX);
        Self { sources, online }
    }
}

/// A queue item in the persisted queue file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedItem {
    pub id: ItemId,
    pub content: ContentId,
    pub size: u64,
    pub target: PathBuf,
    /// Where verified data accumulates until the item finishes.
    #[serde(default)]
    pub partial: PathBuf,
    pub kind: ItemKind,
    pub priority: Priority,
    /// Whether the priority was set by the user (sticky).
    pub manual_priority: bool,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
    pub added_at: DateTime<Utc>,
    /// Leaf size of the item's verification tree.
    pub block_size: u64,
    /// Tree leaves, empty until fetched from a source.
    #[serde(default)]
    pub tree_leaves: Vec<TigerHash>,
    #[serde(default)]
    pub segments: Vec<PersistedSegment>,
    #[serde(default)]
    pub sources: Vec<PeerHandle>,
}

/// A segment in the persisted queue file.
///
/// In-flight segments are persisted as not verified; they restart from
/// scratch after a restore.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSegment {
    pub offset: u64,
    pub length: u64,
    pub verified: bool,
    /// Leaf hashes observed while verifying this range.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub leaves: Vec<TigerHash>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: u64, status: ItemStatus) -> ItemSummary {
        ItemSummary {
            id: ItemId::new(id),
            content: TigerHash::from_bytes([1; 24]),
            size: 200,
            target: PathBuf::from("/tmp/a"),
            kind: ItemKind::File,
            priority: Priority::Normal,
            status,
            downloaded: 50,
            segments: 2,
            active_segments: 1,
            sources: 1,
            online_sources: 1,
            speed_bps: 0,
            error: None,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_snapshot_counts() {
        let snapshot = QueueSnapshot::from_items(vec![
            summary(1, ItemStatus::Running),
            summary(2, ItemStatus::Waiting),
            summary(3, ItemStatus::Waiting),
            summary(4, ItemStatus::Paused),
        ]);
        assert_eq!(snapshot.running_count, 1);
        assert_eq!(snapshot.waiting_count, 2);
        assert_eq!(snapshot.len(), 4);
        assert!(snapshot.get(ItemId::new(3)).is_some());
        assert!(snapshot.get(ItemId::new(9)).is_none());
    }

    #[test]
    fn test_progress_percent() {
        let item = summary(1, ItemStatus::Running);
        assert!((item.progress_percent() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_persisted_item_tolerates_missing_optional_fields() {
        let json = r#"{
            "id": 7,
            "content": "LWPNACQDBZRYXW3VHJVCJ64QBZNGHOHHHZWCLNQ",
            "size": 10,
            "target": "/tmp/x",
            "kind": "file",
            "priority": "high",
            "manual_priority": true,
            "status": "waiting",
            "added_at": "2024-01-01T00:00:00Z",
            "block_size": 65536
        }"#;
        let item: PersistedItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, ItemId::new(7));
        assert_eq!(item.priority, Priority::High);
        assert!(item.segments.is_empty());
        assert!(item.tree_leaves.is_empty());
    }
}
