//! A single queue item and its conversions to DTOs.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use dcq_core::{
    ContentId, ItemError, ItemId, ItemKind, ItemStatus, ItemSummary, PersistedItem, Priority,
};

use super::LeaseId;
use super::segments::SegmentMap;
use super::sources::SourceRegistry;
use crate::tree::{HashTree, default_block_size, leaf_count};

/// Suffix of the file verified data is written to before completion.
pub const PARTIAL_SUFFIX: &str = ".dctmp";

/// Path of the partial data file for `target`.
pub fn partial_path_for(target: &Path) -> PathBuf {
    let mut name: OsString = target.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// One file in the queue.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: ItemId,
    pub content: ContentId,
    pub size: u64,
    pub target: PathBuf,
    pub partial: PathBuf,
    pub kind: ItemKind,
    pub priority: Priority,
    /// Set by the user; automatic classification no longer applies.
    pub manual_priority: bool,
    pub status: ItemStatus,
    pub error: Option<ItemError>,
    pub added_at: DateTime<Utc>,
    pub segments: SegmentMap,
    pub sources: SourceRegistry,
    /// Leaf level at the item's block size, once known.
    pub tree: Option<Arc<HashTree>>,
    /// Lease of an in-flight tree fetch.
    pub tree_lease: Option<LeaseId>,
}

impl QueueItem {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ItemId,
        content: ContentId,
        size: u64,
        target: PathBuf,
        kind: ItemKind,
        priority: Priority,
        manual_priority: bool,
        added_at: DateTime<Utc>,
    ) -> Self {
        let block_size = default_block_size(size);
        let tree = (leaf_count(size, block_size) == 1)
            .then(|| Arc::new(HashTree::single_leaf(content, size, block_size)));
        let status = if priority.is_paused() {
            ItemStatus::Paused
        } else {
            ItemStatus::Waiting
        };
        Self {
            id,
            content,
            size,
            partial: partial_path_for(&target),
            target,
            kind,
            priority,
            manual_priority,
            status,
            error: None,
            added_at,
            segments: SegmentMap::new(size, block_size),
            sources: SourceRegistry::new(),
            tree,
            tree_lease: None,
        }
    }

    pub const fn block_size(&self) -> u64 {
        self.segments.block_size()
    }

    /// Takes part in scheduling passes.
    pub const fn is_schedulable(&self) -> bool {
        !self.status.is_terminal() && !self.priority.is_paused()
    }

    /// Whether `offer` describes this item's content.
    pub fn matches(&self, content: &ContentId, size: u64) -> bool {
        self.content == *content && self.size == size
    }

    /// Leases held by this item (segments and tree fetch).
    pub fn leases(&self) -> Vec<LeaseId> {
        let mut leases = self.segments.leases();
        leases.extend(self.tree_lease);
        leases
    }

    /// Recompute the non-terminal status. Returns the new status if it changed.
    pub fn refresh_status(&mut self) -> Option<ItemStatus> {
        if self.status.is_terminal() {
            return None;
        }
        let next = if self.priority.is_paused() {
            ItemStatus::Paused
        } else if self.segments.in_flight_count() > 0 || self.tree_lease.is_some() {
            ItemStatus::Running
        } else {
            ItemStatus::Waiting
        };
        (next != self.status).then(|| {
            self.status = next;
            next
        })
    }

    pub fn summary(&self, now: Instant) -> ItemSummary {
        let downloaded = if self.status == ItemStatus::Finished {
            self.size
        } else {
            self.segments.verified_bytes()
        };
        ItemSummary {
            id: self.id,
            content: self.content,
            size: self.size,
            target: self.target.clone(),
            kind: self.kind,
            priority: self.priority,
            status: self.status,
            downloaded,
            segments: count_u32(self.segments.len()),
            active_segments: count_u32(self.segments.in_flight_count()),
            sources: count_u32(self.sources.len()),
            online_sources: count_u32(self.sources.online_count()),
            speed_bps: self.sources.total_bytes_per_sec(now),
            error: self.error.clone(),
            added_at: self.added_at,
        }
    }

    pub fn to_persisted(&self) -> PersistedItem {
        PersistedItem {
            id: self.id,
            content: self.content,
            size: self.size,
            target: self.target.clone(),
            partial: self.partial.clone(),
            kind: self.kind,
            priority: self.priority,
            manual_priority: self.manual_priority,
            status: self.status,
            error: self.error.clone(),
            added_at: self.added_at,
            block_size: self.block_size(),
            tree_leaves: self
                .tree
                .as_ref()
                .filter(|t| t.leaf_count() > 1)
                .map(|t| t.leaves().to_vec())
                .unwrap_or_default(),
            segments: self.segments.to_persisted(),
            sources: self.sources.peers(),
        }
    }

    /// Rebuild from the persisted form. Sources come back offline until the
    /// session layer reports them again.
    pub fn from_persisted(persisted: PersistedItem) -> Self {
        let block_size = if persisted.block_size.is_power_of_two() && persisted.block_size >= 1024 {
            persisted.block_size
        } else {
            default_block_size(persisted.size)
        };
        let mut item = Self::new(
            persisted.id,
            persisted.content,
            persisted.size,
            persisted.target,
            persisted.kind,
            persisted.priority,
            persisted.manual_priority,
            persisted.added_at,
        );
        if !persisted.partial.as_os_str().is_empty() {
            item.partial = persisted.partial;
        }
        if item.block_size() != block_size {
            item.segments = SegmentMap::new(item.size, block_size);
            item.tree = (leaf_count(item.size, block_size) == 1).then(|| {
                Arc::new(HashTree::single_leaf(item.content, item.size, block_size))
            });
        }
        if item.tree.is_none() && !persisted.tree_leaves.is_empty() {
            item.tree = HashTree::from_leaves(
                item.content,
                item.size,
                block_size,
                persisted.tree_leaves,
            )
            .ok()
            .map(Arc::new);
        }
        // Verified data is only trusted together with the tree it was checked against.
        if item.tree.is_some() {
            item.segments = SegmentMap::from_persisted(item.size, block_size, &persisted.segments);
        }
        for peer in persisted.sources {
            item.sources.add(peer.clone());
            if let Some(source) = item.sources.get_mut(&peer) {
                source.online = false;
            }
        }
        item.error = persisted.error;
        item.status = match persisted.status {
            ItemStatus::Finished | ItemStatus::Failed => persisted.status,
            _ if item.priority.is_paused() => ItemStatus::Paused,
            _ => ItemStatus::Waiting,
        };
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcq_core::{PeerHandle, SegmentSizing, TigerHash};

    fn item(size: u64) -> QueueItem {
        QueueItem::new(
            ItemId::new(1),
            TigerHash::from_bytes([4; 24]),
            size,
            PathBuf::from("/downloads/file.bin"),
            ItemKind::File,
            Priority::Normal,
            false,
            Utc::now(),
        )
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path_for(Path::new("/d/file.iso")),
            PathBuf::from("/d/file.iso.dctmp")
        );
    }

    #[test]
    fn test_small_item_needs_no_tree_fetch() {
        assert!(item(1000).tree.is_some());
        assert!(item(10 * 1024 * 1024).tree.is_none());
    }

    #[test]
    fn test_refresh_status_follows_priority() {
        let mut it = item(1000);
        assert_eq!(it.status, ItemStatus::Waiting);
        it.priority = Priority::Paused;
        assert_eq!(it.refresh_status(), Some(ItemStatus::Paused));
        assert_eq!(it.refresh_status(), None);
    }

    #[test]
    fn test_persisted_round_trip() {
        let mut it = item(1000);
        it.sources.add(PeerHandle::new("a", "hub"));
        it.segments.split(SegmentSizing::Fixed(1000), 1);
        it.manual_priority = true;

        let restored = QueueItem::from_persisted(it.to_persisted());
        assert_eq!(restored.id, it.id);
        assert_eq!(restored.partial, it.partial);
        assert!(restored.manual_priority);
        assert_eq!(restored.sources.len(), 1);
        assert_eq!(restored.sources.online_count(), 0);
        assert!(restored.segments.covers_exactly());
    }
}
