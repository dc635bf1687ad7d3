//! Download queue state.
//!
//! This module provides a pure state machine for the queue: items, their
//! segments and their sources. No I/O is performed here; the runner in
//! `manager` performs the transfers this module hands out.
//!
//! # Design
//!
//! - Pure synchronous state machine (no async, no IO, no tracing)
//! - Operations buffer [`QueueEvent`]s; the caller drains them with
//!   [`DownloadQueue::take_events`]
//! - Every transfer and tree fetch is stamped with a [`LeaseId`]; results
//!   for leases that are no longer held are ignored
//! - Segments are claimed only in [`DownloadQueue::schedule`], so a pending
//!   segment is handed out exactly once

mod item;
mod segments;
mod sources;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use dcq_core::{
    ContentId, DownloadError, DownloadResult, EnqueueRequest, FailureKind, ItemError, ItemId,
    ItemSources, ItemStatus, ItemSummary, ListingEntry, PeerHandle, PersistedItem, Priority,
    QueueConfig, QueueEvent, QueueSnapshot, RemoteTree, SegmentRequest, SourceOffer,
};

pub use item::{PARTIAL_SUFFIX, QueueItem, partial_path_for};
pub use segments::{Segment, SegmentMap, plan_segment_length};
pub use sources::{RollingSpeed, SPEED_WINDOW, Source, SourceRegistry};

use crate::policy::{self, DropAction, DropDecision};
use crate::tree::{HashTree, root_from_leaves};

/// Stamp of one transfer or tree fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseId(u64);

impl LeaseId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lease-{}", self.0)
    }
}

/// A segment handed to a worker.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub item: ItemId,
    pub lease: LeaseId,
    pub peer: PeerHandle,
    pub request: SegmentRequest,
    /// File the verified bytes are written to.
    pub partial: PathBuf,
    pub tree: Arc<HashTree>,
}

impl Assignment {
    /// Index of the leaf the segment starts at.
    pub fn first_leaf(&self) -> u64 {
        self.request.offset / self.tree.block_size()
    }
}

/// A tree fetch handed to a worker.
#[derive(Debug, Clone)]
pub struct TreeFetch {
    pub item: ItemId,
    pub lease: LeaseId,
    pub peer: PeerHandle,
    pub root: ContentId,
}

/// Work produced by a scheduling pass.
#[derive(Debug, Clone)]
pub enum Action {
    Transfer(Assignment),
    FetchTree(TreeFetch),
}

/// Result of [`DownloadQueue::schedule`].
#[derive(Debug, Default)]
pub struct SchedulePass {
    pub actions: Vec<Action>,
    /// The pass stopped because no download slot was left.
    pub slots_exhausted: bool,
}

/// Result of a verified segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifiedOutcome {
    /// The lease was no longer held.
    Stale,
    /// More segments to go.
    Continue,
    /// Every segment verified and the tree recombines to the root.
    Complete {
        id: ItemId,
        partial: PathBuf,
        target: PathBuf,
    },
    /// Recombination failed; every segment was reset.
    TreeMismatch { id: ItemId },
}

/// Result of a failed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The lease was no longer held.
    Stale,
    /// The segment is pending again.
    Retry,
    /// The item cannot continue; the listed leases must be cancelled.
    ItemFailed { id: ItemId, cancel: Vec<LeaseId> },
}

/// An item taken out of the queue.
#[derive(Debug)]
pub struct RemovedItem {
    pub item: QueueItem,
    /// Leases that were still in flight.
    pub leases: Vec<LeaseId>,
}

/// Manages queue state.
///
/// This is a sync type with no internal locking; the runner owns it.
pub struct DownloadQueue {
    items: IndexMap<ItemId, QueueItem>,
    leases: HashMap<LeaseId, ItemId>,
    next_id: u64,
    next_lease: u64,
    config: QueueConfig,
    events: Vec<QueueEvent>,
}

fn allocate(next: &mut u64) -> LeaseId {
    let lease = LeaseId::new(*next);
    *next += 1;
    lease
}

impl DownloadQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            items: IndexMap::new(),
            leases: HashMap::new(),
            next_id: 1,
            next_lease: 1,
            config,
            events: Vec::new(),
        }
    }

    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Drain buffered events.
    pub fn take_events(&mut self) -> Vec<QueueEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn get(&self, id: ItemId) -> Option<&QueueItem> {
        self.items.get(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item currently holding `lease`.
    pub fn lease_owner(&self, lease: LeaseId) -> Option<ItemId> {
        self.leases.get(&lease).copied()
    }

    /// Push a status event if the item's status changed.
    fn touch(&mut self, id: ItemId) {
        let changed = self.items.get_mut(&id).and_then(QueueItem::refresh_status);
        if let Some(status) = changed {
            self.events.push(QueueEvent::status(id, status));
        }
    }

    fn item_mut(&mut self, id: ItemId) -> DownloadResult<&mut QueueItem> {
        self.items.get_mut(&id).ok_or(DownloadError::not_found(id))
    }

    // =========================================================================
    // Items
    // =========================================================================

    /// Add an item.
    ///
    /// A zero-byte item is `Finished` immediately; the caller creates the
    /// empty target and then calls [`Self::finish`].
    pub fn enqueue(
        &mut self,
        request: EnqueueRequest,
        added_at: DateTime<Utc>,
    ) -> DownloadResult<ItemId> {
        if self.config.skip_duplicates {
            if let Some(existing) = self
                .items
                .values()
                .find(|item| item.matches(&request.content, request.size))
            {
                return Err(DownloadError::duplicate(existing.id, request.content));
            }
        }
        if self.items.values().any(|item| item.target == request.target) {
            return Err(DownloadError::already_queued(
                request.target.display().to_string(),
            ));
        }

        let (priority, manual) = match request.priority {
            Some(priority) => (priority, true),
            None => (
                policy::classify(request.size, &self.config.priorities),
                false,
            ),
        };

        let id = ItemId::new(self.next_id);
        self.next_id += 1;

        let mut item = QueueItem::new(
            id,
            request.content,
            request.size,
            request.target,
            request.kind,
            priority,
            manual,
            added_at,
        );
        self.events.push(QueueEvent::ItemAdded {
            id,
            content: item.content,
            size: item.size,
            target: item.target.clone(),
            priority,
        });
        if item.size == 0 {
            item.status = ItemStatus::Finished;
            self.events
                .push(QueueEvent::status(id, ItemStatus::Finished));
        }
        self.items.insert(id, item);
        Ok(id)
    }

    /// Take an item out of the queue. `None` if it was not queued.
    pub fn remove(&mut self, id: ItemId) -> Option<RemovedItem> {
        let item = self.items.shift_remove(&id)?;
        let leases = item.leases();
        for lease in &leases {
            self.leases.remove(lease);
        }
        self.events.push(QueueEvent::ItemRemoved { id });
        Some(RemovedItem { item, leases })
    }

    /// Set a manual priority. Automatic classification no longer applies.
    ///
    /// A failed item is taken back into scheduling with its verified
    /// segments kept.
    pub fn set_priority(&mut self, id: ItemId, priority: Priority) -> DownloadResult<()> {
        let item = self.item_mut(id)?;
        item.manual_priority = true;
        let revived = item.status == ItemStatus::Failed;
        if revived {
            item.status = ItemStatus::Waiting;
            item.error = None;
        }
        if item.priority != priority {
            item.priority = priority;
            self.events
                .push(QueueEvent::PriorityChanged { id, priority });
        }
        if revived {
            self.events.push(QueueEvent::status(id, ItemStatus::Waiting));
        }
        self.touch(id);
        Ok(())
    }

    /// Pause an item. With `disconnect`, in-flight transfers are released
    /// and their leases returned for cancellation.
    pub fn pause(&mut self, id: ItemId, disconnect: bool) -> DownloadResult<Vec<LeaseId>> {
        self.set_priority(id, Priority::Paused)?;
        if !disconnect {
            return Ok(Vec::new());
        }

        let item = self.item_mut(id)?;
        let leases = item.leases();
        for lease in &leases {
            item.segments.release(*lease);
        }
        item.tree_lease = None;
        for source in item.sources.iter_mut() {
            if source.active.is_some() {
                source.end();
            }
        }
        for lease in &leases {
            self.leases.remove(lease);
        }
        self.touch(id);
        Ok(leases)
    }

    /// Retarget an item.
    pub fn move_item(&mut self, id: ItemId, target: PathBuf) -> DownloadResult<()> {
        if self
            .items
            .values()
            .any(|item| item.id != id && item.target == target)
        {
            return Err(DownloadError::already_queued(target.display().to_string()));
        }
        let item = self.item_mut(id)?;
        item.target.clone_from(&target);
        self.events.push(QueueEvent::ItemMoved { id, target });
        Ok(())
    }

    /// Mark an item finished after its target file was written.
    ///
    /// Removes it unless finished items are kept.
    pub fn finish(&mut self, id: ItemId) -> Option<PathBuf> {
        let item = self.items.get_mut(&id)?;
        let target = item.target.clone();
        item.error = None;
        if item.status != ItemStatus::Finished {
            item.status = ItemStatus::Finished;
            self.events
                .push(QueueEvent::status(id, ItemStatus::Finished));
        }
        self.events.push(QueueEvent::ItemFinished {
            id,
            target: target.clone(),
        });
        if !self.config.keep_finished {
            self.remove(id);
        }
        Some(target)
    }

    /// Fail an item for good. Returns the leases to cancel.
    pub fn fail_item(&mut self, id: ItemId, error: &DownloadError) -> Vec<LeaseId> {
        let Some(item) = self.items.get_mut(&id) else {
            return Vec::new();
        };
        let leases = item.leases();
        for lease in &leases {
            item.segments.release(*lease);
        }
        item.tree_lease = None;
        for source in item.sources.iter_mut() {
            source.end();
        }
        item.error = Some(ItemError::from(error));
        item.status = ItemStatus::Failed;
        for lease in &leases {
            self.leases.remove(lease);
        }
        self.events.push(QueueEvent::status(id, ItemStatus::Failed));
        self.events.push(QueueEvent::failed(id, error));
        leases
    }

    // =========================================================================
    // Sources
    // =========================================================================

    /// Attach a source to one item. Returns whether it was new.
    pub fn attach_source(&mut self, id: ItemId, offer: SourceOffer) -> DownloadResult<bool> {
        let item = self.item_mut(id)?;
        if !item.matches(&offer.content, offer.size) {
            return Err(DownloadError::incompatible(
                offer.peer,
                format!(
                    "offers {} ({} bytes), item is {} ({} bytes)",
                    offer.content, offer.size, item.content, item.size
                ),
            ));
        }
        if item.status == ItemStatus::Finished {
            return Ok(false);
        }
        let added = item.sources.add(offer.peer.clone());
        if added {
            self.events.push(QueueEvent::SourceAdded {
                id,
                peer: offer.peer,
            });
        }
        Ok(added)
    }

    /// Attach `offer` to every unfinished item with the same content and size.
    /// Returns the items the peer was not online for before: new sources and
    /// known ones coming back.
    pub fn source_found(&mut self, offer: &SourceOffer) -> Vec<ItemId> {
        let ids: Vec<(ItemId, bool)> = self
            .items
            .values()
            .filter(|item| {
                item.status != ItemStatus::Finished && item.matches(&offer.content, offer.size)
            })
            .map(|item| {
                let online = item.sources.get(&offer.peer).is_some_and(|s| s.online);
                (item.id, online)
            })
            .collect();
        ids.into_iter()
            .filter(|(id, online)| self.attach_source(*id, offer.clone()).is_ok() && !online)
            .map(|(id, _)| id)
            .collect()
    }

    /// Attach `peer` to every item whose content appears in its listing.
    pub fn match_listing(&mut self, peer: &PeerHandle, entries: &[ListingEntry]) -> Vec<ItemId> {
        let mut matched = Vec::new();
        for entry in entries {
            let offer = SourceOffer::new(peer.clone(), entry.content, entry.size);
            matched.extend(self.source_found(&offer));
        }
        matched
    }

    /// A peer went offline: mark it offline everywhere and release whatever
    /// it held. Returns the leases to cancel.
    pub fn source_lost(&mut self, peer: &PeerHandle) -> Vec<LeaseId> {
        let mut cancelled = Vec::new();
        let mut touched = Vec::new();
        for item in self.items.values_mut() {
            let Some(source) = item.sources.get_mut(peer) else {
                continue;
            };
            source.online = false;
            if let Some(lease) = source.active {
                source.end();
                if item.tree_lease == Some(lease) {
                    item.tree_lease = None;
                } else {
                    item.segments.release(lease);
                }
                cancelled.push(lease);
            }
            self.events.push(QueueEvent::source_dropped(
                item.id,
                peer.clone(),
                FailureKind::Network,
                true,
            ));
            touched.push(item.id);
        }
        for lease in &cancelled {
            self.leases.remove(lease);
        }
        for id in touched {
            self.touch(id);
        }
        cancelled
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Schedulable items: priority descending, oldest first within a class.
    fn schedule_order(&self) -> Vec<ItemId> {
        let mut order: Vec<&QueueItem> = self
            .items
            .values()
            .filter(|item| item.is_schedulable())
            .collect();
        order.sort_by(|a, b| b.priority.cmp(&a.priority));
        order.into_iter().map(|item| item.id).collect()
    }

    /// One scheduling pass.
    ///
    /// Items without a tree get a tree fetch from their first idle source.
    /// Otherwise the item is split (first time) or re-split, and pending
    /// segments go to idle sources while `free_slots` lasts (`None` means
    /// unlimited).
    pub fn schedule(&mut self, now: Instant, free_slots: Option<usize>) -> SchedulePass {
        let mut pass = SchedulePass::default();
        let mut budget = free_slots;
        let mut touched = Vec::new();

        let order = self.schedule_order();
        let Self {
            items,
            leases,
            next_lease,
            config,
            ..
        } = self;

        for id in order {
            if budget == Some(0) {
                pass.slots_exhausted = true;
                break;
            }
            let Some(item) = items.get_mut(&id) else {
                continue;
            };
            let idle = item.sources.idle(now);
            if idle.is_empty() {
                continue;
            }

            let Some(tree) = item.tree.clone() else {
                if item.tree_lease.is_none() {
                    let peer = idle[0].clone();
                    let lease = allocate(next_lease);
                    item.tree_lease = Some(lease);
                    if let Some(source) = item.sources.get_mut(&peer) {
                        source.begin(lease, now);
                    }
                    leases.insert(lease, id);
                    pass.actions.push(Action::FetchTree(TreeFetch {
                        item: id,
                        lease,
                        peer,
                        root: item.content,
                    }));
                    touched.push(id);
                }
                continue;
            };

            if item.segments.is_split() {
                item.segments.resplit(idle.len());
            } else {
                item.segments
                    .split(config.segments, item.sources.online_count());
            }

            for peer in idle {
                if budget == Some(0) {
                    pass.slots_exhausted = true;
                    break;
                }
                let Some(index) = item.segments.next_pending() else {
                    break;
                };
                let lease = allocate(next_lease);
                let Some(segment) = item.segments.assign(index, peer.clone(), lease) else {
                    break;
                };
                let request = SegmentRequest {
                    content: item.content,
                    offset: segment.offset,
                    length: segment.length,
                };
                if let Some(source) = item.sources.get_mut(&peer) {
                    source.begin(lease, now);
                }
                leases.insert(lease, id);
                pass.actions.push(Action::Transfer(Assignment {
                    item: id,
                    lease,
                    peer,
                    request,
                    partial: item.partial.clone(),
                    tree: Arc::clone(&tree),
                }));
                budget = budget.map(|free| free - 1);
                touched.push(id);
            }
        }

        for id in touched {
            self.touch(id);
        }
        pass
    }

    /// Give back a lease handed out by [`Self::schedule`] that was never
    /// started (e.g. no slot could be taken after all).
    pub fn unassign(&mut self, lease: LeaseId) {
        let Some(id) = self.leases.remove(&lease) else {
            return;
        };
        if let Some(item) = self.items.get_mut(&id) {
            let holder = if item.tree_lease == Some(lease) {
                item.tree_lease = None;
                item.sources.holder_of(lease).cloned()
            } else {
                item.segments.release(lease)
            };
            if let Some(source) = holder.and_then(|peer| item.sources.get_mut(&peer)) {
                source.end();
            }
        }
        self.touch(id);
    }

    // =========================================================================
    // Transfer results
    // =========================================================================

    /// Bytes arrived for a segment. `delta` is new since the last report,
    /// `received` the segment total.
    pub fn record_progress(&mut self, lease: LeaseId, delta: u64, received: u64, now: Instant) {
        let floor = self.config.drop.speed_floor;
        let Some(&id) = self.leases.get(&lease) else {
            return;
        };
        let Some(item) = self.items.get_mut(&id) else {
            return;
        };
        let Some(segment) = item.segments.record_received(lease, received) else {
            return;
        };
        let (offset, length, received) = (segment.offset, segment.length, segment.received);
        let holder = segment.source.clone();

        let speed_bps = holder
            .and_then(|peer| item.sources.get_mut(&peer))
            .map_or(0, |source| {
                source.speed.record(now, delta);
                if delta > 0 {
                    source.last_progress = Some(now);
                }
                source.track_slowness(now, floor);
                source.bytes_per_sec(now)
            });
        self.events.push(QueueEvent::SegmentProgress {
            id,
            offset,
            received,
            length,
            speed_bps,
        });
    }

    /// All bytes of a segment arrived; block hashes are being checked.
    pub fn segment_verifying(&mut self, lease: LeaseId) {
        let Some(&id) = self.leases.get(&lease) else {
            return;
        };
        if let Some(item) = self.items.get_mut(&id) {
            item.segments.mark_verifying(lease);
        }
    }

    /// A segment passed block verification with the given observed leaves.
    pub fn segment_verified(
        &mut self,
        lease: LeaseId,
        leaves: Vec<dcq_core::TigerHash>,
    ) -> VerifiedOutcome {
        let Some(id) = self.leases.remove(&lease) else {
            return VerifiedOutcome::Stale;
        };
        let Some(item) = self.items.get_mut(&id) else {
            return VerifiedOutcome::Stale;
        };
        let Some(done) = item.segments.mark_verified(lease, leaves) else {
            return VerifiedOutcome::Stale;
        };
        if let Some(source) = done
            .source
            .as_ref()
            .and_then(|peer| item.sources.get_mut(peer))
        {
            source.end();
        }
        self.events.push(QueueEvent::SegmentVerified {
            id,
            offset: done.offset,
            length: done.length,
            verified: item.segments.verified_bytes(),
            total: item.size,
        });

        let outcome = match (&item.tree, item.segments.all_verified()) {
            (Some(tree), true) => {
                let observed = item.segments.observed_leaves();
                if tree.verify_whole(&observed) {
                    VerifiedOutcome::Complete {
                        id,
                        partial: item.partial.clone(),
                        target: item.target.clone(),
                    }
                } else {
                    let actual = root_from_leaves(&observed).map_or_else(
                        |e| e.to_string(),
                        |root| root.to_base32(),
                    );
                    let error = DownloadError::tree_mismatch(tree.root().to_base32(), actual);
                    item.segments.reset_all();
                    item.error = Some(ItemError::from(&error));
                    self.events.push(QueueEvent::failed(id, &error));
                    VerifiedOutcome::TreeMismatch { id }
                }
            }
            _ => VerifiedOutcome::Continue,
        };
        self.touch(id);
        outcome
    }

    /// A segment transfer failed.
    ///
    /// `Cancelled` releases the segment without counting a retry. `Io`
    /// errors fail the whole item. Everything else returns the segment to
    /// pending and is charged to the source.
    pub fn segment_failed(
        &mut self,
        lease: LeaseId,
        error: &DownloadError,
        now: Instant,
    ) -> FailureOutcome {
        let Some(id) = self.leases.remove(&lease) else {
            return FailureOutcome::Stale;
        };
        let Some(item) = self.items.get_mut(&id) else {
            return FailureOutcome::Stale;
        };
        let holder = if error.is_cancelled() {
            item.segments.release(lease)
        } else {
            item.segments.fail(lease)
        };

        if matches!(error, DownloadError::Io { .. }) {
            if let Some(source) = holder.as_ref().and_then(|peer| item.sources.get_mut(peer)) {
                source.end();
            }
            let cancel = self.fail_item(id, error);
            return FailureOutcome::ItemFailed { id, cancel };
        }

        if matches!(error, DownloadError::ChecksumMismatch { .. }) {
            item.error = Some(ItemError::from(error));
            self.events.push(QueueEvent::failed(id, error));
        }
        if let Some(peer) = holder {
            self.charge_source(id, &peer, error, now);
        }
        self.touch(id);
        FailureOutcome::Retry
    }

    /// A tree fetch finished. Returns whether the item now has its tree.
    pub fn tree_fetched(
        &mut self,
        lease: LeaseId,
        result: DownloadResult<RemoteTree>,
        now: Instant,
    ) -> bool {
        let Some(id) = self.leases.remove(&lease) else {
            return false;
        };
        let Some(item) = self.items.get_mut(&id) else {
            return false;
        };
        if item.tree_lease != Some(lease) {
            return false;
        }
        item.tree_lease = None;
        let Some(peer) = item.sources.holder_of(lease).cloned() else {
            self.touch(id);
            return false;
        };

        let installed = match result.and_then(|remote| accept_tree(item, &peer, remote)) {
            Ok(tree) => {
                item.tree = Some(Arc::new(tree));
                if let Some(source) = item.sources.get_mut(&peer) {
                    source.end();
                }
                true
            }
            Err(error) => {
                self.charge_source(id, &peer, &error, now);
                false
            }
        };
        self.touch(id);
        installed
    }

    /// Apply the consequences of `error` to the source `peer` of item `id`.
    fn charge_source(&mut self, id: ItemId, peer: &PeerHandle, error: &DownloadError, now: Instant) {
        let max_failures = self.config.max_source_failures;
        let backoff = self.config.drop.retry_backoff;
        let Some(item) = self.items.get_mut(&id) else {
            return;
        };
        let Some(source) = item.sources.get_mut(peer) else {
            return;
        };
        source.end();

        let kind = error.kind();
        let kept = match error {
            DownloadError::Cancelled => return,
            DownloadError::PassiveUserUnreachable { .. } => {
                source.online = false;
                true
            }
            DownloadError::RemoteLacksVerification { .. }
            | DownloadError::IncompatibleSource { .. } => false,
            DownloadError::SourceTooSlow { .. } => {
                source.retry_after = Some(now + backoff);
                true
            }
            _ => {
                source.failures += 1;
                if matches!(error, DownloadError::Network { .. }) {
                    source.retry_after = Some(now + backoff);
                }
                source.failures < max_failures
            }
        };
        if !kept {
            item.sources.remove(peer);
        }
        if !kept || kind != FailureKind::ChecksumMismatch {
            self.events
                .push(QueueEvent::source_dropped(id, peer.clone(), kind, kept));
        }
    }

    // =========================================================================
    // Background passes
    // =========================================================================

    /// Drop slow or stalled sources. Returns the applied decisions; their
    /// leases must be cancelled.
    pub fn drop_pass(&mut self, now: Instant) -> Vec<DropDecision> {
        let floor = self.config.drop.speed_floor;
        for item in self.items.values_mut() {
            let QueueItem {
                sources, segments, ..
            } = item;
            for source in sources.iter_mut() {
                let transferring = source
                    .active
                    .is_some_and(|lease| segments.find_lease(lease).is_some());
                if !transferring {
                    continue;
                }
                source.track_slowness(now, floor);
            }
        }

        let decisions = policy::drop::plan(&self.config.drop, self.items.values(), now);
        let backoff = self.config.drop.retry_backoff;
        for decision in &decisions {
            self.leases.remove(&decision.lease);
            let Some(item) = self.items.get_mut(&decision.item) else {
                continue;
            };
            item.segments.release(decision.lease);
            let kept = match decision.action {
                DropAction::Remove => {
                    item.sources.remove(&decision.peer);
                    false
                }
                DropAction::Disconnect => {
                    if let Some(source) = item.sources.get_mut(&decision.peer) {
                        source.end();
                        source.speed.clear();
                        source.retry_after = Some(now + backoff);
                    }
                    true
                }
            };
            self.events.push(QueueEvent::source_dropped(
                decision.item,
                decision.peer.clone(),
                FailureKind::SourceTooSlow,
                kept,
            ));
            self.touch(decision.item);
        }
        decisions
    }

    /// Items to search sources for, most urgent first.
    pub fn search_candidates(&self) -> Vec<(ItemId, ContentId)> {
        policy::search_candidates(&self.config.search, self.items.values())
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn summaries(&self, now: Instant) -> Vec<ItemSummary> {
        self.items.values().map(|item| item.summary(now)).collect()
    }

    pub fn snapshot(&self, now: Instant) -> QueueSnapshot {
        QueueSnapshot::from_items(self.summaries(now))
    }

    pub fn targets(&self) -> Vec<PathBuf> {
        self.items.values().map(|item| item.target.clone()).collect()
    }

    pub fn sources(&self, id: ItemId, now: Instant) -> DownloadResult<ItemSources> {
        let item = self.items.get(&id).ok_or(DownloadError::not_found(id))?;
        Ok(ItemSources::from_sources(item.sources.summaries(now)))
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn to_persisted(&self) -> Vec<PersistedItem> {
        self.items.values().map(QueueItem::to_persisted).collect()
    }

    /// Load persisted items into the queue. Items whose id, target or
    /// content collides with a present item are skipped. Returns how many
    /// were restored.
    pub fn restore(&mut self, persisted: Vec<PersistedItem>) -> usize {
        let mut restored = 0;
        for entry in persisted {
            let item = QueueItem::from_persisted(entry);
            let collides = self.items.contains_key(&item.id)
                || self.items.values().any(|existing| {
                    existing.target == item.target
                        || (self.config.skip_duplicates && existing.matches(&item.content, item.size))
                });
            if collides {
                continue;
            }
            self.next_id = self.next_id.max(item.id.get() + 1);
            self.items.insert(item.id, item);
            restored += 1;
        }
        restored
    }
}

/// Check a peer's tree against the item and bring it to the item's block size.
fn accept_tree(item: &QueueItem, peer: &PeerHandle, remote: RemoteTree) -> DownloadResult<HashTree> {
    if remote.block_size > item.block_size() {
        return Err(DownloadError::RemoteLacksVerification { peer: peer.clone() });
    }
    HashTree::from_leaves(item.content, item.size, remote.block_size, remote.leaves)
        .and_then(|tree| tree.coarsen_to(item.block_size()))
        .map_err(|e| DownloadError::incompatible(peer.clone(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use dcq_core::{DropConfig, ItemKind, PriorityThresholds, SegmentSizing, SegmentState};

    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;

    fn peer(name: &str) -> PeerHandle {
        PeerHandle::new(name, "hub")
    }

    fn config() -> QueueConfig {
        QueueConfig::default().with_segments(SegmentSizing::Fixed(MIB))
    }

    /// Data, its tree, and an enqueue request for it.
    fn content(size: usize, seed: u8) -> (Vec<u8>, HashTree, EnqueueRequest) {
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8 ^ seed).collect();
        let tree = HashTree::from_data(&data, crate::tree::default_block_size(size as u64)).unwrap();
        let request = EnqueueRequest::new(*tree.root(), size as u64, format!("/d/file-{seed}"));
        (data, tree, request)
    }

    fn remote(tree: &HashTree) -> RemoteTree {
        RemoteTree {
            block_size: tree.block_size(),
            leaves: tree.leaves().to_vec(),
        }
    }

    fn offer(name: &str, request: &EnqueueRequest) -> SourceOffer {
        SourceOffer::new(peer(name), request.content, request.size)
    }

    fn transfers(pass: &SchedulePass) -> Vec<Assignment> {
        pass.actions
            .iter()
            .filter_map(|action| match action {
                Action::Transfer(a) => Some(a.clone()),
                Action::FetchTree(_) => None,
            })
            .collect()
    }

    fn tree_fetch(pass: &SchedulePass) -> TreeFetch {
        pass.actions
            .iter()
            .find_map(|action| match action {
                Action::FetchTree(f) => Some(f.clone()),
                Action::Transfer(_) => None,
            })
            .unwrap()
    }

    /// Leaves a worker would observe for `assignment` over `data`.
    fn observe(assignment: &Assignment, data: &[u8]) -> Vec<dcq_core::TigerHash> {
        let start = assignment.request.offset as usize;
        let end = start + assignment.request.length as usize;
        data[start..end]
            .chunks(assignment.tree.block_size() as usize)
            .map(crate::tree::hash_block)
            .collect()
    }

    #[test]
    fn test_enqueue_without_sources_waits_unsplit() {
        let mut queue = DownloadQueue::new(config());
        let request = EnqueueRequest::new(dcq_core::TigerHash::from_bytes([1; 24]), 100_000_000, "/d/x");
        let id = queue.enqueue(request, Utc::now()).unwrap();

        let item = queue.get(id).unwrap();
        assert_eq!(item.status, ItemStatus::Waiting);
        assert_eq!(item.segments.len(), 0);
        assert!(queue.schedule(Instant::now(), None).actions.is_empty());
    }

    #[test]
    fn test_duplicate_enqueue_returns_existing() {
        let mut queue = DownloadQueue::new(config());
        let (_, _, request) = content(5000, 1);
        let id = queue.enqueue(request.clone(), Utc::now()).unwrap();
        queue.take_events();

        let mut again = request.clone();
        again.target = PathBuf::from("/elsewhere");
        let err = queue.enqueue(again, Utc::now()).unwrap_err();
        assert_eq!(err, DownloadError::duplicate(id, request.content));
        assert_eq!(queue.len(), 1);
        assert!(queue.take_events().is_empty());
    }

    #[test]
    fn test_same_target_rejected() {
        let mut queue = DownloadQueue::new(config());
        let (_, _, first) = content(5000, 1);
        let (_, _, mut second) = content(5000, 2);
        second.target.clone_from(&first.target);
        queue.enqueue(first, Utc::now()).unwrap();
        assert!(matches!(
            queue.enqueue(second, Utc::now()),
            Err(DownloadError::AlreadyQueued { .. })
        ));
    }

    #[test]
    fn test_zero_size_finishes_immediately() {
        let mut queue = DownloadQueue::new(config().with_keep_finished(true));
        let request = EnqueueRequest::new(dcq_core::TigerHash::from_bytes([0; 24]), 0, "/d/empty");
        let id = queue.enqueue(request, Utc::now()).unwrap();
        let item = queue.get(id).unwrap();
        assert_eq!(item.status, ItemStatus::Finished);
        assert_eq!(item.segments.len(), 0);
    }

    #[test]
    fn test_automatic_and_manual_priority() {
        let thresholds = PriorityThresholds {
            highest_max: 64 * KIB,
            ..PriorityThresholds::default()
        };
        let mut queue = DownloadQueue::new(config().with_priorities(thresholds));
        let (_, _, request) = content(32 * 1024, 3);
        let id = queue.enqueue(request, Utc::now()).unwrap();
        assert_eq!(queue.get(id).unwrap().priority, Priority::Highest);
        assert!(!queue.get(id).unwrap().manual_priority);

        queue.set_priority(id, Priority::Low).unwrap();
        let item = queue.get(id).unwrap();
        assert_eq!(item.priority, Priority::Low);
        assert!(item.manual_priority);
    }

    #[test]
    fn test_incompatible_source_rejected() {
        let mut queue = DownloadQueue::new(config());
        let (_, _, request) = content(5000, 1);
        let id = queue.enqueue(request.clone(), Utc::now()).unwrap();
        let bad = SourceOffer::new(peer("a"), request.content, 4999);
        assert!(matches!(
            queue.attach_source(id, bad),
            Err(DownloadError::IncompatibleSource { .. })
        ));
        assert!(queue.get(id).unwrap().sources.is_empty());
    }

    #[test]
    fn test_full_download_completes() {
        let mut queue = DownloadQueue::new(config());
        let (data, tree, request) = content(3 * MIB as usize + 100, 7);
        let id = queue.enqueue(request.clone(), Utc::now()).unwrap();
        queue.attach_source(id, offer("s1", &request)).unwrap();
        queue.attach_source(id, offer("s2", &request)).unwrap();
        let now = Instant::now();

        // First pass fetches the tree.
        let pass = queue.schedule(now, None);
        let fetch = tree_fetch(&pass);
        assert_eq!(queue.get(id).unwrap().status, ItemStatus::Running);
        assert!(queue.tree_fetched(fetch.lease, Ok(remote(&tree)), now));

        loop {
            let pass = queue.schedule(now, Some(3));
            let assigned = transfers(&pass);
            if assigned.is_empty() {
                break;
            }
            assert!(queue.get(id).unwrap().segments.covers_exactly());
            for assignment in assigned {
                queue.record_progress(assignment.lease, 10, 10, now);
                queue.segment_verifying(assignment.lease);
                let outcome = queue.segment_verified(assignment.lease, observe(&assignment, &data));
                if let VerifiedOutcome::Complete { target, .. } = outcome {
                    assert_eq!(target, request.target);
                    queue.finish(id);
                }
            }
        }
        assert!(queue.get(id).is_none());
        let events = queue.take_events();
        assert!(events.contains(&QueueEvent::ItemFinished {
            id,
            target: request.target.clone(),
        }));
    }

    #[test]
    fn test_segments_single_holder_and_slot_budget() {
        let mut queue = DownloadQueue::new(config());
        let (_, tree, request) = content(4 * MIB as usize, 2);
        let id = queue.enqueue(request.clone(), Utc::now()).unwrap();
        for name in ["a", "b", "c"] {
            queue.attach_source(id, offer(name, &request)).unwrap();
        }
        let now = Instant::now();
        let fetch = tree_fetch(&queue.schedule(now, None));
        queue.tree_fetched(fetch.lease, Ok(remote(&tree)), now);

        let pass = queue.schedule(now, Some(2));
        assert_eq!(transfers(&pass).len(), 2);
        assert!(pass.slots_exhausted);

        let pass = queue.schedule(now, None);
        assert_eq!(transfers(&pass).len(), 1);

        let item = queue.get(id).unwrap();
        let holders: Vec<_> = item.segments.iter().filter_map(|s| s.source.clone()).collect();
        assert_eq!(holders.len(), 3);
        let mut unique = holders.clone();
        unique.sort_by(|a, b| a.user.cmp(&b.user));
        unique.dedup();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_tree_mismatch_resets_all_segments() {
        let mut queue = DownloadQueue::new(config());
        let (data, tree, request) = content(2 * MIB as usize, 4);
        let id = queue.enqueue(request.clone(), Utc::now()).unwrap();
        queue.attach_source(id, offer("s1", &request)).unwrap();
        let now = Instant::now();
        let fetch = tree_fetch(&queue.schedule(now, None));
        queue.tree_fetched(fetch.lease, Ok(remote(&tree)), now);

        let mut outcome = VerifiedOutcome::Continue;
        let mut corrupted = false;
        while let Some(assignment) = transfers(&queue.schedule(now, None)).pop() {
            let mut leaves = observe(&assignment, &data);
            if !corrupted {
                leaves[0] = dcq_core::TigerHash::from_bytes([0xEE; 24]);
                corrupted = true;
            }
            outcome = queue.segment_verified(assignment.lease, leaves);
            if outcome != VerifiedOutcome::Continue {
                break;
            }
        }
        assert_eq!(outcome, VerifiedOutcome::TreeMismatch { id });
        let item = queue.get(id).unwrap();
        assert!(item.segments.iter().all(|s| s.state == SegmentState::Pending));
        assert_eq!(
            item.error.as_ref().map(|e| e.kind),
            Some(FailureKind::TreeMismatch)
        );
    }

    #[test]
    fn test_checksum_failure_charges_source_until_removed() {
        let mut queue = DownloadQueue::new(config().with_max_source_failures(2));
        let (_, tree, request) = content(2 * MIB as usize, 5);
        let id = queue.enqueue(request.clone(), Utc::now()).unwrap();
        queue.attach_source(id, offer("bad", &request)).unwrap();
        let now = Instant::now();
        let fetch = tree_fetch(&queue.schedule(now, None));
        queue.tree_fetched(fetch.lease, Ok(remote(&tree)), now);

        let error = DownloadError::ChecksumMismatch { block: 0 };
        for _ in 0..2 {
            let assignment = transfers(&queue.schedule(now, None)).pop().unwrap();
            assert_eq!(
                queue.segment_failed(assignment.lease, &error, now),
                FailureOutcome::Retry
            );
        }
        let item = queue.get(id).unwrap();
        assert!(item.sources.is_empty());
        assert_eq!(item.segments.get(0).unwrap().retries, 2);
        assert_eq!(item.status, ItemStatus::Waiting);
    }

    #[test]
    fn test_priority_change_revives_failed_item() {
        let mut queue = DownloadQueue::new(config());
        let (_, tree, request) = content(2 * MIB as usize, 16);
        let id = queue.enqueue(request.clone(), Utc::now()).unwrap();
        queue.attach_source(id, offer("s1", &request)).unwrap();
        let now = Instant::now();
        let fetch = tree_fetch(&queue.schedule(now, None));
        queue.tree_fetched(fetch.lease, Ok(remote(&tree)), now);
        let assignment = transfers(&queue.schedule(now, None)).pop().unwrap();

        let error = DownloadError::io("PermissionDenied", "read-only target");
        assert!(matches!(
            queue.segment_failed(assignment.lease, &error, now),
            FailureOutcome::ItemFailed { .. }
        ));
        assert_eq!(queue.get(id).unwrap().status, ItemStatus::Failed);
        assert!(queue.schedule(now, None).actions.is_empty());
        // Still holds its target.
        assert!(queue.enqueue(request.clone(), Utc::now()).is_err());

        queue.take_events();
        queue.set_priority(id, Priority::Normal).unwrap();
        let item = queue.get(id).unwrap();
        assert_eq!(item.status, ItemStatus::Waiting);
        assert!(item.error.is_none());
        assert!(queue.take_events().iter().any(|e| matches!(
            e,
            QueueEvent::StatusChanged { status: ItemStatus::Waiting, .. }
        )));
        assert_eq!(transfers(&queue.schedule(now, None)).len(), 1);
    }

    #[test]
    fn test_stale_results_ignored() {
        let mut queue = DownloadQueue::new(config());
        let (_, tree, request) = content(2 * MIB as usize, 6);
        let id = queue.enqueue(request.clone(), Utc::now()).unwrap();
        queue.attach_source(id, offer("s1", &request)).unwrap();
        let now = Instant::now();
        let fetch = tree_fetch(&queue.schedule(now, None));
        queue.tree_fetched(fetch.lease, Ok(remote(&tree)), now);
        let assignment = transfers(&queue.schedule(now, None)).pop().unwrap();

        let cancelled = queue.pause(id, true).unwrap();
        assert_eq!(cancelled, vec![assignment.lease]);
        assert_eq!(
            queue.segment_verified(assignment.lease, Vec::new()),
            VerifiedOutcome::Stale
        );
        assert_eq!(
            queue.segment_failed(assignment.lease, &DownloadError::Cancelled, now),
            FailureOutcome::Stale
        );
        assert_eq!(queue.get(id).unwrap().status, ItemStatus::Paused);
        assert!(queue.schedule(now, None).actions.is_empty());
    }

    #[test]
    fn test_coarser_remote_tree_removes_source() {
        let mut queue = DownloadQueue::new(config());
        let (data, _, request) = content(2 * MIB as usize, 8);
        let id = queue.enqueue(request.clone(), Utc::now()).unwrap();
        queue.attach_source(id, offer("s1", &request)).unwrap();
        let now = Instant::now();
        let fetch = tree_fetch(&queue.schedule(now, None));

        let coarse = HashTree::from_data(&data, 2 * MIB).unwrap();
        assert!(!queue.tree_fetched(fetch.lease, Ok(remote(&coarse)), now));
        assert!(queue.get(id).unwrap().sources.is_empty());
    }

    #[test]
    fn test_finer_remote_tree_is_coarsened() {
        let mut queue = DownloadQueue::new(config());
        let (data, tree, request) = content(2 * MIB as usize, 9);
        let id = queue.enqueue(request.clone(), Utc::now()).unwrap();
        queue.attach_source(id, offer("s1", &request)).unwrap();
        let now = Instant::now();
        let fetch = tree_fetch(&queue.schedule(now, None));

        let fine = HashTree::from_data(&data, tree.block_size() / 4).unwrap();
        assert!(queue.tree_fetched(fetch.lease, Ok(remote(&fine)), now));
        assert_eq!(
            queue.get(id).unwrap().tree.as_deref().map(HashTree::leaves),
            Some(tree.leaves())
        );
    }

    #[test]
    fn test_drop_pass_respects_online_floor() {
        let drop = DropConfig {
            speed_floor: 1024,
            min_elapsed: Duration::from_secs(15),
            inactivity: Duration::from_secs(600),
            min_sources_online: 1,
            min_filesize: 0,
            drop_slow_sources: true,
            disconnect_only: false,
            ..DropConfig::default()
        };
        let mut queue = DownloadQueue::new(config().with_drop(drop));
        let (_, tree, request) = content(4 * MIB as usize, 10);
        let id = queue.enqueue(request.clone(), Utc::now()).unwrap();
        queue.attach_source(id, offer("s1", &request)).unwrap();
        let start = Instant::now();
        let fetch = tree_fetch(&queue.schedule(start, None));
        queue.tree_fetched(fetch.lease, Ok(remote(&tree)), start);
        let assignment = transfers(&queue.schedule(start, None)).pop().unwrap();

        queue.record_progress(assignment.lease, 100, 100, start);
        assert!(queue.drop_pass(start).is_empty());
        let later = start + Duration::from_secs(16);
        queue.record_progress(assignment.lease, 100, 200, later);
        assert!(queue.drop_pass(later).is_empty());
        assert_eq!(queue.get(id).unwrap().sources.len(), 1);

        // A second online source lifts the floor.
        queue.attach_source(id, offer("s2", &request)).unwrap();
        let dropped = queue.drop_pass(later);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].peer, peer("s1"));
        let item = queue.get(id).unwrap();
        assert!(!item.sources.contains(&peer("s1")));
        assert_eq!(item.segments.in_flight_count(), 0);
    }

    #[test]
    fn test_slow_source_dropped_at_first_check_past_min_elapsed() {
        let drop = DropConfig {
            speed_floor: 1024,
            check_interval: Duration::from_secs(10),
            min_elapsed: Duration::from_secs(15),
            inactivity: Duration::from_secs(600),
            min_sources_online: 1,
            min_filesize: 0,
            drop_slow_sources: true,
            disconnect_only: true,
            ..DropConfig::default()
        };
        let mut queue = DownloadQueue::new(config().with_drop(drop));
        let (_, tree, request) = content(4 * MIB as usize, 14);
        let id = queue.enqueue(request.clone(), Utc::now()).unwrap();
        queue.attach_source(id, offer("s1", &request)).unwrap();
        let start = Instant::now();
        let fetch = tree_fetch(&queue.schedule(start, None));
        queue.tree_fetched(fetch.lease, Ok(remote(&tree)), start);
        let assignment = transfers(&queue.schedule(start, None)).pop().unwrap();
        queue.attach_source(id, offer("s2", &request)).unwrap();

        // 500 B/s, with the drop check running every 10 s.
        let mut received = 0;
        let mut checks = Vec::new();
        for second in 1..=30u64 {
            let now = start + Duration::from_secs(second);
            received += 500;
            queue.record_progress(assignment.lease, 500, received, now);
            if second % 10 == 0 {
                checks.push((second, queue.drop_pass(now).len()));
            }
        }
        assert_eq!(checks, vec![(10, 0), (20, 1), (30, 0)]);

        let item = queue.get(id).unwrap();
        let s1 = item.sources.get(&peer("s1")).unwrap();
        assert!(s1.active.is_none());
        assert!(s1.retry_after.is_some());
        assert!(queue.take_events().iter().any(|e| matches!(
            e,
            QueueEvent::SourceDropped { kept: true, reason: FailureKind::SourceTooSlow, .. }
        )));
    }

    #[test]
    fn test_source_lost_releases_segments() {
        let mut queue = DownloadQueue::new(config());
        let (_, tree, request) = content(2 * MIB as usize, 11);
        let id = queue.enqueue(request.clone(), Utc::now()).unwrap();
        queue.attach_source(id, offer("s1", &request)).unwrap();
        let now = Instant::now();
        let fetch = tree_fetch(&queue.schedule(now, None));
        queue.tree_fetched(fetch.lease, Ok(remote(&tree)), now);
        let assignment = transfers(&queue.schedule(now, None)).pop().unwrap();

        assert_eq!(queue.source_lost(&peer("s1")), vec![assignment.lease]);
        let item = queue.get(id).unwrap();
        assert_eq!(item.sources.online_count(), 0);
        assert_eq!(item.status, ItemStatus::Waiting);

        // Reported again by discovery: back online.
        assert!(queue.source_found(&offer("s1", &request)).is_empty());
        assert_eq!(queue.get(id).unwrap().sources.online_count(), 1);
    }

    #[test]
    fn test_source_found_reports_returning_peer() {
        let mut queue = DownloadQueue::new(config());
        let (_, _, request) = content(MIB as usize, 17);
        let id = queue.enqueue(request.clone(), Utc::now()).unwrap();
        let bob = offer("bob", &request);

        assert_eq!(queue.source_found(&bob), vec![id]);
        assert!(queue.source_found(&bob).is_empty());

        queue.source_lost(&peer("bob"));
        assert_eq!(queue.get(id).unwrap().sources.online_count(), 0);
        assert_eq!(queue.source_found(&bob), vec![id]);
        assert_eq!(queue.get(id).unwrap().sources.online_count(), 1);
    }

    #[test]
    fn test_match_listing_attaches_to_matching_items() {
        let mut queue = DownloadQueue::new(config());
        let (_, _, a) = content(5000, 1);
        let (_, _, b) = content(6000, 2);
        let id_a = queue.enqueue(a.clone(), Utc::now()).unwrap();
        queue.enqueue(b, Utc::now()).unwrap();
        let entries = vec![
            ListingEntry {
                content: a.content,
                size: a.size,
                path: "share/a.bin".to_string(),
            },
            ListingEntry {
                content: dcq_core::TigerHash::from_bytes([3; 24]),
                size: 1,
                path: "share/other".to_string(),
            },
        ];
        assert_eq!(queue.match_listing(&peer("p"), &entries), vec![id_a]);
    }

    #[test]
    fn test_persist_and_restore_keeps_progress() {
        let mut queue = DownloadQueue::new(config());
        let (data, tree, request) = content(2 * MIB as usize, 12);
        let id = queue.enqueue(request.clone(), Utc::now()).unwrap();
        queue.attach_source(id, offer("s1", &request)).unwrap();
        let now = Instant::now();
        let fetch = tree_fetch(&queue.schedule(now, None));
        queue.tree_fetched(fetch.lease, Ok(remote(&tree)), now);
        let assignment = transfers(&queue.schedule(now, None)).pop().unwrap();
        queue.segment_verified(assignment.lease, observe(&assignment, &data));

        let mut restored = DownloadQueue::new(config());
        assert_eq!(restored.restore(queue.to_persisted()), 1);
        let item = restored.get(id).unwrap();
        assert_eq!(item.segments.verified_bytes(), MIB);
        assert!(item.tree.is_some());

        let (_, _, next) = content(7000, 13);
        let next_id = restored.enqueue(next, Utc::now()).unwrap();
        assert!(next_id.get() > id.get());
    }

    #[test]
    fn test_search_candidates_skip_well_sourced() {
        let mut queue = DownloadQueue::new(config());
        let (_, _, a) = content(5000, 1);
        let (_, _, b) = content(6000, 2);
        let id_a = queue.enqueue(a, Utc::now()).unwrap();
        let id_b = queue.enqueue(b.clone(), Utc::now()).unwrap();
        for n in 0..5 {
            queue.attach_source(id_b, offer(&format!("p{n}"), &b)).unwrap();
        }
        let ids: Vec<ItemId> = queue.search_candidates().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![id_a]);
    }

    #[test]
    fn test_kind_is_carried() {
        let mut queue = DownloadQueue::new(config());
        let (_, _, request) = content(5000, 1);
        let id = queue
            .enqueue(request.with_kind(ItemKind::Listing), Utc::now())
            .unwrap();
        assert_eq!(queue.get(id).unwrap().kind, ItemKind::Listing);
    }
}
