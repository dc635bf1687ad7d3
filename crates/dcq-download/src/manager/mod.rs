//! Queue manager implementation.
//!
//! This module provides the concrete implementation of `QueueManagerPort`
//! with a long-lived runner task, lease-based transfer tracking, and clean
//! separation between the worker (transfer and verification) and the queue
//! state machine.
//!
//! # Architecture
//!
//! - **Handle**: cheap to clone; turns port calls into runner commands
//! - **Runner**: owns the `DownloadQueue`, spawns workers, runs periodic passes
//! - **Worker**: streams one segment, verifies blocks, writes the partial file
//!
//! # Concurrency Model
//!
//! - The runner is the single writer of all queue state
//! - Commands arrive over one mpsc channel (API calls, worker reports, timers)
//! - Lease ids prevent stale worker results from being applied
//! - Slot counters are the only state shared across tasks (atomics)

mod commands;
mod partial;
mod worker;

use std::collections::{HashMap, HashSet};
use std::future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior, interval, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dcq_core::{
    ContentId, DiscoveryPort, DownloadError, DownloadResult, EnqueueRequest, ItemId, ItemSources,
    ItemStatus, ItemSummary, PeerHandle, Priority, QueueConfig, QueueEvent,
    QueueEventEmitterPort, QueueManagerPort, QueueSnapshot, QueueStateRepositoryPort,
    SourceOffer, parse_magnet,
};

use crate::policy::{DropAction, SearchGuard};
use crate::queue::{Action, DownloadQueue, FailureOutcome, LeaseId, VerifiedOutcome};
use crate::slots::{ExtraSlotChange, ExtraSlotPolicy, SlotKind, SlotLedger};

use commands::{Command, Reply, WorkerEvent};
use worker::{TransferJob, WorkerDeps};

/// Dependencies for creating a queue manager.
///
/// This struct bundles all the ports and configuration needed
/// to construct a running queue.
pub struct QueueManagerDeps<D, R, E>
where
    D: DiscoveryPort + 'static,
    R: QueueStateRepositoryPort + 'static,
    E: QueueEventEmitterPort + 'static,
{
    /// Port for reaching peers.
    pub discovery: Arc<D>,
    /// Port for persisting queue state.
    pub repository: Arc<R>,
    /// Port for emitting queue events.
    pub emitter: Arc<E>,
    /// Engine configuration.
    pub config: QueueConfig,
}

/// Restore the persisted queue and start its runner.
///
/// Must be called within a Tokio runtime. Returns a handle implementing
/// `QueueManagerPort` that can be stored as `Arc<dyn QueueManagerPort>`.
pub async fn build_queue_manager<D, R, E>(deps: QueueManagerDeps<D, R, E>) -> QueueHandle
where
    D: DiscoveryPort + 'static,
    R: QueueStateRepositoryPort + 'static,
    E: QueueEventEmitterPort + 'static,
{
    let QueueManagerDeps {
        discovery,
        repository,
        emitter,
        config,
    } = deps;

    let mut queue = DownloadQueue::new(config.clone());
    match repository.load().await {
        Ok(items) => {
            let total = items.len();
            let restored = queue.restore(items);
            if total > 0 {
                info!(target: "dcq.queue", restored, skipped = total - restored, "Queue restored");
            }
        }
        Err(e) => warn!(target: "dcq.queue", error = %e, "Could not load saved queue, starting empty"),
    }

    let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
    let slots = SlotLedger::new(&config.slots);
    let runner = Runner {
        queue,
        slots: Arc::clone(&slots),
        extra_slot: ExtraSlotPolicy::new(&config.slots),
        active: HashMap::new(),
        listed_peers: HashSet::new(),
        search_guard: SearchGuard::new(&config.search),
        discovery,
        repository,
        emitter,
        commands: tx.downgrade(),
        config,
        dirty: false,
    };
    tokio::spawn(runner.run(rx));

    QueueHandle { commands: tx, slots }
}

fn runner_stopped() -> DownloadError {
    DownloadError::other("Queue runner has stopped")
}

/// Handle to a running queue.
///
/// Cloning is cheap; all clones talk to the same runner.
#[derive(Clone)]
pub struct QueueHandle {
    commands: mpsc::Sender<Command>,
    slots: Arc<SlotLedger>,
}

impl QueueHandle {
    /// Slot ledger shared with the upload side.
    pub const fn slots(&self) -> &Arc<SlotLedger> {
        &self.slots
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> DownloadResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| runner_stopped())?;
        rx.await.map_err(|_| runner_stopped())?
    }

    async fn notify(&self, command: Command) -> DownloadResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| runner_stopped())
    }
}

/// Current time on the runtime clock, so a paused test clock drives timing too.
pub(crate) fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Interval whose first tick is one period away.
fn delayed_interval(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut timer = interval_at(tokio::time::Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

/// Tick an optional interval; never completes when absent.
async fn maybe_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

/// Owner of all queue state.
struct Runner {
    queue: DownloadQueue,
    slots: Arc<SlotLedger>,
    extra_slot: ExtraSlotPolicy,
    /// Cancellation tokens of running workers.
    active: HashMap<LeaseId, CancellationToken>,
    /// Peers whose listing was already matched against the queue.
    listed_peers: HashSet<PeerHandle>,
    search_guard: SearchGuard,
    discovery: Arc<dyn DiscoveryPort>,
    repository: Arc<dyn QueueStateRepositoryPort>,
    emitter: Arc<dyn QueueEventEmitterPort>,
    /// Weak so the runner stops once every handle and worker is gone.
    commands: mpsc::WeakSender<Command>,
    config: QueueConfig,
    /// Unsaved changes.
    dirty: bool,
}

impl Runner {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let mut tick = interval(self.config.tick_interval.max(Duration::from_millis(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut drop_check = delayed_interval(self.config.drop.check_interval);
        let mut search = self
            .config
            .search
            .enabled
            .then(|| delayed_interval(self.config.search.interval));
        let mut autosave = self.config.autosave_interval.map(delayed_interval);

        info!(target: "dcq.queue", items = self.queue.len(), "Queue runner started");
        self.emit_snapshot();

        loop {
            tokio::select! {
                biased;

                command = rx.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },

                _ = tick.tick() => {
                    self.evaluate_extra_slot();
                    self.schedule();
                }

                _ = drop_check.tick() => self.drop_pass(),

                () = maybe_tick(&mut search) => self.search_pass(),

                () = maybe_tick(&mut autosave) => {
                    if self.dirty {
                        if let Err(e) = self.save().await {
                            warn!(target: "dcq.queue", error = %e, "Autosave failed");
                        }
                    }
                }
            }
            self.flush_events();
        }
        info!(target: "dcq.queue", "Queue runner stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue { request, reply } => {
                let _ = reply.send(self.enqueue(request));
            }
            Command::AddMagnet {
                magnet,
                directory,
                reply,
            } => {
                let result = parse_magnet(&magnet).and_then(|link| {
                    let target = directory.join(link.file_name());
                    self.enqueue(EnqueueRequest::new(link.content, link.size, target))
                });
                let _ = reply.send(result);
            }
            Command::Remove {
                id,
                remove_partial,
                reply,
            } => {
                let _ = reply.send(self.remove(id, remove_partial).await);
            }
            Command::SetPriority {
                id,
                priority,
                reply,
            } => {
                let _ = reply.send(self.queue.set_priority(id, priority));
                self.schedule();
            }
            Command::Pause {
                id,
                disconnect,
                reply,
            } => {
                let result = self.queue.pause(id, disconnect).map(|leases| {
                    self.cancel(&leases);
                    info!(target: "dcq.queue", %id, disconnect, cancelled = leases.len(), "Item paused");
                });
                let _ = reply.send(result);
            }
            Command::Move { id, target, reply } => {
                let _ = reply.send(self.queue.move_item(id, target));
            }
            Command::AttachSource { id, offer, reply } => {
                let _ = reply.send(self.queue.attach_source(id, offer).map(|_| ()));
                self.schedule();
            }
            Command::SourceFound { offer } => {
                self.queue.source_found(&offer);
                self.schedule();
            }
            Command::SourceLost { peer } => {
                let leases = self.queue.source_lost(&peer);
                self.cancel(&leases);
                // Its listing is matched again once it comes back.
                self.listed_peers.remove(&peer);
                debug!(target: "dcq.queue", %peer, cancelled = leases.len(), "Source went offline");
                self.schedule();
            }
            Command::UploadSpeed { bytes_per_sec } => {
                self.extra_slot.report_speed(bytes_per_sec);
                self.evaluate_extra_slot();
            }
            Command::List { reply } => {
                let _ = reply.send(Ok(self.queue.summaries(now())));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(Ok(self.queue.snapshot(now())));
            }
            Command::Targets { reply } => {
                let _ = reply.send(Ok(self.queue.targets()));
            }
            Command::Sources { id, reply } => {
                let _ = reply.send(self.queue.sources(id, now()));
            }
            Command::Tick { reply } => {
                self.schedule();
                let _ = reply.send(Ok(()));
            }
            Command::Save { reply } => {
                self.flush_events();
                let _ = reply.send(self.save().await);
            }
            // Handled by the run loop.
            Command::Shutdown { reply } => {
                let _ = reply.send(Ok(()));
            }
            Command::Worker { lease, event } => self.on_worker(lease, event),
            Command::TreeFetched { lease, result } => {
                self.active.remove(&lease);
                if self.queue.tree_fetched(lease, result, now()) {
                    debug!(target: "dcq.download", %lease, "Tree accepted");
                }
                self.schedule();
            }
            Command::Finalized { id, result } => self.on_finalized(id, result),
            Command::SearchHits { offers } => self.on_search_hits(offers),
            Command::SearchFlooded { retry_after } => {
                warn!(
                    target: "dcq.search",
                    retry_after_secs = retry_after.as_secs(),
                    "Search refused by flood protection"
                );
                self.search_guard.flooded(now(), retry_after);
            }
            Command::SearchDone => self.search_guard.finish_pass(),
            Command::ListingFetched { peer, result } => match result {
                Ok(entries) => {
                    let matched = self.queue.match_listing(&peer, &entries);
                    if !matched.is_empty() {
                        info!(target: "dcq.search", %peer, items = matched.len(), "Matched listing against queue");
                    }
                    self.schedule();
                }
                Err(e) => debug!(target: "dcq.search", %peer, error = %e, "Listing fetch failed"),
            },
        }
    }

    // =========================================================================
    // Items
    // =========================================================================

    fn enqueue(&mut self, request: EnqueueRequest) -> DownloadResult<ItemId> {
        let id = self.queue.enqueue(request, Utc::now())?;
        if let Some(item) = self.queue.get(id) {
            info!(
                target: "dcq.queue",
                %id,
                content = %item.content,
                size = item.size,
                priority = %item.priority,
                target = %item.target.display(),
                "Item queued"
            );
            if item.status == ItemStatus::Finished {
                self.spawn_finalize(id, item.partial.clone(), item.target.clone(), 0);
            }
        }
        Ok(id)
    }

    async fn remove(&mut self, id: ItemId, remove_partial: bool) -> DownloadResult<()> {
        let Some(removed) = self.queue.remove(id) else {
            return Ok(());
        };
        self.cancel(&removed.leases);
        info!(target: "dcq.queue", %id, cancelled = removed.leases.len(), "Item removed");
        if remove_partial {
            partial::remove(&removed.item.partial).await?;
        }
        self.schedule();
        Ok(())
    }

    fn cancel(&mut self, leases: &[LeaseId]) {
        for lease in leases {
            if let Some(token) = self.active.remove(lease) {
                token.cancel();
            }
        }
    }

    fn spawn_finalize(&self, id: ItemId, partial: PathBuf, target: PathBuf, size: u64) {
        let Some(commands) = self.commands.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let result = if size == 0 {
                partial::create_empty(&target).await
            } else {
                partial::finalize(&partial, &target, size).await
            };
            let _ = commands.send(Command::Finalized { id, result }).await;
        });
    }

    fn on_finalized(&mut self, id: ItemId, result: DownloadResult<()>) {
        match result {
            Ok(()) => {
                if let Some(target) = self.queue.finish(id) {
                    info!(target: "dcq.queue", %id, target = %target.display(), "Item finished");
                }
            }
            Err(error) => {
                warn!(target: "dcq.queue", %id, %error, "Could not write target file");
                let leases = self.queue.fail_item(id, &error);
                self.cancel(&leases);
            }
        }
        self.emit_snapshot();
        self.schedule();
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    fn worker_deps(&self) -> Option<WorkerDeps> {
        Some(WorkerDeps {
            discovery: Arc::clone(&self.discovery),
            commands: self.commands.upgrade()?,
            progress_interval: self.config.progress_interval,
        })
    }

    /// Run a scheduling pass and start the resulting work.
    fn schedule(&mut self) {
        let now = now();
        let pass = self
            .queue
            .schedule(now, self.slots.free(SlotKind::Download));

        for action in pass.actions {
            match action {
                Action::Transfer(assignment) => {
                    let slot = self.slots.try_acquire(SlotKind::Download);
                    let (Some(slot), Some(deps)) = (slot, self.worker_deps()) else {
                        self.queue.unassign(assignment.lease);
                        continue;
                    };
                    debug!(
                        target: "dcq.download",
                        item = %assignment.item,
                        peer = %assignment.peer,
                        offset = assignment.request.offset,
                        length = assignment.request.length,
                        lease = %assignment.lease,
                        "Segment assigned"
                    );
                    let cancel = CancellationToken::new();
                    self.active.insert(assignment.lease, cancel.clone());
                    tokio::spawn(worker::run_transfer(
                        TransferJob {
                            assignment,
                            cancel,
                            slot,
                        },
                        deps,
                    ));
                }
                Action::FetchTree(fetch) => {
                    let Some(deps) = self.worker_deps() else {
                        self.queue.unassign(fetch.lease);
                        continue;
                    };
                    debug!(target: "dcq.download", item = %fetch.item, peer = %fetch.peer, "Fetching tree");
                    let cancel = CancellationToken::new();
                    self.active.insert(fetch.lease, cancel.clone());
                    tokio::spawn(worker::run_tree_fetch(fetch, cancel, deps));
                }
            }
        }
        if pass.slots_exhausted {
            debug!(target: "dcq.download", error = %DownloadError::NoSlotsAvailable, "Scheduling pass stopped");
        }
    }

    fn on_worker(&mut self, lease: LeaseId, event: WorkerEvent) {
        let now = now();
        match event {
            WorkerEvent::Progress { delta, received } => {
                self.queue.record_progress(lease, delta, received, now);
            }
            WorkerEvent::Verifying => self.queue.segment_verifying(lease),
            WorkerEvent::Verified { leaves } => {
                self.active.remove(&lease);
                match self.queue.segment_verified(lease, leaves) {
                    VerifiedOutcome::Complete {
                        id,
                        partial,
                        target,
                    } => {
                        if let Some(size) = self.queue.get(id).map(|item| item.size) {
                            info!(target: "dcq.download", %id, "All segments verified");
                            self.spawn_finalize(id, partial, target, size);
                        }
                    }
                    VerifiedOutcome::TreeMismatch { id } => {
                        warn!(target: "dcq.download", %id, "Full tree mismatch, restarting item");
                    }
                    VerifiedOutcome::Stale => {
                        debug!(target: "dcq.download", %lease, "Ignoring stale result");
                    }
                    VerifiedOutcome::Continue => {}
                }
                self.schedule();
            }
            WorkerEvent::Failed { error } => {
                self.active.remove(&lease);
                match self.queue.segment_failed(lease, &error, now) {
                    FailureOutcome::ItemFailed { id, cancel } => {
                        warn!(target: "dcq.download", %id, %error, "Item failed");
                        self.cancel(&cancel);
                    }
                    FailureOutcome::Retry if !error.is_cancelled() => {
                        debug!(target: "dcq.download", %lease, kind = ?error.kind(), "Segment will be retried");
                    }
                    FailureOutcome::Retry | FailureOutcome::Stale => {}
                }
                self.schedule();
            }
        }
    }

    // =========================================================================
    // Background passes
    // =========================================================================

    fn drop_pass(&mut self) {
        let decisions = self.queue.drop_pass(now());
        for decision in &decisions {
            if let Some(token) = self.active.remove(&decision.lease) {
                token.cancel();
            }
            info!(
                target: "dcq.drop",
                item = %decision.item,
                peer = %decision.peer,
                bytes_per_sec = decision.bytes_per_sec,
                stalled = decision.stalled,
                removed = decision.action == DropAction::Remove,
                "Dropped slow source"
            );
        }
        if !decisions.is_empty() {
            self.schedule();
        }
    }

    fn search_pass(&mut self) {
        let now = now();
        let candidates = self.queue.search_candidates();
        let Some(batch) = self.search_guard.start_pass(now, candidates) else {
            return;
        };
        let Some(commands) = self.commands.upgrade() else {
            self.search_guard.finish_pass();
            return;
        };
        let discovery = Arc::clone(&self.discovery);
        let spacing = self.search_guard.min_spacing();
        debug!(target: "dcq.search", searches = batch.len(), "Auto-search pass");

        tokio::spawn(async move {
            for (n, (id, content)) in batch.into_iter().enumerate() {
                if n > 0 {
                    tokio::time::sleep(spacing).await;
                }
                match discovery.search(&content).await {
                    Ok(offers) => {
                        debug!(target: "dcq.search", %id, hits = offers.len(), "Search finished");
                        let _ = commands.send(Command::SearchHits { offers }).await;
                    }
                    Err(DownloadError::SearchFlood { retry_after_secs }) => {
                        let retry_after = Duration::from_secs(retry_after_secs);
                        let _ = commands.send(Command::SearchFlooded { retry_after }).await;
                        return;
                    }
                    Err(e) => warn!(target: "dcq.search", %id, error = %e, "Search failed"),
                }
            }
            let _ = commands.send(Command::SearchDone).await;
        });
    }

    fn on_search_hits(&mut self, offers: Vec<SourceOffer>) {
        for offer in offers {
            let attached = self.queue.source_found(&offer);
            if attached.is_empty() {
                continue;
            }
            debug!(target: "dcq.search", peer = %offer.peer, items = attached.len(), "Source found by search");
            if self.config.search.match_queue && self.listed_peers.insert(offer.peer.clone()) {
                self.spawn_listing_fetch(offer.peer);
            }
        }
        self.schedule();
    }

    fn spawn_listing_fetch(&self, peer: PeerHandle) {
        let Some(commands) = self.commands.upgrade() else {
            return;
        };
        let discovery = Arc::clone(&self.discovery);
        tokio::spawn(async move {
            let result = discovery.fetch_listing(&peer).await;
            let _ = commands
                .send(Command::ListingFetched { peer, result })
                .await;
        });
    }

    fn evaluate_extra_slot(&mut self) {
        match self.extra_slot.evaluate(now(), &self.slots) {
            Some(ExtraSlotChange::Granted) => self.emitter.emit(QueueEvent::ExtraSlotGranted),
            Some(ExtraSlotChange::Reclaimed) => self.emitter.emit(QueueEvent::ExtraSlotReclaimed),
            None => {}
        }
    }

    // =========================================================================
    // Events and persistence
    // =========================================================================

    fn flush_events(&mut self) {
        for event in self.queue.take_events() {
            if !matches!(event, QueueEvent::SegmentProgress { .. }) {
                self.dirty = true;
            }
            self.emitter.emit(event);
        }
    }

    fn emit_snapshot(&self) {
        let snapshot = self.queue.snapshot(now());
        self.emitter
            .emit(QueueEvent::queue_snapshot(snapshot.items));
    }

    async fn save(&mut self) -> DownloadResult<()> {
        let items = self.queue.to_persisted();
        self.repository
            .save(&items)
            .await
            .map_err(|e| DownloadError::other(format!("Failed to persist queue: {e}")))?;
        self.dirty = false;
        debug!(target: "dcq.queue", items = items.len(), "Queue saved");
        Ok(())
    }

    async fn shutdown(&mut self) {
        let cancelled = self.active.len();
        for (_, token) in self.active.drain() {
            token.cancel();
        }
        self.flush_events();
        if let Err(e) = self.save().await {
            warn!(target: "dcq.queue", error = %e, "Could not persist queue on shutdown");
        }
        info!(target: "dcq.queue", cancelled, "Queue shut down");
    }
}

// =============================================================================
// QueueManagerPort implementation
// =============================================================================

#[async_trait]
impl QueueManagerPort for QueueHandle {
    async fn enqueue(&self, request: EnqueueRequest) -> DownloadResult<ItemId> {
        self.request(|reply| Command::Enqueue { request, reply })
            .await
    }

    async fn add_magnet(&self, magnet: &str, directory: &Path) -> DownloadResult<ItemId> {
        let magnet = magnet.to_string();
        let directory = directory.to_path_buf();
        self.request(|reply| Command::AddMagnet {
            magnet,
            directory,
            reply,
        })
        .await
    }

    async fn remove_item(&self, id: ItemId, remove_partial: bool) -> DownloadResult<()> {
        self.request(|reply| Command::Remove {
            id,
            remove_partial,
            reply,
        })
        .await
    }

    async fn set_priority(&self, id: ItemId, priority: Priority) -> DownloadResult<()> {
        self.request(|reply| Command::SetPriority {
            id,
            priority,
            reply,
        })
        .await
    }

    async fn pause(&self, id: ItemId, disconnect: bool) -> DownloadResult<()> {
        self.request(|reply| Command::Pause {
            id,
            disconnect,
            reply,
        })
        .await
    }

    async fn move_item(&self, id: ItemId, target: PathBuf) -> DownloadResult<()> {
        self.request(|reply| Command::Move { id, target, reply })
            .await
    }

    async fn attach_source(&self, id: ItemId, offer: SourceOffer) -> DownloadResult<()> {
        self.request(|reply| Command::AttachSource { id, offer, reply })
            .await
    }

    async fn source_found(&self, content: ContentId, offer: SourceOffer) -> DownloadResult<()> {
        if offer.content != content {
            return Err(DownloadError::incompatible(
                offer.peer,
                format!("offer is for {}, not {content}", offer.content),
            ));
        }
        self.notify(Command::SourceFound { offer }).await
    }

    async fn source_lost(&self, peer: PeerHandle) -> DownloadResult<()> {
        self.notify(Command::SourceLost { peer }).await
    }

    async fn search_result(&self, offer: SourceOffer) -> DownloadResult<()> {
        self.notify(Command::SearchHits {
            offers: vec![offer],
        })
        .await
    }

    async fn report_upload_speed(&self, bytes_per_sec: u64) -> DownloadResult<()> {
        self.notify(Command::UploadSpeed { bytes_per_sec }).await
    }

    async fn list_items(&self) -> DownloadResult<Vec<ItemSummary>> {
        self.request(|reply| Command::List { reply }).await
    }

    async fn snapshot(&self) -> DownloadResult<QueueSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    async fn list_targets(&self) -> DownloadResult<Vec<PathBuf>> {
        self.request(|reply| Command::Targets { reply }).await
    }

    async fn sources(&self, id: ItemId) -> DownloadResult<ItemSources> {
        self.request(|reply| Command::Sources { id, reply }).await
    }

    async fn tick(&self) -> DownloadResult<()> {
        self.request(|reply| Command::Tick { reply }).await
    }

    async fn save(&self) -> DownloadResult<()> {
        self.request(|reply| Command::Save { reply }).await
    }

    async fn shutdown(&self) -> DownloadResult<()> {
        match self.request(|reply| Command::Shutdown { reply }).await {
            Err(DownloadError::Other { .. }) if self.commands.is_closed() => Ok(()),
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_id_equality() {
        let l1 = LeaseId::new(1);
        let l2 = LeaseId::new(1);
        let l3 = LeaseId::new(2);

        assert_eq!(l1, l2);
        assert_ne!(l1, l3);
    }

    #[tokio::test]
    async fn test_maybe_tick_absent_never_fires() {
        let mut absent: Option<Interval> = None;
        let fired = tokio::time::timeout(Duration::from_millis(20), maybe_tick(&mut absent)).await;
        assert!(fired.is_err());

        let mut present = Some(delayed_interval(Duration::from_millis(1)));
        let fired = tokio::time::timeout(Duration::from_secs(5), maybe_tick(&mut present)).await;
        assert!(fired.is_ok());
    }
}
