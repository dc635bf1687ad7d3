//! Source registry: the peers known to offer one item.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use dcq_core::{PeerHandle, SourceSummary};

use super::LeaseId;

/// Window over which throughput is averaged.
pub const SPEED_WINDOW: Duration = Duration::from_secs(10);

/// Throughput averaged over a sliding time window.
#[derive(Debug, Clone)]
pub struct RollingSpeed {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl Default for RollingSpeed {
    fn default() -> Self {
        Self::new(SPEED_WINDOW)
    }
}

impl RollingSpeed {
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Record `bytes` received at `now`.
    pub fn record(&mut self, now: Instant, bytes: u64) {
        self.samples.push_back((now, bytes));
        self.evict(now);
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(at, _)) = self.samples.front() {
            if now.duration_since(at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Average bytes per second over the window ending at `now`.
    ///
    /// `since` bounds the averaging period for sources that started less
    /// than a window ago.
    pub fn bytes_per_sec(&self, now: Instant, since: Option<Instant>) -> u64 {
        let total: u64 = self
            .samples
            .iter()
            .filter(|(at, _)| now.duration_since(*at) <= self.window)
            .map(|(_, bytes)| bytes)
            .sum();
        let span = since
            .map_or(self.window, |start| now.duration_since(start))
            .min(self.window)
            .max(Duration::from_secs(1));
        let millis = u64::try_from(span.as_millis()).unwrap_or(u64::MAX);
        total.saturating_mul(1000) / millis
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// A peer offering one item.
#[derive(Debug, Clone)]
pub struct Source {
    pub peer: PeerHandle,
    pub online: bool,
    pub speed: RollingSpeed,
    /// When the current transfer started.
    pub started: Option<Instant>,
    /// When throughput first fell below the drop floor.
    pub slow_since: Option<Instant>,
    /// Last time any byte arrived.
    pub last_progress: Option<Instant>,
    pub failures: u32,
    /// Lease held by this source (segment transfer or tree fetch).
    pub active: Option<LeaseId>,
    /// Not used again before this instant.
    pub retry_after: Option<Instant>,
}

impl Source {
    pub fn new(peer: PeerHandle) -> Self {
        Self {
            peer,
            online: true,
            speed: RollingSpeed::default(),
            started: None,
            slow_since: None,
            last_progress: None,
            failures: 0,
            active: None,
            retry_after: None,
        }
    }

    /// Online, not busy and not backing off.
    pub fn is_idle(&self, now: Instant) -> bool {
        self.online && self.active.is_none() && self.retry_after.is_none_or(|t| now >= t)
    }

    /// Start holding `lease`.
    pub fn begin(&mut self, lease: LeaseId, now: Instant) {
        self.active = Some(lease);
        self.started = Some(now);
        self.last_progress = Some(now);
        self.slow_since = None;
        self.speed.clear();
    }

    /// Stop holding any lease.
    pub fn end(&mut self) {
        self.active = None;
        self.started = None;
        self.slow_since = None;
    }

    pub fn bytes_per_sec(&self, now: Instant) -> u64 {
        self.speed.bytes_per_sec(now, self.started)
    }

    /// Refresh `slow_since` against the drop floor (0 disables it).
    ///
    /// A source first seen below the floor has been slow for the whole span
    /// its average covers: since the transfer started, at most one window.
    pub fn track_slowness(&mut self, now: Instant, floor: u64) {
        if floor == 0 || self.bytes_per_sec(now) >= floor {
            self.slow_since = None;
        } else if self.slow_since.is_none() {
            let window_start = now.checked_sub(self.speed.window);
            self.slow_since = Some(window_start.max(self.started).unwrap_or(now));
        }
    }

    pub fn summary(&self, now: Instant) -> SourceSummary {
        SourceSummary {
            peer: self.peer.clone(),
            online: self.online,
            speed_bps: self.bytes_per_sec(now),
            failures: self.failures,
            transferring: self.active.is_some(),
        }
    }
}

/// Sources of one item, in the order they were found.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: IndexMap<PeerHandle, Source>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer, or mark a known one online again. Returns whether it is new.
    pub fn add(&mut self, peer: PeerHandle) -> bool {
        if let Some(existing) = self.sources.get_mut(&peer) {
            existing.online = true;
            return false;
        }
        self.sources.insert(peer.clone(), Source::new(peer));
        true
    }

    pub fn remove(&mut self, peer: &PeerHandle) -> Option<Source> {
        self.sources.shift_remove(peer)
    }

    pub fn get(&self, peer: &PeerHandle) -> Option<&Source> {
        self.sources.get(peer)
    }

    pub fn get_mut(&mut self, peer: &PeerHandle) -> Option<&mut Source> {
        self.sources.get_mut(peer)
    }

    pub fn contains(&self, peer: &PeerHandle) -> bool {
        self.sources.contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Source> {
        self.sources.values_mut()
    }

    pub fn online_count(&self) -> usize {
        self.sources.values().filter(|s| s.online).count()
    }

    /// Peers ready for a new assignment.
    pub fn idle(&self, now: Instant) -> Vec<PeerHandle> {
        self.sources
            .values()
            .filter(|s| s.is_idle(now))
            .map(|s| s.peer.clone())
            .collect()
    }

    /// Peer holding `lease`, if any.
    pub fn holder_of(&self, lease: LeaseId) -> Option<&PeerHandle> {
        self.sources
            .values()
            .find(|s| s.active == Some(lease))
            .map(|s| &s.peer)
    }

    /// Aggregate throughput of all sources.
    pub fn total_bytes_per_sec(&self, now: Instant) -> u64 {
        self.sources
            .values()
            .filter(|s| s.active.is_some())
            .map(|s| s.bytes_per_sec(now))
            .sum()
    }

    pub fn summaries(&self, now: Instant) -> Vec<SourceSummary> {
        self.sources.values().map(|s| s.summary(now)).collect()
    }

    pub fn peers(&self) -> Vec<PeerHandle> {
        self.sources.keys().cloned().collect()
    }
}
