//! Auto-search: which items to search for, and how often.

use std::time::{Duration, Instant};

use dcq_core::{AutoSearchConfig, ContentId, ItemId, ItemKind, ItemStatus};

use crate::queue::QueueItem;

/// Items short of sources, fewest sources first, then by priority.
///
/// Listings are peer-specific and never searched for.
pub fn search_candidates<'a>(
    config: &AutoSearchConfig,
    items: impl IntoIterator<Item = &'a QueueItem>,
) -> Vec<(ItemId, ContentId)> {
    let mut candidates: Vec<&QueueItem> = items
        .into_iter()
        .filter(|item| {
            item.kind == ItemKind::File
                && matches!(item.status, ItemStatus::Waiting | ItemStatus::Running)
                && !item.priority.is_paused()
                && item.sources.online_count() < config.min_sources
        })
        .collect();
    candidates.sort_by(|a, b| {
        a.sources
            .online_count()
            .cmp(&b.sources.online_count())
            .then(b.priority.cmp(&a.priority))
    });
    candidates
        .into_iter()
        .map(|item| (item.id, item.content))
        .collect()
}

/// Flood guard for outgoing searches.
///
/// Bounds searches per pass, keeps passes from overlapping, and honours the
/// back-off the discovery layer asks for after a flood refusal.
#[derive(Debug, Clone)]
pub struct SearchGuard {
    max_per_pass: usize,
    min_spacing: Duration,
    blocked_until: Option<Instant>,
    running: bool,
}

impl SearchGuard {
    pub const fn new(config: &AutoSearchConfig) -> Self {
        Self {
            max_per_pass: config.max_per_pass,
            min_spacing: config.min_spacing,
            blocked_until: None,
            running: false,
        }
    }

    /// Spacing between two searches of one pass.
    pub const fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    pub fn is_blocked(&self, now: Instant) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }

    /// Start a pass over `candidates`. Returns the searches to issue, or
    /// `None` when a pass is already running, searching is blocked, or
    /// nothing needs searching.
    pub fn start_pass<T>(&mut self, now: Instant, mut candidates: Vec<T>) -> Option<Vec<T>> {
        if self.running || self.is_blocked(now) || candidates.is_empty() {
            return None;
        }
        candidates.truncate(self.max_per_pass.max(1));
        self.running = true;
        Some(candidates)
    }

    pub const fn finish_pass(&mut self) {
        self.running = false;
    }

    /// The discovery layer refused a search; block until `retry_after` passed.
    pub fn flooded(&mut self, now: Instant, retry_after: Duration) {
        let until = now + retry_after.max(self.min_spacing);
        self.blocked_until = Some(self.blocked_until.map_or(until, |current| current.max(until)));
        self.running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use chrono::Utc;
    use dcq_core::{PeerHandle, Priority, TigerHash};

    fn item(id: u64, sources: usize, priority: Priority) -> QueueItem {
        let mut item = QueueItem::new(
            ItemId::new(id),
            TigerHash::from_bytes([u8::try_from(id).unwrap(); 24]),
            10 * 1024 * 1024,
            PathBuf::from(format!("/d/{id}")),
            ItemKind::File,
            priority,
            false,
            Utc::now(),
        );
        for n in 0..sources {
            item.sources.add(PeerHandle::new(format!("p{n}"), "hub"));
        }
        item
    }

    #[test]
    fn test_candidates_ordered_by_need_then_priority() {
        let config = AutoSearchConfig {
            min_sources: 3,
            ..AutoSearchConfig::default()
        };
        let items = [
            item(1, 2, Priority::Highest),
            item(2, 0, Priority::Low),
            item(3, 0, Priority::High),
            item(4, 5, Priority::Normal),
            item(5, 0, Priority::Paused),
        ];
        let ids: Vec<u64> = search_candidates(&config, &items)
            .into_iter()
            .map(|(id, _)| id.get())
            .collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_guard_bounds_pass_and_blocks_after_flood() {
        let config = AutoSearchConfig {
            max_per_pass: 2,
            min_spacing: Duration::from_secs(1),
            ..AutoSearchConfig::default()
        };
        let now = Instant::now();
        let mut guard = SearchGuard::new(&config);

        assert_eq!(guard.start_pass(now, vec![1, 2, 3]), Some(vec![1, 2]));
        // Overlapping pass refused.
        assert_eq!(guard.start_pass(now, vec![1]), None);
        guard.finish_pass();

        guard.flooded(now, Duration::from_secs(30));
        assert!(guard.is_blocked(now + Duration::from_secs(10)));
        assert_eq!(guard.start_pass(now + Duration::from_secs(10), vec![1]), None);
        assert_eq!(
            guard.start_pass(now + Duration::from_secs(31), vec![1]),
            Some(vec![1])
        );
    }
}
