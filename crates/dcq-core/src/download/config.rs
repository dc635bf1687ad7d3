//! Concrete engine configuration.
//!
//! `QueueConfig` is what the engine runs on: byte counts and `Duration`s.
//! It is derived from the user-facing [`QueueSettings`] with
//! [`QueueConfig::from_settings`] and can be adjusted with `with_*` setters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::settings::QueueSettings;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Size thresholds used for automatic priority assignment.
///
/// All sizes are in bytes; `0` disables a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityThresholds {
    /// Items up to this size get `Highest`.
    pub highest_max: u64,
    /// Items up to this size get `High`.
    pub high_max: u64,
    /// Items up to this size get `Normal`.
    pub normal_max: u64,
    /// Items up to this size get `Low`.
    pub low_max: u64,
    /// Items larger than every threshold get `Lowest` instead of `Normal`.
    pub oversized_as_lowest: bool,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self {
            highest_max: 64 * KIB,
            high_max: 0,
            normal_max: 0,
            low_max: 0,
            oversized_as_lowest: false,
        }
    }
}

/// How an item is cut into segments on its first split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentSizing {
    /// `size / sources`, clamped to `[min, max]`.
    Auto {
        /// Lower clamp in bytes.
        min: u64,
        /// Upper clamp in bytes.
        max: u64,
    },
    /// Every segment has this many bytes (the last may be shorter).
    Fixed(u64),
}

impl Default for SegmentSizing {
    fn default() -> Self {
        Self::Auto {
            min: MIB,
            max: 64 * MIB,
        }
    }
}

/// Slot limits and the extra upload slot rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Concurrent downloads (0 = unlimited).
    pub download_slots: u32,
    /// Concurrent regular uploads (0 = unlimited).
    pub upload_slots: u32,
    /// Concurrent small-payload uploads (0 = unlimited).
    pub mini_slots: u32,
    /// Largest payload that may use a mini slot.
    pub mini_slot_max_size: u64,
    /// Open an extra upload slot while the average upload speed is below
    /// this many bytes per second (0 = never).
    pub extra_slot_floor: u64,
    /// Minimum time between two extra slot grants.
    pub extra_slot_cooldown: Duration,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            download_slots: 3,
            upload_slots: 2,
            mini_slots: 3,
            mini_slot_max_size: 64 * KIB,
            extra_slot_floor: 0,
            extra_slot_cooldown: Duration::from_secs(60),
        }
    }
}

/// Slow-source drop policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropConfig {
    /// Throughput floor in bytes per second.
    pub speed_floor: u64,
    /// How often the drop pass runs.
    pub check_interval: Duration,
    /// How long a source must stay below the floor.
    pub min_elapsed: Duration,
    /// How long without any received byte counts as stalled.
    pub inactivity: Duration,
    /// Online sources the item must keep after a drop.
    pub min_sources_online: usize,
    /// Items smaller than this are never considered (listings exempt).
    pub min_filesize: u64,
    /// Drop slow sources of regular file items.
    pub drop_slow_sources: bool,
    /// Drop slow sources of listing items.
    pub drop_slow_listings: bool,
    /// Only disconnect instead of removing the source.
    pub disconnect_only: bool,
    /// Back-off before a disconnected source is used again.
    pub retry_backoff: Duration,
}

impl Default for DropConfig {
    fn default() -> Self {
        Self {
            speed_floor: 1024,
            check_interval: Duration::from_secs(10),
            min_elapsed: Duration::from_secs(15),
            inactivity: Duration::from_secs(10),
            min_sources_online: 2,
            min_filesize: 2048 * KIB,
            drop_slow_sources: false,
            drop_slow_listings: false,
            disconnect_only: true,
            retry_backoff: Duration::from_secs(60),
        }
    }
}

/// Periodic search for more sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSearchConfig {
    /// Master switch.
    pub enabled: bool,
    /// Interval between passes.
    pub interval: Duration,
    /// Items with fewer sources than this are searched for.
    pub min_sources: usize,
    /// Searches issued per pass at most.
    pub max_per_pass: usize,
    /// Minimum spacing between two searches.
    pub min_spacing: Duration,
    /// Fetch the listing of newly found peers and match it against the queue.
    pub match_queue: bool,
}

impl Default for AutoSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(120),
            min_sources: 5,
            max_per_pass: 5,
            min_spacing: Duration::from_secs(5),
            match_queue: true,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub priorities: PriorityThresholds,
    pub segments: SegmentSizing,
    pub slots: SlotConfig,
    pub drop: DropConfig,
    pub search: AutoSearchConfig,
    /// Reject enqueueing content that is already queued.
    pub skip_duplicates: bool,
    /// Keep finished items in the queue instead of removing them.
    pub keep_finished: bool,
    /// Failures after which a source is removed from an item.
    pub max_source_failures: u32,
    /// Interval of the scheduling tick.
    pub tick_interval: Duration,
    /// Interval of periodic persistence (`None` = only on shutdown).
    pub autosave_interval: Option<Duration>,
    /// Minimum time between two progress events for the same segment.
    pub progress_interval: Duration,
    /// Capacity of the runner's command channel.
    pub command_buffer: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            priorities: PriorityThresholds::default(),
            segments: SegmentSizing::default(),
            slots: SlotConfig::default(),
            drop: DropConfig::default(),
            search: AutoSearchConfig::default(),
            skip_duplicates: true,
            keep_finished: false,
            max_source_failures: 3,
            tick_interval: Duration::from_secs(1),
            autosave_interval: Some(Duration::from_secs(300)),
            progress_interval: Duration::from_millis(200),
            command_buffer: 256,
        }
    }
}

impl QueueConfig {
    /// Create a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from user-facing settings, falling back to defaults for
    /// unset fields.
    #[must_use]
    pub fn from_settings(settings: &QueueSettings) -> Self {
        let base = Self::default();
        let kib = |v: Option<u64>, fallback: u64| v.map_or(fallback, |k| k * KIB);
        let secs = |v: Option<u64>, fallback: Duration| v.map_or(fallback, Duration::from_secs);

        let priorities = PriorityThresholds {
            highest_max: kib(settings.prio_highest_size_kib, base.priorities.highest_max),
            high_max: kib(settings.prio_high_size_kib, base.priorities.high_max),
            normal_max: kib(settings.prio_normal_size_kib, base.priorities.normal_max),
            low_max: kib(settings.prio_low_size_kib, base.priorities.low_max),
            oversized_as_lowest: settings
                .prio_lowest_for_oversized
                .unwrap_or(base.priorities.oversized_as_lowest),
        };

        let segments = match settings.segment_size_mib {
            Some(0) | None => base.segments,
            Some(mib) => SegmentSizing::Fixed(mib * MIB),
        };

        let slots = SlotConfig {
            download_slots: settings.download_slots.unwrap_or(base.slots.download_slots),
            upload_slots: settings.upload_slots.unwrap_or(base.slots.upload_slots),
            mini_slots: settings.mini_slots.unwrap_or(base.slots.mini_slots),
            mini_slot_max_size: kib(settings.mini_slot_size_kib, base.slots.mini_slot_max_size),
            extra_slot_floor: kib(settings.extra_slot_below_kibps, base.slots.extra_slot_floor),
            extra_slot_cooldown: base.slots.extra_slot_cooldown,
        };

        let drop = DropConfig {
            speed_floor: settings.drop_below_bps.unwrap_or(base.drop.speed_floor),
            check_interval: secs(settings.drop_check_interval_secs, base.drop.check_interval),
            min_elapsed: secs(settings.drop_min_elapsed_secs, base.drop.min_elapsed),
            inactivity: secs(settings.drop_inactivity_secs, base.drop.inactivity),
            min_sources_online: settings
                .drop_min_sources_online
                .map_or(base.drop.min_sources_online, |n| n as usize),
            min_filesize: kib(settings.drop_min_filesize_kib, base.drop.min_filesize),
            drop_slow_sources: settings.drop_slow_sources.unwrap_or(base.drop.drop_slow_sources),
            drop_slow_listings: settings
                .drop_slow_listings
                .unwrap_or(base.drop.drop_slow_listings),
            disconnect_only: settings
                .drop_disconnect_only
                .unwrap_or(base.drop.disconnect_only),
            retry_backoff: base.drop.retry_backoff,
        };

        let search = AutoSearchConfig {
            enabled: settings.auto_search.unwrap_or(base.search.enabled),
            interval: settings
                .auto_search_interval_min
                .map_or(base.search.interval, |m| Duration::from_secs(m * 60)),
            min_sources: settings
                .auto_search_min_sources
                .map_or(base.search.min_sources, |n| n as usize),
            max_per_pass: base.search.max_per_pass,
            min_spacing: base.search.min_spacing,
            match_queue: settings
                .auto_search_match_queue
                .unwrap_or(base.search.match_queue),
        };

        Self {
            priorities,
            segments,
            slots,
            drop,
            search,
            skip_duplicates: settings.skip_duplicates.unwrap_or(base.skip_duplicates),
            keep_finished: settings.keep_finished.unwrap_or(base.keep_finished),
            ..base
        }
    }

    /// Set priority thresholds.
    #[must_use]
    pub const fn with_priorities(mut self, priorities: PriorityThresholds) -> Self {
        self.priorities = priorities;
        self
    }

    /// Set segment sizing.
    #[must_use]
    pub const fn with_segments(mut self, segments: SegmentSizing) -> Self {
        self.segments = segments;
        self
    }

    /// Set slot limits.
    #[must_use]
    pub const fn with_slots(mut self, slots: SlotConfig) -> Self {
        self.slots = slots;
        self
    }

    /// Set the drop policy.
    #[must_use]
    pub const fn with_drop(mut self, drop: DropConfig) -> Self {
        self.drop = drop;
        self
    }

    /// Set the auto-search policy.
    #[must_use]
    pub const fn with_search(mut self, search: AutoSearchConfig) -> Self {
        self.search = search;
        self
    }

    /// Set whether duplicate content is rejected.
    #[must_use]
    pub const fn with_skip_duplicates(mut self, skip: bool) -> Self {
        self.skip_duplicates = skip;
        self
    }

    /// Set whether finished items stay in the queue.
    #[must_use]
    pub const fn with_keep_finished(mut self, keep: bool) -> Self {
        self.keep_finished = keep;
        self
    }

    /// Set the per-source failure limit.
    #[must_use]
    pub const fn with_max_source_failures(mut self, max: u32) -> Self {
        self.max_source_failures = max;
        self
    }

    /// Set the scheduling tick interval.
    #[must_use]
    pub const fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the autosave interval.
    #[must_use]
    pub const fn with_autosave_interval(mut self, interval: Option<Duration>) -> Self {
        self.autosave_interval = interval;
        self
    }

    /// Set the progress event interval.
    #[must_use]
    pub const fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_settings_matches_default() {
        let config = QueueConfig::from_settings(&QueueSettings::default());
        assert_eq!(config, QueueConfig::default());
    }

    #[test]
    fn test_from_settings_converts_units() {
        let settings = QueueSettings {
            prio_high_size_kib: Some(512),
            segment_size_mib: Some(4),
            extra_slot_below_kibps: Some(2),
            auto_search_interval_min: Some(3),
            drop_min_sources_online: Some(1),
            ..Default::default()
        };
        let config = QueueConfig::from_settings(&settings);

        assert_eq!(config.priorities.high_max, 512 * 1024);
        assert_eq!(config.segments, SegmentSizing::Fixed(4 * 1024 * 1024));
        assert_eq!(config.slots.extra_slot_floor, 2048);
        assert_eq!(config.search.interval, Duration::from_secs(180));
        assert_eq!(config.drop.min_sources_online, 1);
    }

    #[test]
    fn test_zero_segment_size_means_auto() {
        let settings = QueueSettings {
            segment_size_mib: Some(0),
            ..Default::default()
        };
        let config = QueueConfig::from_settings(&settings);
        assert!(matches!(config.segments, SegmentSizing::Auto { .. }));
    }

    #[test]
    fn test_builder_setters() {
        let config = QueueConfig::new()
            .with_keep_finished(true)
            .with_skip_duplicates(false)
            .with_max_source_failures(5);
        assert!(config.keep_finished);
        assert!(!config.skip_duplicates);
        assert_eq!(config.max_source_failures, 5);
    }
}
