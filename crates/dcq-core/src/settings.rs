//! Queue settings domain types and validation.
//!
//! These are the user-facing knobs, expressed in the units a settings page
//! shows (KiB, seconds, minutes, MiB). The engine converts them to
//! [`QueueConfig`](crate::download::QueueConfig) before use.

use serde::{Deserialize, Serialize};

/// Default interval of the slow-source check, in seconds.
pub const DEFAULT_DROP_CHECK_INTERVAL_SECS: u64 = 10;

/// Default auto-search interval, in minutes.
pub const DEFAULT_AUTO_SEARCH_INTERVAL_MIN: u64 = 2;

/// Queue settings structure.
///
/// All fields are optional to support partial updates and graceful defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueSettings {
    /// Highest priority max size (KiB, 0 = disabled).
    pub prio_highest_size_kib: Option<u64>,
    /// High priority max size (KiB, 0 = disabled).
    pub prio_high_size_kib: Option<u64>,
    /// Normal priority max size (KiB, 0 = disabled).
    pub prio_normal_size_kib: Option<u64>,
    /// Low priority max size (KiB, 0 = disabled).
    pub prio_low_size_kib: Option<u64>,
    /// Set lowest priority for newly added files larger than low priority size.
    pub prio_lowest_for_oversized: Option<bool>,

    /// Segment size (MiB, 0 = auto).
    pub segment_size_mib: Option<u64>,

    /// Download slots (0 = unlimited).
    pub download_slots: Option<u32>,
    /// Upload slots (0 = unlimited).
    pub upload_slots: Option<u32>,
    /// Mini slots for small files and listings.
    pub mini_slots: Option<u32>,
    /// Largest file served through a mini slot (KiB).
    pub mini_slot_size_kib: Option<u64>,
    /// Automatically open an extra slot if speed is below (KiB/s, 0 = never).
    pub extra_slot_below_kibps: Option<u64>,

    /// Drop sources below (B/s).
    pub drop_below_bps: Option<u64>,
    /// Check every x seconds if the source is slow.
    pub drop_check_interval_secs: Option<u64>,
    /// Minimum elapsed time below the floor before dropping (s).
    pub drop_min_elapsed_secs: Option<u64>,
    /// Time without data before a source counts as stalled (s).
    pub drop_inactivity_secs: Option<u64>,
    /// Minimum sources online for an item to drop one.
    pub drop_min_sources_online: Option<u32>,
    /// Minimum filesize before sources are dropped (KiB).
    pub drop_min_filesize_kib: Option<u64>,
    /// Auto-drop slow sources for all queue items (except file lists).
    pub drop_slow_sources: Option<bool>,
    /// Remove slow file lists.
    pub drop_slow_listings: Option<bool>,
    /// Don't remove the source when auto-dropping, only disconnect.
    pub drop_disconnect_only: Option<bool>,

    /// Search for alternate sources periodically.
    pub auto_search: Option<bool>,
    /// Auto search interval (minutes).
    pub auto_search_interval_min: Option<u64>,
    /// Search for items with fewer sources than this.
    pub auto_search_min_sources: Option<u32>,
    /// Automatically match queue for auto search hits.
    pub auto_search_match_queue: Option<bool>,

    /// Don't download files already in the queue.
    pub skip_duplicates: Option<bool>,
    /// Keep finished items listed in the queue.
    pub keep_finished: Option<bool>,
}

impl QueueSettings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            prio_highest_size_kib: Some(64),
            prio_high_size_kib: Some(0),
            prio_normal_size_kib: Some(0),
            prio_low_size_kib: Some(0),
            prio_lowest_for_oversized: Some(false),
            segment_size_mib: Some(0),
            download_slots: Some(3),
            upload_slots: Some(2),
            mini_slots: Some(3),
            mini_slot_size_kib: Some(64),
            extra_slot_below_kibps: Some(0),
            drop_below_bps: Some(1024),
            drop_check_interval_secs: Some(DEFAULT_DROP_CHECK_INTERVAL_SECS),
            drop_min_elapsed_secs: Some(15),
            drop_inactivity_secs: Some(10),
            drop_min_sources_online: Some(2),
            drop_min_filesize_kib: Some(2048),
            drop_slow_sources: Some(false),
            drop_slow_listings: Some(false),
            drop_disconnect_only: Some(true),
            auto_search: Some(true),
            auto_search_interval_min: Some(DEFAULT_AUTO_SEARCH_INTERVAL_MIN),
            auto_search_min_sources: Some(5),
            auto_search_match_queue: Some(true),
            skip_duplicates: Some(true),
            keep_finished: Some(false),
        }
    }

    /// Get the effective drop check interval (with default fallback).
    #[must_use]
    pub const fn effective_drop_check_interval_secs(&self) -> u64 {
        match self.drop_check_interval_secs {
            Some(secs) => secs,
            None => DEFAULT_DROP_CHECK_INTERVAL_SECS,
        }
    }

    /// Merge an update into these settings, only touching fields that are Some.
    pub fn merge(&mut self, other: &QueueSettingsUpdate) {
        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(value) = other.$field {
                        self.$field = value;
                    }
                )*
            };
        }
        apply!(
            prio_highest_size_kib,
            prio_high_size_kib,
            prio_normal_size_kib,
            prio_low_size_kib,
            prio_lowest_for_oversized,
            segment_size_mib,
            download_slots,
            upload_slots,
            mini_slots,
            mini_slot_size_kib,
            extra_slot_below_kibps,
            drop_below_bps,
            drop_check_interval_secs,
            drop_min_elapsed_secs,
            drop_inactivity_secs,
            drop_min_sources_online,
            drop_min_filesize_kib,
            drop_slow_sources,
            drop_slow_listings,
            drop_disconnect_only,
            auto_search,
            auto_search_interval_min,
            auto_search_min_sources,
            auto_search_match_queue,
            skip_duplicates,
            keep_finished,
        );
    }
}

/// Partial settings update.
///
/// Each field is `Option<Option<T>>`:
/// - `None` = don't change this field
/// - `Some(None)` = set field to None/null
/// - `Some(Some(value))` = set field to value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSettingsUpdate {
    pub prio_highest_size_kib: Option<Option<u64>>,
    pub prio_high_size_kib: Option<Option<u64>>,
    pub prio_normal_size_kib: Option<Option<u64>>,
    pub prio_low_size_kib: Option<Option<u64>>,
    pub prio_lowest_for_oversized: Option<Option<bool>>,
    pub segment_size_mib: Option<Option<u64>>,
    pub download_slots: Option<Option<u32>>,
    pub upload_slots: Option<Option<u32>>,
    pub mini_slots: Option<Option<u32>>,
    pub mini_slot_size_kib: Option<Option<u64>>,
    pub extra_slot_below_kibps: Option<Option<u64>>,
    pub drop_below_bps: Option<Option<u64>>,
    pub drop_check_interval_secs: Option<Option<u64>>,
    pub drop_min_elapsed_secs: Option<Option<u64>>,
    pub drop_inactivity_secs: Option<Option<u64>>,
    pub drop_min_sources_online: Option<Option<u32>>,
    pub drop_min_filesize_kib: Option<Option<u64>>,
    pub drop_slow_sources: Option<Option<bool>>,
    pub drop_slow_listings: Option<Option<bool>>,
    pub drop_disconnect_only: Option<Option<bool>>,
    pub auto_search: Option<Option<bool>>,
    pub auto_search_interval_min: Option<Option<u64>>,
    pub auto_search_min_sources: Option<Option<u32>>,
    pub auto_search_match_queue: Option<Option<bool>>,
    pub skip_duplicates: Option<Option<bool>>,
    pub keep_finished: Option<Option<bool>>,
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    #[error("Slow source check interval must be between 1 and 3600 seconds, got {0}")]
    InvalidCheckInterval(u64),

    #[error("Auto search interval must be between 1 and 1440 minutes, got {0}")]
    InvalidSearchInterval(u64),

    #[error("Segment size must be at most 1024 MiB, got {0}")]
    InvalidSegmentSize(u64),

    #[error("Priority size limits must grow from highest to low, {higher} KiB exceeds {lower} KiB")]
    PriorityOrder { higher: u64, lower: u64 },

    #[error("Mini slot size must be at least 1 KiB")]
    InvalidMiniSlotSize,
}

/// Validate settings values.
pub fn validate_settings(settings: &QueueSettings) -> Result<(), SettingsError> {
    if let Some(secs) = settings.drop_check_interval_secs {
        if !(1..=3600).contains(&secs) {
            return Err(SettingsError::InvalidCheckInterval(secs));
        }
    }

    if let Some(minutes) = settings.auto_search_interval_min {
        if !(1..=1440).contains(&minutes) {
            return Err(SettingsError::InvalidSearchInterval(minutes));
        }
    }

    if let Some(mib) = settings.segment_size_mib {
        if mib > 1024 {
            return Err(SettingsError::InvalidSegmentSize(mib));
        }
    }

    if settings.mini_slot_size_kib == Some(0) {
        return Err(SettingsError::InvalidMiniSlotSize);
    }

    // Enabled thresholds (non-zero) must be non-decreasing.
    let limits = [
        settings.prio_highest_size_kib,
        settings.prio_high_size_kib,
        settings.prio_normal_size_kib,
        settings.prio_low_size_kib,
    ];
    let mut previous: Option<u64> = None;
    for limit in limits.into_iter().flatten().filter(|&v| v > 0) {
        if let Some(higher) = previous {
            if higher > limit {
                return Err(SettingsError::PriorityOrder {
                    higher,
                    lower: limit,
                });
            }
        }
        previous = Some(limit);
    }

    Ok(())
}
