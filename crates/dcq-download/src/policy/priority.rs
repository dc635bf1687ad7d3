//! Automatic priority from file size.

use dcq_core::{Priority, PriorityThresholds};

/// Priority of a newly added item of `size` bytes.
///
/// Thresholds are checked from highest to low; a zero threshold is skipped.
/// Larger items get `Lowest` only when `oversized_as_lowest` is set.
pub const fn classify(size: u64, thresholds: &PriorityThresholds) -> Priority {
    const fn within(size: u64, limit: u64) -> bool {
        limit > 0 && size <= limit
    }

    if within(size, thresholds.highest_max) {
        Priority::Highest
    } else if within(size, thresholds.high_max) {
        Priority::High
    } else if within(size, thresholds.normal_max) {
        Priority::Normal
    } else if within(size, thresholds.low_max) {
        Priority::Low
    } else if thresholds.oversized_as_lowest {
        Priority::Lowest
    } else {
        Priority::Normal
    }
}
