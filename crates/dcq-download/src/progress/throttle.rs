//! Progress throttling.
//!
//! Rate-limits progress updates to avoid overwhelming the runner with events.

use std::time::{Duration, Instant};

/// Bytes that force an update regardless of the interval.
const DEFAULT_MIN_BYTES: u64 = 1024 * 1024;

/// Rate-limiter for progress updates.
///
/// An update passes when the configured interval has elapsed since the last
/// one, or when at least `min_bytes` arrived since then.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    min_interval: Duration,
    min_bytes: u64,
    pending_bytes: u64,
}

impl ProgressThrottle {
    /// Create a new throttle with the specified minimum interval.
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: None,
            min_interval,
            min_bytes: DEFAULT_MIN_BYTES,
            pending_bytes: 0,
        }
    }

    /// Create a throttle with a default interval of 200ms.
    pub const fn default_interval() -> Self {
        Self::new(Duration::from_millis(200))
    }

    /// Byte threshold that bypasses the interval.
    #[must_use]
    pub const fn with_min_bytes(mut self, min_bytes: u64) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    /// Account `bytes` and check whether an update should go out at `now`.
    ///
    /// Returns the bytes accumulated since the last update when it should.
    pub fn record(&mut self, now: Instant, bytes: u64) -> Option<u64> {
        self.pending_bytes += bytes;
        let due = match self.last_emit {
            Some(last) => {
                now.duration_since(last) >= self.min_interval || self.pending_bytes >= self.min_bytes
            }
            None => true,
        };
        if !due {
            return None;
        }
        self.last_emit = Some(now);
        Some(std::mem::take(&mut self.pending_bytes))
    }

    /// Bytes recorded but not yet reported.
    pub const fn pending(&self) -> u64 {
        self.pending_bytes
    }

    /// Report everything still pending. Returns 0 when nothing is.
    pub fn flush(&mut self) -> u64 {
        std::mem::take(&mut self.pending_bytes)
    }

    /// Force the next check to return true.
    pub const fn reset(&mut self) {
        self.last_emit = None;
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::default_interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_first_emit() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(100));
        assert_eq!(throttle.record(Instant::now(), 10), Some(10)); // First call always emits
    }

    #[test]
    fn test_throttle_respects_interval() {
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new(Duration::from_millis(50));
        assert!(throttle.record(start, 1).is_some());
        assert!(throttle.record(start + Duration::from_millis(10), 2).is_none()); // Too soon
        assert_eq!(throttle.pending(), 2);

        let later = start + Duration::from_millis(60);
        assert_eq!(throttle.record(later, 3), Some(5)); // Accumulated bytes
    }

    #[test]
    fn test_throttle_byte_threshold() {
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new(Duration::from_secs(10)).with_min_bytes(100);
        throttle.record(start, 1);
        assert!(throttle.record(start, 50).is_none());
        assert_eq!(throttle.record(start, 50), Some(100));
    }

    #[test]
    fn test_throttle_reset_and_flush() {
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new(Duration::from_millis(100));
        throttle.record(start, 1);
        assert!(throttle.record(start, 4).is_none());
        assert_eq!(throttle.flush(), 4);
        assert_eq!(throttle.flush(), 0);

        throttle.reset();
        assert!(throttle.record(start, 0).is_some()); // Reset allows immediate emit
    }
}
