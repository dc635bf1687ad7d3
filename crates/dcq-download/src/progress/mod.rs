//! Progress throttling.
//!
//! Workers report received bytes through a throttle so the runner is not
//! flooded with progress commands.

mod throttle;

pub use throttle::ProgressThrottle;
