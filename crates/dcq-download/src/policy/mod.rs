//! Scheduling policies.
//!
//! Pure decision functions over queue state: automatic priority, slow-source
//! dropping and auto-search candidate selection. The runner applies their
//! results.

pub mod drop;
pub mod priority;
pub mod search;

pub use drop::{DropAction, DropDecision};
pub use priority::classify;
pub use search::{SearchGuard, search_candidates};
