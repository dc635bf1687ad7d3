//! Download domain types, events, errors, and configuration.
//!
//! Pure data types with no I/O, networking, or runtime dependencies.
//!
//! # Structure
//!
//! - `types` - identifiers and small enums (`ItemId`, `TigerHash`, `Priority`, ...)
//! - `errors` - the error taxonomy and per-item error state
//! - `events` - `QueueEvent`, the reporting stream
//! - `queue` - snapshot DTOs and the persisted queue shape
//! - `config` - concrete engine configuration
//! - `magnet` - magnet link parsing

pub mod config;
pub mod errors;
pub mod events;
pub mod magnet;
pub mod queue;
pub mod types;

// Re-export commonly used types
pub use config::{
    AutoSearchConfig, DropConfig, PriorityThresholds, QueueConfig, SegmentSizing, SlotConfig,
};
pub use errors::{DownloadError, DownloadResult, FailureKind, ItemError};
pub use events::QueueEvent;
pub use magnet::{MagnetLink, parse_magnet};
pub use queue::{
    ItemSources, ItemSummary, PersistedItem, PersistedSegment, QueueSnapshot, SourceSummary,
};
pub use types::{
    ContentId, EnqueueRequest, ItemId, ItemKind, ItemStatus, PeerHandle, Priority, SegmentState,
    SourceOffer, TigerHash,
};
