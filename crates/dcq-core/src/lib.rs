//! Core domain types and port definitions for the dcq download queue.
//!
//! This crate holds everything the queue engine and its collaborators agree
//! on: identifiers, the error taxonomy, events, snapshot DTOs, settings, and
//! the port traits for discovery, persistence and reporting. It performs no
//! I/O of its own.
//!
//! - `download` - identifiers, errors, events, config and DTOs
//! - `ports` - collaborator interfaces (discovery, persistence, reporting)
//! - `settings` - user-facing settings with validation and partial updates

pub mod download;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use download::{
    AutoSearchConfig, ContentId, DownloadError, DownloadResult, DropConfig, EnqueueRequest,
    FailureKind, ItemError, ItemId, ItemKind, ItemSources, ItemStatus, ItemSummary, MagnetLink,
    PeerHandle, PersistedItem, PersistedSegment, Priority, PriorityThresholds, QueueConfig,
    QueueEvent, QueueSnapshot, SegmentSizing, SegmentState, SlotConfig, SourceOffer,
    SourceSummary, TigerHash, parse_magnet,
};
pub use ports::{
    ByteStream, DiscoveryPort, ListingEntry, NoopQueueEmitter, QueueEventEmitterPort,
    QueueManagerPort, QueueStateRepositoryPort, RemoteTree, RepositoryError, SegmentRequest,
};
pub use settings::{QueueSettings, QueueSettingsUpdate, SettingsError, validate_settings};
