//! Segmented multi-source download queue.
//!
//! Files are identified by the Tiger tree root of their content, split into
//! segments, fetched from every peer known to have them, verified block by
//! block against the tree, and written into a partial file that is renamed
//! onto the target once every segment checks out.
//!
//! - `tree` - Tiger tree hashing and block verification
//! - `queue` - pure queue state machine (items, segments, sources, leases)
//! - `policy` - automatic priority, slow-source dropping, auto-search
//! - `slots` - download/upload/mini slot ledger and the extra upload slot
//! - `manager` - the async runner behind `QueueManagerPort`
//! - `persist` - JSON-file queue persistence

// Re-export core types for convenience
pub use dcq_core::download::{
    ContentId, DownloadError, DownloadResult, EnqueueRequest, ItemId, ItemKind, ItemSources,
    ItemStatus, ItemSummary, PeerHandle, Priority, QueueConfig, QueueEvent, QueueSnapshot,
    SourceOffer, TigerHash,
};
pub use dcq_core::ports::{
    DiscoveryPort, QueueEventEmitterPort, QueueManagerPort, QueueStateRepositoryPort,
};

pub mod policy;
pub(crate) mod progress;
pub mod queue;
pub mod slots;
pub mod tree;

// Re-export progress throttle for consumers (adapters)
pub use progress::ProgressThrottle;

pub use slots::{ExtraSlotChange, ExtraSlotPolicy, SlotHandle, SlotKind, SlotLedger};
pub use tree::{HashTree, TreeError};

mod persist;
pub use persist::JsonFileRepository;

// Public API - queue manager
mod manager;

pub use manager::{QueueHandle, QueueManagerDeps, build_queue_manager};
