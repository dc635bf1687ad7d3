//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the queue engine needs from its collaborators
//! without specifying how they are implemented. The hub/peer session layer
//! implements [`DiscoveryPort`]; a frontend implements
//! [`QueueEventEmitterPort`]; storage implements [`QueueStateRepositoryPort`].
//!
//! # Design Rules
//!
//! - No transport types in trait signatures (sockets, hub sessions)
//! - Traits are minimal and capability-focused
//! - All traits require `Send + Sync` for async compatibility

use thiserror::Error;

pub mod discovery;
pub mod event_emitter;
pub mod queue_manager;
pub mod state;

pub use discovery::{ByteStream, DiscoveryPort, ListingEntry, RemoteTree, SegmentRequest};
pub use event_emitter::{NoopQueueEmitter, QueueEventEmitterPort};
pub use queue_manager::QueueManagerPort;
pub use state::QueueStateRepositoryPort;

/// Domain-specific errors for repository operations.
///
/// Abstracts storage details behind a small set of categories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The requested entity was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage backend error (filesystem, database, ...).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A constraint was violated (e.g. two items with the same id).
    #[error("Constraint violation: {0}")]
    Constraint(String),
}
