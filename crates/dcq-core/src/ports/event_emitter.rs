//! Queue event emitter port.
//!
//! This port abstracts event emission, allowing the queue engine to report
//! state changes without coupling to transport details.

use crate::download::QueueEvent;

/// Port for emitting queue events.
///
/// Implementations handle the actual event delivery (channels, RPC push,
/// logs). `emit` is called from the engine's runner and must not block.
pub trait QueueEventEmitterPort: Send + Sync {
    /// Emit a queue event.
    fn emit(&self, event: QueueEvent);

    /// Clone this emitter into a boxed trait object.
    fn clone_box(&self) -> Box<dyn QueueEventEmitterPort>;
}

/// A no-op emitter for tests and headless contexts.
#[derive(Debug, Clone, Default)]
pub struct NoopQueueEmitter;

impl NoopQueueEmitter {
    /// Create a new no-op emitter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl QueueEventEmitterPort for NoopQueueEmitter {
    fn emit(&self, _event: QueueEvent) {
        // Intentionally do nothing
    }

    fn clone_box(&self) -> Box<dyn QueueEventEmitterPort> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::download::ItemId;

    #[test]
    fn test_noop_emitter() {
        let emitter = NoopQueueEmitter::new();

        // Should not panic
        emitter.emit(QueueEvent::ItemRemoved { id: ItemId::new(1) });
    }

    #[test]
    fn test_arc_emitter_clone_box() {
        let emitter: Arc<dyn QueueEventEmitterPort> = Arc::new(NoopQueueEmitter::new());
        let boxed = emitter.clone_box();
        boxed.emit(QueueEvent::ExtraSlotGranted);
    }
}
