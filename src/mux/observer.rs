//! Observer registration and inbound fan-out.
//!
//! Each observer owns a bounded dispatch queue drained by a dedicated task
//! that invokes its callback, so a slow or panicking observer can never stall
//! a port's reader task or its fellow observers. When an observer falls
//! behind, chunks are dropped for that observer only, with a warning.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// One inbound chunk: source port index plus shared payload.
type Chunk = (u32, Arc<[u8]>);

/// Append-only list of observer dispatch queues.
///
/// There is no removal; observers live until the owning mux shuts down.
pub(crate) struct ObserverRegistry {
    slots: Mutex<Vec<mpsc::Sender<Chunk>>>,
    queue_capacity: usize,
}

impl ObserverRegistry {
    pub(crate) fn new(queue_capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            queue_capacity,
        }
    }

    /// Append an observer and spawn its dispatch task.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn register<F>(&self, callback: F)
    where
        F: Fn(u32, &[u8]) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<Chunk>(self.queue_capacity);
        tokio::spawn(async move {
            while let Some((index, data)) = rx.recv().await {
                callback(index, &data);
            }
        });
        self.slots.lock().push(tx);
    }

    /// Enqueue a chunk to every observer, in registration order.
    ///
    /// Called from reader worker threads; never blocks. A full observer
    /// queue drops the chunk for that observer.
    pub(crate) fn dispatch(&self, index: u32, data: &[u8]) {
        let shared: Arc<[u8]> = Arc::from(data);
        for slot in self.slots.lock().iter() {
            match slot.try_send((index, Arc::clone(&shared))) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(index, len = shared.len(), "observer queue full, chunk dropped");
                }
                // Dispatch task ended (observer panicked); nothing to deliver to.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }

    /// Drop every dispatch queue so observer tasks can exit.
    pub(crate) fn close(&self) {
        self.slots.lock().clear();
    }
}
