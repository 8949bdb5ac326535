//! Per-port reader and writer loops.
//!
//! Both loops run on blocking worker threads and share one failure policy:
//! transient read timeouts are silent, real errors are retried with
//! exponential backoff, and a run of `max_consecutive_errors` failures marks
//! the task faulted and stops it. Both check the mux shutdown flag at every
//! suspension point.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::config::MuxConfig;
use crate::mux::observer::ObserverRegistry;
use crate::mux::PortShared;
use crate::transport::Transport;

/// Exponential retry delay with a consecutive-failure budget.
pub(crate) struct Backoff {
    next: Duration,
    initial: Duration,
    max: Duration,
    consecutive: u32,
    budget: u32,
}

impl Backoff {
    pub(crate) fn new(config: &MuxConfig) -> Self {
        Self {
            next: config.initial_backoff(),
            initial: config.initial_backoff(),
            max: config.max_backoff(),
            consecutive: 0,
            budget: config.max_consecutive_errors,
        }
    }

    /// Forget the failure streak after a successful operation.
    pub(crate) fn reset(&mut self) {
        self.next = self.initial;
        self.consecutive = 0;
    }

    /// Record a failure; returns the delay to sleep before retrying, or
    /// `None` once the failure budget is spent.
    pub(crate) fn failure(&mut self) -> Option<Duration> {
        self.consecutive += 1;
        if self.consecutive >= self.budget {
            return None;
        }
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        Some(delay)
    }
}

/// Reader loop: pull chunks from the transport and fan them out.
pub(crate) fn run_reader(
    mut transport: Box<dyn Transport>,
    index: u32,
    shared: Arc<PortShared>,
    observers: Arc<ObserverRegistry>,
    config: MuxConfig,
) {
    let mut buffer = vec![0u8; config.read_buffer_size];
    let mut backoff = Backoff::new(&config);

    while !shared.shutdown.load(Ordering::Relaxed) {
        match transport.read(&mut buffer) {
            // An idle pass ends the consecutive-failure run; only an
            // unbroken streak of real errors may spend the fault budget.
            Ok(0) => backoff.reset(),
            Ok(n) => {
                backoff.reset();
                trace!(index, len = n, "chunk received");
                observers.dispatch(index, &buffer[..n]);
            }
            // Idle line; the timeout doubles as our shutdown poll interval.
            Err(e) if e.is_transient() => backoff.reset(),
            Err(e) => {
                warn!(index, error = %e, "read failed");
                match backoff.failure() {
                    Some(delay) => thread::sleep(delay),
                    None => {
                        error!(index, "reader faulted after repeated read failures");
                        shared.reader_alive.store(false, Ordering::Relaxed);
                        return;
                    }
                }
            }
        }
    }

    shared.reader_alive.store(false, Ordering::Relaxed);
    debug!(index, "reader stopped");
}

/// Writer loop: drain the outbound queue FIFO and write each frame in full.
pub(crate) fn run_writer(
    mut transport: Box<dyn Transport>,
    index: u32,
    shared: Arc<PortShared>,
    mut frames: mpsc::Receiver<Vec<u8>>,
    config: MuxConfig,
) {
    let mut backoff = Backoff::new(&config);

    'frames: while !shared.shutdown.load(Ordering::Relaxed) {
        // All senders dropped means the port was unregistered; exit cleanly.
        let frame = match frames.blocking_recv() {
            Some(frame) => frame,
            None => break,
        };
        debug!(index, len = frame.len(), "writing frame");

        loop {
            match transport.write_all(&frame) {
                Ok(()) => {
                    backoff.reset();
                    continue 'frames;
                }
                Err(e) => {
                    warn!(index, error = %e, "write failed");
                    match backoff.failure() {
                        Some(delay) => thread::sleep(delay),
                        None => {
                            error!(index, "writer faulted after repeated write failures");
                            shared.writer_alive.store(false, Ordering::Relaxed);
                            return;
                        }
                    }
                }
            }
            if shared.shutdown.load(Ordering::Relaxed) {
                break 'frames;
            }
        }
    }

    shared.writer_alive.store(false, Ordering::Relaxed);
    debug!(index, "writer stopped");
}
