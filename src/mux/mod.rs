//! The port manager: registry, open/send surface, and task lifecycle.
//!
//! A [`SerialMux`] owns the port registry and the observer registry. Each
//! opened port gets a bounded outbound frame queue plus one reader and one
//! writer task on blocking worker threads. Registries are plain fields of the
//! manager rather than process globals, so tests (and processes talking to
//! disjoint device sets) can run several independent instances.

pub(crate) mod observer;
mod tasks;

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MuxConfig;
use crate::error::MuxError;
use crate::transport::{SerialTransport, Transport, TransportError};
use observer::ObserverRegistry;

/// Liveness of one port's background tasks.
///
/// A dead flag is permanent: faulted tasks are not restarted, and the port's
/// index stays registered (there is no reopen under a taken index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortHealth {
    pub reader_alive: bool,
    pub writer_alive: bool,
}

/// State shared between a port's handle and its two tasks.
pub(crate) struct PortShared {
    pub(crate) reader_alive: AtomicBool,
    pub(crate) writer_alive: AtomicBool,
    /// Manager-wide stop flag, polled at every task suspension point.
    pub(crate) shutdown: Arc<AtomicBool>,
}

/// Registry entry for one open port.
struct PortHandle {
    device: String,
    frames: mpsc::Sender<Vec<u8>>,
    shared: Arc<PortShared>,
}

struct MuxInner {
    config: MuxConfig,
    ports: Mutex<HashMap<u32, PortHandle>>,
    observers: Arc<ObserverRegistry>,
    shutdown: Arc<AtomicBool>,
}

impl Drop for MuxInner {
    fn drop(&mut self) {
        // Tasks hold the flag through their PortShared and exit on the next
        // read timeout or queue wakeup.
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

/// Multiplexer over independently-addressed serial ports.
///
/// Cloning is cheap; all clones share one registry. Methods that spawn tasks
/// (`open`, `open_with`, `register_observer`) must be called from within a
/// Tokio runtime.
///
/// ```no_run
/// use serial_mux::SerialMux;
///
/// # async fn demo() -> Result<(), serial_mux::MuxError> {
/// let mux = SerialMux::new();
/// mux.register_observer(|index, data| {
///     println!("port {index}: {} bytes", data.len());
/// });
/// mux.open(1, "/dev/ttyUSB0", 115200).await?;
/// mux.send(1, b"AT\r\n".to_vec()).await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SerialMux {
    inner: Arc<MuxInner>,
}

impl SerialMux {
    /// Create a multiplexer with default configuration.
    pub fn new() -> Self {
        Self::with_config(MuxConfig::default())
    }

    /// Create a multiplexer with explicit configuration.
    ///
    /// Zero-sized capacities are clamped to 1; use
    /// [`MuxConfig::validate`](crate::config::MuxConfig::validate) to reject
    /// them instead.
    pub fn with_config(config: MuxConfig) -> Self {
        let config = config.sanitized();
        let observers = Arc::new(ObserverRegistry::new(config.observer_queue_capacity));
        Self {
            inner: Arc::new(MuxInner {
                config,
                ports: Mutex::new(HashMap::new()),
                observers,
                shutdown: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// Open the serial device and register it under `index`.
    ///
    /// Fails with [`MuxError::AlreadyOpen`] if the index is taken (the device
    /// is then never touched), with [`MuxError::OpenFailed`] if the transport
    /// cannot be opened (the index stays unregistered), and with
    /// [`MuxError::ShutDown`] after `shutdown`. On success the port's reader
    /// and writer tasks are running before this returns.
    pub async fn open(&self, index: u32, device: &str, baud_rate: u32) -> Result<(), MuxError> {
        if self.inner.shutdown.load(Ordering::Relaxed) {
            return Err(MuxError::ShutDown);
        }
        if self.inner.ports.lock().contains_key(&index) {
            return Err(MuxError::AlreadyOpen(index));
        }

        let timeout = self.inner.config.read_timeout();
        let device_owned = device.to_string();
        let transport =
            tokio::task::spawn_blocking(move || SerialTransport::open(&device_owned, baud_rate, timeout))
                .await
                .map_err(|e| MuxError::OpenFailed {
                    device: device.to_string(),
                    source: TransportError::Io(std::io::Error::other(e)),
                })?
                .map_err(|source| MuxError::OpenFailed {
                    device: device.to_string(),
                    source,
                })?;

        info!(index, device, baud_rate, "serial port opened");
        self.open_with(index, Box::new(transport))
    }

    /// Register a pre-built transport under `index` and start its tasks.
    ///
    /// This is the dependency-injection seam: tests hand in a
    /// [`MockTransport`](crate::transport::MockTransport) here instead of
    /// touching hardware. Insertion is atomic under the registry lock, so of
    /// two racing calls with one index exactly one wins; the loser's
    /// transport is dropped.
    pub fn open_with(&self, index: u32, transport: Box<dyn Transport>) -> Result<(), MuxError> {
        // A shut-down mux would register a port whose tasks exit on their
        // first shutdown poll, leaving a permanently dead entry.
        if self.inner.shutdown.load(Ordering::Relaxed) {
            return Err(MuxError::ShutDown);
        }
        let reader_half = transport.try_clone().map_err(|source| MuxError::OpenFailed {
            device: transport.name().to_string(),
            source,
        })?;
        let writer_half = transport;

        let (frames_tx, frames_rx) = mpsc::channel(self.inner.config.queue_capacity);
        let shared = Arc::new(PortShared {
            reader_alive: AtomicBool::new(true),
            writer_alive: AtomicBool::new(true),
            shutdown: Arc::clone(&self.inner.shutdown),
        });

        match self.inner.ports.lock().entry(index) {
            Entry::Occupied(_) => return Err(MuxError::AlreadyOpen(index)),
            Entry::Vacant(slot) => {
                slot.insert(PortHandle {
                    device: writer_half.name().to_string(),
                    frames: frames_tx,
                    shared: Arc::clone(&shared),
                });
            }
        }

        let observers = Arc::clone(&self.inner.observers);
        let reader_shared = Arc::clone(&shared);
        let reader_config = self.inner.config.clone();
        tokio::task::spawn_blocking(move || {
            tasks::run_reader(reader_half, index, reader_shared, observers, reader_config)
        });

        let writer_config = self.inner.config.clone();
        tokio::task::spawn_blocking(move || {
            tasks::run_writer(writer_half, index, shared, frames_rx, writer_config)
        });

        Ok(())
    }

    /// Enqueue a frame for transmission on `index`.
    ///
    /// Suspends while the port's outbound queue is full (backpressure).
    /// Never surfaces an error: an unknown index or a faulted writer is
    /// logged and the frame is dropped, matching the fire-and-forget
    /// transmit contract.
    pub async fn send(&self, index: u32, frame: Vec<u8>) {
        let sender = match self.inner.ports.lock().get(&index) {
            Some(handle) => handle.frames.clone(),
            None => {
                warn!(index, len = frame.len(), "send to unopened port, frame dropped");
                return;
            }
        };
        if sender.send(frame).await.is_err() {
            debug!(index, "writer gone, frame dropped");
        }
    }

    /// Register an observer invoked with `(index, chunk)` for every chunk
    /// received on every port.
    ///
    /// Observers cannot be removed. Each runs on its own dispatch task with a
    /// bounded queue, so one slow observer never delays reads or other
    /// observers; it only loses chunks once its own queue is full.
    pub fn register_observer<F>(&self, callback: F)
    where
        F: Fn(u32, &[u8]) + Send + 'static,
    {
        self.inner.observers.register(callback);
    }

    /// Task liveness for a registered port, or `None` for an unknown index.
    pub fn health(&self, index: u32) -> Option<PortHealth> {
        self.inner.ports.lock().get(&index).map(|handle| PortHealth {
            reader_alive: handle.shared.reader_alive.load(Ordering::Relaxed),
            writer_alive: handle.shared.writer_alive.load(Ordering::Relaxed),
        })
    }

    /// Device path a registered index is bound to.
    pub fn device(&self, index: u32) -> Option<String> {
        self.inner
            .ports
            .lock()
            .get(&index)
            .map(|handle| handle.device.clone())
    }

    /// Currently registered port indices, ascending.
    pub fn indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self.inner.ports.lock().keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// Stop every port task and observer dispatch task.
    ///
    /// Queued outbound frames are discarded. Intended for orderly process
    /// shutdown; later `open` calls on this instance fail with
    /// [`MuxError::ShutDown`].
    pub fn shutdown(&self) {
        info!("serial mux shutting down");
        self.inner.shutdown.store(true, Ordering::Relaxed);
        // Dropping the handles closes every frame queue, waking writers.
        self.inner.ports.lock().clear();
        self.inner.observers.close();
    }
}

impl Default for SerialMux {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SerialMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialMux")
            .field("indices", &self.indices())
            .field("shutdown", &self.inner.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}
