//! Mock transport implementation for testing.
//!
//! Simulates a serial device without hardware: reads block until data is
//! enqueued or a timeout elapses, writes land in an inspectable log, and
//! failures can be injected for both directions.

use super::error::TransportError;
use super::Transport;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Inner state of the mock, shared between all clones of one device.
#[derive(Debug, Default)]
struct MockState {
    /// Bytes waiting to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Log of all payloads written to the device.
    write_log: Vec<Vec<u8>>,
    /// Number of upcoming reads that fail with an injected I/O error.
    read_failures: u32,
    /// Number of upcoming writes that fail with an injected I/O error.
    write_failures: u32,
    /// While set, writes park on the condvar instead of completing.
    hold_writes: bool,
}

/// Mock transport for tests.
///
/// `Clone` hands out another handle to the same simulated device, mirroring
/// `SerialPort::try_clone` on real hardware. Reads block on a condvar until
/// data is enqueued or the configured timeout elapses, matching the timeout
/// semantics of a real serial read.
///
/// # Example
/// ```
/// use serial_mux::transport::{MockTransport, Transport};
///
/// let mut port = MockTransport::new("MOCK0");
/// port.enqueue_read(b"pong");
///
/// let mut buffer = [0u8; 16];
/// let n = port.read(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"pong");
///
/// port.write_all(b"ping").unwrap();
/// assert_eq!(port.write_log(), vec![b"ping".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockTransport {
    /// The device identifier.
    name: String,
    /// How long a read blocks before reporting `TimedOut`.
    timeout: Duration,
    /// Shared state plus the condvar that wakes blocked reads and writes.
    state: Arc<(Mutex<MockState>, Condvar)>,
}

impl MockTransport {
    /// Create a new mock device with a short default read timeout.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_timeout(name, Duration::from_millis(25))
    }

    /// Create a new mock device with an explicit read timeout.
    pub fn with_timeout(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            timeout,
            state: Arc::new((Mutex::new(MockState::default()), Condvar::new())),
        }
    }

    /// Enqueue bytes to be returned by subsequent reads, waking any blocked
    /// reader.
    pub fn enqueue_read(&self, data: &[u8]) {
        let (lock, cvar) = &*self.state;
        lock.lock().unwrap().read_queue.extend(data);
        cvar.notify_all();
    }

    /// Get a copy of every payload written so far, in write order.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        let (lock, _) = &*self.state;
        lock.lock().unwrap().write_log.clone()
    }

    /// Make the next `count` reads fail with an I/O error.
    pub fn fail_reads(&self, count: u32) {
        let (lock, cvar) = &*self.state;
        lock.lock().unwrap().read_failures = count;
        cvar.notify_all();
    }

    /// Make the next `count` writes fail with an I/O error.
    pub fn fail_writes(&self, count: u32) {
        let (lock, _) = &*self.state;
        lock.lock().unwrap().write_failures = count;
    }

    /// Stall or release write operations.
    ///
    /// While held, `write_all` parks until released; used to test outbound
    /// queue backpressure.
    pub fn hold_writes(&self, hold: bool) {
        let (lock, cvar) = &*self.state;
        lock.lock().unwrap().hold_writes = hold;
        cvar.notify_all();
    }

    /// Number of bytes currently waiting to be read.
    pub fn available_bytes(&self) -> usize {
        let (lock, _) = &*self.state;
        lock.lock().unwrap().read_queue.len()
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();
        let deadline = Instant::now() + self.timeout;

        loop {
            if state.read_failures > 0 {
                state.read_failures -= 1;
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "injected read failure",
                )));
            }

            if !state.read_queue.is_empty() {
                let mut bytes_read = 0;
                for byte in buffer.iter_mut() {
                    match state.read_queue.pop_front() {
                        Some(queued) => {
                            *byte = queued;
                            bytes_read += 1;
                        }
                        None => break,
                    }
                }
                return Ok(bytes_read);
            }

            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => {
                    return Err(TransportError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "no data within timeout",
                    )))
                }
            };
            state = cvar.wait_timeout(state, remaining).unwrap().0;
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();

        while state.hold_writes {
            state = cvar.wait_timeout(state, Duration::from_millis(25)).unwrap().0;
        }

        if state.write_failures > 0 {
            state.write_failures -= 1;
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "injected write failure",
            )));
        }

        state.write_log.push(data.to_vec());
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(self.clone()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}
