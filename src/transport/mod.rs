//! Transport abstraction for serial communication.
//!
//! Provides the [`Transport`] trait plus a real implementation backed by the
//! `serialport` crate and a mock for testing without hardware, enabling
//! dependency injection throughout the multiplexer.

pub mod error;
pub mod mock;
pub mod serial;

pub use error::TransportError;
pub use mock::MockTransport;
pub use serial::SerialTransport;

/// Blocking duplex byte stream a port is built on.
///
/// A real serial link blocks on `read` until data arrives or the configured
/// timeout elapses, and `write_all` transmits the whole payload or fails.
/// Each port runs its reader and writer on separate worker threads, so
/// `try_clone` must hand out an independent handle to the same underlying
/// device.
pub trait Transport: Send + std::fmt::Debug {
    /// Read up to `buffer.len()` bytes, blocking until data arrives or the
    /// transport's timeout elapses.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError>;

    /// Write the entire payload, blocking until it is accepted by the device.
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Produce an independent handle to the same underlying device.
    fn try_clone(&self) -> Result<Box<dyn Transport>, TransportError>;

    /// The device path or identifier this transport is bound to.
    fn name(&self) -> &str;
}
