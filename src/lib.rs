//! Serial port multiplexer.
//!
//! Fans traffic across multiple independently-addressed serial ports,
//! decoupling physical I/O from application logic. Callers open a port under
//! a caller-chosen integer index, send opaque byte frames to it, and
//! subscribe observers that receive every inbound chunk from every port.
//! Each port runs one reader and one writer task; outbound frames flow
//! through a bounded queue that applies backpressure to senders.
//!
//! # Modules
//!
//! - `config`: tuning knobs with serde defaults and TOML loading
//! - `error`: the error type surfaced by `open`
//! - `mux`: the port manager, registries, and per-port tasks
//! - `transport`: the duplex byte-stream abstraction plus real and mock
//!   implementations

pub mod config;
pub mod error;
pub mod mux;
pub mod transport;

// Re-export commonly used types for convenience
pub use config::{ConfigError, MuxConfig};
pub use error::MuxError;
pub use mux::{PortHealth, SerialMux};
pub use transport::{MockTransport, SerialTransport, Transport, TransportError};
