//! Crate-level error type.
//!
//! Only `open` surfaces errors to callers; everything that goes wrong inside
//! a running port is reported through `tracing` and the port health flags.

use crate::transport::TransportError;
use thiserror::Error;

/// Errors returned by [`SerialMux::open`](crate::SerialMux::open).
#[derive(Debug, Error)]
pub enum MuxError {
    /// The index is already bound to an open port; nothing was changed and
    /// the requested device was never opened.
    #[error("port index {0} is already open")]
    AlreadyOpen(u32),

    /// The underlying transport failed to open; the index stays unregistered.
    #[error("failed to open {device}: {source}")]
    OpenFailed {
        device: String,
        #[source]
        source: TransportError,
    },

    /// The multiplexer was shut down; no new ports can be opened on it.
    #[error("multiplexer is shut down")]
    ShutDown,
}
