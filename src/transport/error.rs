//! Transport-level error types.
//!
//! Kept separate from the multiplexer's own error enum so the transport layer
//! stays usable on its own.

use thiserror::Error;

/// Errors that can occur while opening or using a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The named serial device does not exist on this system.
    #[error("serial device not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during a read or write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested port parameters were rejected.
    #[error("configuration error: {0}")]
    Config(String),

    /// A serialport-specific error occurred.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl TransportError {
    /// Create a `NotFound` error from a device path.
    pub fn not_found(device: impl Into<String>) -> Self {
        Self::NotFound(device.into())
    }

    /// Create a `Config` error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for errors a blocking read surfaces when the line is merely idle.
    ///
    /// A serial read with a timeout reports idle periods as `TimedOut` (or
    /// `WouldBlock` on some platforms); those are not failures of the link.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::not_found("/dev/ttyUSB0");
        assert_eq!(err.to_string(), "serial device not found: /dev/ttyUSB0");

        let err = TransportError::config("invalid baud rate");
        assert_eq!(err.to_string(), "configuration error: invalid baud rate");
    }

    #[test]
    fn test_timeout_is_transient() {
        let err = TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "read timed out",
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn test_broken_pipe_is_not_transient() {
        let err = TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "device unplugged",
        ));
        assert!(!err.is_transient());
    }
}
