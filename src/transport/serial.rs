//! Real serial transport backed by the `serialport` crate.

use super::error::TransportError;
use super::Transport;
use std::io::{Read, Write};
use std::time::Duration;

/// Serial transport wrapping `serialport::SerialPort`.
pub struct SerialTransport {
    /// The underlying serial port handle.
    port: Box<dyn serialport::SerialPort>,
    /// The device path for identification and logging.
    name: String,
}

impl SerialTransport {
    /// Open a serial device at the given baud rate.
    ///
    /// `timeout` bounds each blocking read; an idle line surfaces as a
    /// transient `TimedOut` error rather than blocking forever.
    ///
    /// # Example
    /// ```no_run
    /// use serial_mux::transport::SerialTransport;
    /// use std::time::Duration;
    ///
    /// let port = SerialTransport::open("/dev/ttyUSB0", 115200, Duration::from_millis(100))?;
    /// # Ok::<(), serial_mux::TransportError>(())
    /// ```
    pub fn open(device: &str, baud_rate: u32, timeout: Duration) -> Result<Self, TransportError> {
        let port = serialport::new(device, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::not_found(device),
                // Linux reports a missing device as a plain ENOENT I/O error.
                serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                    TransportError::not_found(device)
                }
                serialport::ErrorKind::InvalidInput => TransportError::config(e.to_string()),
                _ => TransportError::Serial(e),
            })?;

        Ok(Self {
            port,
            name: device.to_string(),
        })
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        self.port.read(buffer).map_err(TransportError::Io)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(data).map_err(TransportError::Io)
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>, TransportError> {
        let port = self.port.try_clone().map_err(TransportError::Serial)?;
        Ok(Box::new(Self {
            port,
            name: self.name.clone(),
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_not_found_error() {
        let result = SerialTransport::open(
            "/dev/nonexistent_port_12345",
            9600,
            Duration::from_millis(100),
        );

        assert!(result.is_err());
        if let Err(e) = result {
            match e {
                TransportError::NotFound(name) => {
                    assert!(name.contains("nonexistent"));
                }
                _ => panic!("Expected NotFound error, got: {:?}", e),
            }
        }
    }
}
