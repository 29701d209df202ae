//! Port abstraction over the serial transport.
//!
//! The protocol layers only ever see the [`Port`] trait, which keeps them
//! I/O-agnostic and lets the tests drive them with a scripted mock. The
//! native implementation wraps the `serialport` crate's platform type so
//! that the raw file descriptor stays reachable for the line-discipline
//! attach on Linux.

pub mod native;

use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyS1", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115200,
            timeout: Duration::from_millis(1000),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Which buffered direction to discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clear {
    /// Pending received bytes.
    Input,
    /// Pending transmit bytes.
    Output,
    /// Both directions.
    All,
}

/// Unified port trait for serial communication.
pub trait Port: Read + Write + Send {
    /// Set the read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Set the baud rate.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;

    /// Get the current baud rate.
    fn baud_rate(&self) -> u32;

    /// Discard buffered bytes in the given direction.
    fn clear(&mut self, direction: Clear) -> Result<()>;

    /// Enable or disable hardware (RTS/CTS) flow control.
    fn set_flow_control(&mut self, enabled: bool) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Raw file descriptor of the underlying device, when there is one.
    #[cfg(unix)]
    fn raw_fd(&self) -> Option<std::os::unix::io::RawFd> {
        None
    }

    /// Close the port and release resources.
    fn close(&mut self) -> Result<()>;

    /// Read exactly `buf.len()` bytes, retrying partial reads.
    ///
    /// A read timeout or end-of-stream surfaces as an I/O error; the
    /// transaction layer treats either as a failed exchange.
    fn read_exact_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "port closed while reading",
                    )
                    .into());
                },
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Write all bytes and flush.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }
}

// Re-export the native implementation
pub use native::NativePort;
