//! Native serial port implementation using the `serialport` crate.

use {
    crate::{
        error::Result,
        port::{Clear, Port, SerialConfig},
    },
    log::trace,
    serialport::{ClearBuffer, FlowControl, SerialPort},
    std::{
        io::{Read, Write},
        time::Duration,
    },
};

#[cfg(unix)]
type SysPort = serialport::TTYPort;
#[cfg(windows)]
type SysPort = serialport::COMPort;

/// Native serial port implementation.
///
/// Wraps the platform-native port type rather than `Box<dyn SerialPort>`
/// so the raw file descriptor stays available on Unix; attaching the HCI
/// line discipline needs it.
pub struct NativePort {
    port: Option<SysPort>,
    name: String,
    timeout: Duration,
    baud_rate: u32,
}

impl NativePort {
    /// Open a serial port with the given configuration.
    ///
    /// The port starts out with 8N1 framing and no flow control, which is
    /// what the boot ROM expects.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(FlowControl::None)
            .open_native()?;

        Ok(Self {
            port: Some(port),
            name: config.port_name.clone(),
            timeout: config.timeout,
            baud_rate: config.baud_rate,
        })
    }

    /// Open a serial port with default settings.
    pub fn open_simple(port_name: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig::new(port_name, baud_rate);
        Self::open(&config)
    }
}

impl Port for NativePort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if let Some(ref mut p) = self.port {
            p.set_timeout(timeout)?;
        }
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        trace!("switching {} to {} baud", self.name, baud_rate);
        if let Some(ref mut p) = self.port {
            p.set_baud_rate(baud_rate)?;
        }
        self.baud_rate = baud_rate;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn clear(&mut self, direction: Clear) -> Result<()> {
        if let Some(ref mut p) = self.port {
            let buffer = match direction {
                Clear::Input => ClearBuffer::Input,
                Clear::Output => ClearBuffer::Output,
                Clear::All => ClearBuffer::All,
            };
            p.clear(buffer)?;
        }
        Ok(())
    }

    fn set_flow_control(&mut self, enabled: bool) -> Result<()> {
        trace!("hardware flow control {}", if enabled { "on" } else { "off" });
        if let Some(ref mut p) = self.port {
            let flow = if enabled {
                FlowControl::Hardware
            } else {
                FlowControl::None
            };
            p.set_flow_control(flow)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    #[cfg(unix)]
    fn raw_fd(&self) -> Option<std::os::unix::io::RawFd> {
        use std::os::unix::io::AsRawFd;
        self.port.as_ref().map(AsRawFd::as_raw_fd)
    }

    fn close(&mut self) -> Result<()> {
        // Take ownership of the port and let it drop (close)
        self.port.take();
        Ok(())
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed"))
            .and_then(|p| p.read(buf))
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed"))
            .and_then(|p| p.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed"))
            .and_then(std::io::Write::flush)
    }
}
