//! Real serial port implementation.
//!
//! Wraps the `serialport` crate behind [`LinkPort`]. The port is opened with
//! a zero read timeout so reads are effectively non-blocking; "no data yet"
//! conditions are mapped to `Ok(0)` for the poll loop.

use super::error::PortError;
use super::traits::LinkPort;
use std::io::{Read, Write};
use std::time::Duration;

/// Serial device behind the [`LinkPort`] trait.
pub struct SerialLinkPort {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SerialLinkPort {
    /// Open a serial device in 8N1 mode at the given baud rate.
    ///
    /// The read timeout is set to zero so `read_available` never blocks the
    /// reader worker.
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, PortError> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::ZERO)
            .open()
            .map_err(|e| match e.kind() {
                // A missing device path surfaces as a plain I/O NotFound,
                // not as NoDevice.
                serialport::ErrorKind::NoDevice
                | serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                    PortError::not_found(port_name)
                }
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

impl LinkPort for SerialLinkPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.port.write(data).map_err(PortError::Io)
    }

    fn read_available(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => Err(PortError::Io(e)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SerialLinkPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLinkPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate().ok())
            .finish()
    }
}
