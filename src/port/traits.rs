//! Core trait for the physical byte channel.
//!
//! A [`LinkPort`] is a half-duplex, unframed byte stream: writes go out as
//! raw bytes, reads return whatever happens to be buffered (possibly echoes
//! of our own writes). Both the real serial implementation and the mock used
//! in tests implement this trait.

use super::error::PortError;

/// Byte-level operations on the physical link.
///
/// `read_available` must be non-blocking: it returns `Ok(0)` when no data is
/// buffered instead of waiting. The reader worker polls it at a fixed
/// interval, so a blocking implementation would stall the poll loop.
pub trait LinkPort: Send + std::fmt::Debug {
    /// Write bytes to the link. Returns the number of bytes accepted.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read whatever bytes are currently available, without blocking.
    ///
    /// Returns the number of bytes placed in `buffer`; `Ok(0)` means the
    /// link is idle right now.
    fn read_available(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// The name/path of this link (e.g. `/dev/ttyS0`), for diagnostics.
    fn name(&self) -> &str;
}
