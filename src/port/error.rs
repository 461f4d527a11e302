//! Port-level error types, separate from the session-level errors so the
//! transport layer can report device failures without knowing about the
//! protocol above it.

use thiserror::Error;

/// Errors that can occur on the physical byte channel.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial device was not found on the system.
    #[error("serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during a read or write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The port could not be configured as requested.
    #[error("port configuration error: {0}")]
    Config(String),

    /// A serialport-specific error occurred.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
