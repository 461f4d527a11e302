//! Session-level error taxonomy.
//!
//! Transport failures are detected at the lowest layer that can observe them
//! and propagated upward as typed variants. A remote command's non-zero exit
//! status is *not* an error here; only protocol-level failures are.

use crate::port::PortError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the connection engine.
///
/// No automatic retries happen anywhere in the core: every failure is
/// reported to the caller, which owns retry policy. After a
/// [`ResponseTimeout`](ConnectionError::ResponseTimeout) the remote state is
/// unknown and the session should be reconnected.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No inbound line arrived within the response window (measured from the
    /// last completed line, not from the start of the call).
    #[error("no response from remote within {window:?}")]
    ResponseTimeout { window: Duration },

    /// The login sequence did not reach a ready shell.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Shell-state detection stayed unresolved after the configured number
    /// of probe attempts.
    #[error("could not detect remote shell state after {attempts} attempts")]
    ShellUndetected { attempts: u32 },

    /// The remote replied with something the protocol cannot interpret
    /// (e.g. a non-numeric exit status).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The base64 stream received during a fetch was corrupted.
    #[error("corrupted base64 stream: {0}")]
    Decode(#[from] base64::DecodeError),

    /// An operation was attempted before `connect()` succeeded.
    #[error("not connected")]
    NotConnected,

    /// The transport workers have stopped; the link is gone.
    #[error("link closed")]
    LinkClosed,

    /// Failure on the physical channel.
    #[error(transparent)]
    Port(#[from] PortError),

    /// Local file I/O failure (put/fetch side).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }
}
