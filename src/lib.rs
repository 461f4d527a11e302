//! serial-shell
//!
//! Remote command execution and file transfer over a raw serial link. The
//! other end is assumed to be a line-oriented POSIX shell behind an optional
//! login prompt; this crate builds a reliable request/response protocol on
//! top of that unframed, echo-distorted byte stream.
//!
//! # Modules
//!
//! - `port`: physical link abstraction (serial device or mock)
//! - `transport`: reader/writer workers and the inbound/outbound queues
//! - `line`: line reassembly, escape stripping, legacy echo reconciliation
//! - `session`: shell-state detection and session bookkeeping
//! - `connection`: the protocol engine (`connect`/`execute`/`put`/`fetch`/`close`)
//! - `transfer`: chunked base64 file transfer
//! - `codec`: streaming base64 decoder for the fetch path
//! - `config`: session configuration (TOML + env overrides)
//! - `error`: typed failure taxonomy

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod line;
pub mod port;
pub mod session;
pub mod transfer;
pub mod transport;

// Re-export the commonly used types.
pub use codec::Base64StreamDecoder;
pub use config::{ConfigError, ConnectionConfig};
pub use connection::{CommandOutput, RemoteConnection, SerialConnection};
pub use error::ConnectionError;
pub use line::{EchoOutcome, EchoReconciler, LineDecoder};
pub use port::{LinkPort, MockLinkPort, PortError, SerialLinkPort};
pub use session::{classify_line, SessionState, ShellState};
pub use transport::{LinkTransport, OutboundMessage};
