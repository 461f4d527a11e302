//! Physical link abstraction.
//!
//! The session engine never talks to `serialport` directly; it goes through
//! the [`LinkPort`] trait so the device can be swapped for a mock in tests.

pub mod error;
pub mod mock;
pub mod serial;
pub mod traits;

pub use error::PortError;
pub use mock::MockLinkPort;
pub use serial::SerialLinkPort;
pub use traits::LinkPort;
