//! Mock link implementation for testing.
//!
//! `MockLinkPort` simulates the byte channel without hardware: tests enqueue
//! bytes to be "received" and inspect everything the code under test wrote.
//! Clones share the same state, so a test can keep a handle while the
//! transport owns another.

use super::error::PortError;
use super::traits::LinkPort;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockLinkState {
    /// Bytes to be returned by subsequent reads.
    read_queue: VecDeque<u8>,
    /// Every write, in order.
    write_log: Vec<Vec<u8>>,
    /// When set, the next I/O call fails.
    fail_next: bool,
}

/// In-memory stand-in for a serial device.
#[derive(Clone, Default)]
pub struct MockLinkPort {
    name: String,
    state: Arc<Mutex<MockLinkState>>,
}

impl MockLinkPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockLinkState::default())),
        }
    }

    /// Enqueue bytes to be returned by subsequent reads.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// All writes observed so far, one entry per `write_bytes` call.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Everything written so far, concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.state.lock().write_log.concat()
    }

    /// Number of bytes still queued for reading.
    pub fn pending_read_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }

    /// Make the next read or write fail with an I/O error.
    pub fn fail_next_io(&self) {
        self.state.lock().fail_next = true;
    }
}

impl LinkPort for MockLinkPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if state.fail_next {
            state.fail_next = false;
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock write failure",
            )));
        }
        state.write_log.push(data.to_vec());
        Ok(data.len())
    }

    fn read_available(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if state.fail_next {
            state.fail_next = false;
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock read failure",
            )));
        }
        let mut n = 0;
        for slot in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MockLinkPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLinkPort")
            .field("name", &self.name)
            .field("pending_read_bytes", &self.pending_read_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_then_read() {
        let mut port = MockLinkPort::new("mock0");
        port.enqueue_read(b"hello");

        let mut buf = [0u8; 16];
        let n = port.read_available(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn idle_read_returns_zero() {
        let mut port = MockLinkPort::new("mock0");
        let mut buf = [0u8; 16];
        assert_eq!(port.read_available(&mut buf).unwrap(), 0);
    }

    #[test]
    fn writes_are_logged_in_order() {
        let mut port = MockLinkPort::new("mock0");
        port.write_bytes(b"one").unwrap();
        port.write_bytes(b"two").unwrap();

        let log = port.write_log();
        assert_eq!(log, vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(port.written_bytes(), b"onetwo");
    }

    #[test]
    fn clones_share_state() {
        let port = MockLinkPort::new("mock0");
        let mut other = port.clone();
        port.enqueue_read(b"xy");

        let mut buf = [0u8; 2];
        assert_eq!(other.read_available(&mut buf).unwrap(), 2);
        assert_eq!(port.pending_read_bytes(), 0);
    }

    #[test]
    fn fail_next_io_fails_once() {
        let mut port = MockLinkPort::new("mock0");
        port.fail_next_io();
        assert!(port.write_bytes(b"x").is_err());
        assert!(port.write_bytes(b"x").is_ok());
    }
}
