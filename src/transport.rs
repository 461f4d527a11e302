//! Link transport: two independent workers moving bytes between the
//! physical channel and a pair of queues.
//!
//! The reader polls the port at a fixed interval and pushes whatever bytes
//! are available onto the inbound queue as one unit. The writer drains the
//! outbound queue one message at a time, splitting each payload into chunks
//! no larger than the configured payload size; a message is always flushed
//! completely before the next one is dequeued, so outbound messages never
//! interleave at the byte level.
//!
//! Both workers observe a shared stop signal on every cycle and exit within
//! one poll interval of it being set. [`LinkTransport::shutdown`] waits for
//! both to terminate before the port is released.

use crate::error::ConnectionError;
use crate::port::{LinkPort, PortError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, trace};

/// Size of the reader's scratch buffer per poll tick.
const READ_BUF_SIZE: usize = 4096;

/// One unit of outbound data. Ownership transfers to the writer queue on
/// enqueue; the writer consumes it exactly once.
#[derive(Debug)]
pub struct OutboundMessage {
    payload: Vec<u8>,
    is_raw: bool,
}

impl OutboundMessage {
    /// A textual message (commands, credentials, sentinel lines).
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: text.into().into_bytes(),
            is_raw: false,
        }
    }

    /// A raw byte message (control characters, binary payloads).
    pub fn raw(payload: Vec<u8>) -> Self {
        Self {
            payload,
            is_raw: true,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_raw(&self) -> bool {
        self.is_raw
    }
}

/// Handle to the two running workers and their queues.
///
/// Owned by exactly one session; dropping without `shutdown` aborts nothing,
/// so sessions must call [`shutdown`](Self::shutdown) on close.
pub struct LinkTransport {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    stop: watch::Sender<bool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl LinkTransport {
    /// Take ownership of the port and start the reader/writer workers.
    pub fn start(port: Box<dyn LinkPort>, poll_interval: Duration, payload_size: usize) -> Self {
        let port = Arc::new(Mutex::new(port));
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let reader = tokio::spawn(reader_worker(
            Arc::clone(&port),
            in_tx,
            stop_rx.clone(),
            poll_interval,
        ));
        let writer = tokio::spawn(writer_worker(port, out_rx, stop_rx, payload_size));

        Self {
            outbound: out_tx,
            inbound: in_rx,
            stop: stop_tx,
            reader,
            writer,
        }
    }

    /// Enqueue a message for the writer worker.
    pub fn send(&self, message: OutboundMessage) -> Result<(), ConnectionError> {
        self.outbound
            .send(message)
            .map_err(|_| ConnectionError::LinkClosed)
    }

    /// Receive the next inbound byte unit. `None` means the reader worker
    /// has stopped and the link is gone.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }

    /// Signal both workers to stop and wait until they have exited.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.reader.await;
        let _ = self.writer.await;
    }
}

async fn reader_worker(
    port: Arc<Mutex<Box<dyn LinkPort>>>,
    inbound: mpsc::UnboundedSender<Vec<u8>>,
    stop: watch::Receiver<bool>,
    poll_interval: Duration,
) {
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        if *stop.borrow() {
            break;
        }
        let result = port.lock().read_available(&mut buf);
        match result {
            Ok(0) => {}
            Ok(n) => {
                trace!(data = %String::from_utf8_lossy(&buf[..n]).escape_debug(), "<<<<");
                if inbound.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) => {
                error!(error = %e, "link read failed, stopping reader");
                break;
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}

async fn writer_worker(
    port: Arc<Mutex<Box<dyn LinkPort>>>,
    mut outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    mut stop: watch::Receiver<bool>,
    payload_size: usize,
) {
    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            message = outbound.recv() => {
                let Some(message) = message else { break };
                if message.is_raw() {
                    trace!(bytes = message.payload().len(), ">>>> (raw)");
                } else {
                    trace!(data = %String::from_utf8_lossy(message.payload()).escape_debug(), ">>>>");
                }
                if let Err(e) = write_chunked(&port, message.payload(), payload_size) {
                    error!(error = %e, "link write failed, stopping writer");
                    break;
                }
            }
        }
    }
}

/// Write one payload as ordered chunks of at most `payload_size` bytes.
fn write_chunked(
    port: &Arc<Mutex<Box<dyn LinkPort>>>,
    payload: &[u8],
    payload_size: usize,
) -> Result<(), PortError> {
    for chunk in payload.chunks(payload_size.max(1)) {
        let mut offset = 0;
        while offset < chunk.len() {
            let n = port.lock().write_bytes(&chunk[offset..])?;
            if n == 0 {
                return Err(PortError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "link accepted no bytes",
                )));
            }
            offset += n;
        }
    }
    Ok(())
}
