//! The L2CAP boundary consumed by the GATT core
//!
//! The transport collaborator delivers, per connection, a bidirectional
//! stream of ATT PDUs already stripped of the L2CAP header (channel 0x0004).
//! The read half is owned by the connection's serve loop; the write half is
//! shared between the serve loop and notifier tasks and must serialize
//! concurrent writers internally.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;
use thiserror::Error;

pub use crate::att::constants::ATT_CID;

/// Errors on an ATT bearer.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The connection is gone; the owning loop should tear down quietly.
    #[error("channel closed")]
    Closed,

    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The read half of an ATT bearer. One blocking call yields one PDU.
pub trait PduReader: Send {
    fn read_pdu(&mut self) -> Result<Vec<u8>, ChannelError>;
}

/// The write half of an ATT bearer, shared between the serve loop and
/// notifier tasks. Implementations serialize concurrent writers; a PDU is
/// delivered whole or not at all.
pub trait PduWriter: Send + Sync {
    fn write_pdu(&self, pdu: &[u8]) -> Result<(), ChannelError>;
}

/// An in-memory one-directional PDU queue, used by the tests, the examples,
/// and any transport that already frames PDUs on its own thread.
pub fn in_memory_channel() -> (InMemoryWriter, InMemoryReader) {
    let (tx, rx) = channel();
    (InMemoryWriter { tx: Mutex::new(tx) }, InMemoryReader { rx })
}

pub struct InMemoryWriter {
    tx: Mutex<Sender<Vec<u8>>>,
}

impl PduWriter for InMemoryWriter {
    fn write_pdu(&self, pdu: &[u8]) -> Result<(), ChannelError> {
        let tx = self.tx.lock().map_err(|_| ChannelError::Closed)?;
        tx.send(pdu.to_vec()).map_err(|_| ChannelError::Closed)
    }
}

pub struct InMemoryReader {
    rx: Receiver<Vec<u8>>,
}

impl PduReader for InMemoryReader {
    fn read_pdu(&mut self) -> Result<Vec<u8>, ChannelError> {
        self.rx.recv().map_err(|_| ChannelError::Closed)
    }
}
