//! The push channel handed to notify handlers

use crate::att::constants::ATT_HANDLE_VALUE_NTF;
use crate::error::Error;
use crate::l2cap::PduWriter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

// Minimum gap between consecutive notification PDUs. Link-layer and
// controller buffers overrun without pacing.
const NOTIFY_MIN_INTERVAL: Duration = Duration::from_millis(50);

/// Sends characteristic value notifications to a subscribed central.
///
/// A notifier is born when the central enables notifications through the
/// Client Characteristic Configuration descriptor and lives until the
/// central disables them, the connection closes, or the server shuts down.
pub struct Notifier {
    writer: Arc<dyn PduWriter>,
    value_handle: u16,
    cap: usize,
    done: Arc<AtomicBool>,
    last_write: Mutex<Instant>,
}

impl Notifier {
    pub(crate) fn new(
        writer: Arc<dyn PduWriter>,
        value_handle: u16,
        cap: usize,
        done: Arc<AtomicBool>,
    ) -> Self {
        Notifier {
            writer,
            value_handle,
            cap,
            done,
            last_write: Mutex::new(Instant::now()),
        }
    }

    /// Sends one notification PDU carrying `data`, truncated to the
    /// per-notification capacity. Consecutive sends are paced. Fails once
    /// the central has stopped notifications.
    pub fn write(&self, data: &[u8]) -> Result<usize, Error> {
        if self.done() {
            return Err(Error::NotifierStopped);
        }

        // Serializes writes on this notifier and enforces the inter-PDU gap.
        let mut last = match self.last_write.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let since = last.elapsed();
        if since < NOTIFY_MIN_INTERVAL {
            thread::sleep(NOTIFY_MIN_INTERVAL - since);
        }

        if self.done() {
            return Err(Error::NotifierStopped);
        }

        let n = data.len().min(self.cap);
        let mut pdu = Vec::with_capacity(3 + n);
        pdu.push(ATT_HANDLE_VALUE_NTF);
        pdu.extend_from_slice(&self.value_handle.to_le_bytes());
        pdu.extend_from_slice(&data[..n]);
        self.writer.write_pdu(&pdu)?;
        *last = Instant::now();
        Ok(n)
    }

    /// The maximum number of bytes one notification can carry (MTU - 3 at
    /// the time the central subscribed).
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Whether the central has requested not to receive any more
    /// notifications.
    pub fn done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}
