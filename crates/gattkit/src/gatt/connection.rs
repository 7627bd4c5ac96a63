//! The per-connection runtime
//!
//! One [`Connection`] exists per remote central. It owns the subscription
//! map and bridges the ATT server's callback seam to the user-registered
//! characteristic handlers. The serve loop reads one request PDU at a time,
//! dispatches it, and writes the response back; notify handlers run on their
//! own threads and share the write half of the channel.

use crate::att::{AttHandler, AttServer};
use crate::gap::{BdAddr, Role};
use crate::gatt::types::{ReadRequest, ReadResponseWriter, Request};
use crate::gatt::{Characteristic, Notifier};
use crate::l2cap::{PduReader, PduWriter};
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// A connection from a remote central.
pub struct Connection {
    local: BdAddr,
    remote: BdAddr,
    peer_role: Role,
    writer: Arc<dyn PduWriter>,
    // Active subscriptions: value handle -> the notifier's done flag. The
    // map is only touched from the connection's own serve loop; notify
    // threads hold just the flag.
    notifiers: HashMap<u16, Arc<AtomicBool>>,
    rssi: Option<i8>,
}

impl Connection {
    pub(crate) fn new(local: BdAddr, remote: BdAddr, writer: Arc<dyn PduWriter>) -> Self {
        Connection {
            local,
            remote,
            peer_role: Role::Central,
            writer,
            notifiers: HashMap::new(),
            rssi: None,
        }
    }

    /// Address of the local device (the peripheral).
    pub fn local_addr(&self) -> BdAddr {
        self.local
    }

    /// Address of the connected central.
    pub fn remote_addr(&self) -> BdAddr {
        self.remote
    }

    /// Role of the remote peer. Accepted connections are from centrals.
    pub fn peer_role(&self) -> Role {
        self.peer_role
    }

    /// The last RSSI measurement, if any has been received.
    pub fn rssi(&self) -> Option<i8> {
        self.rssi
    }

    pub(crate) fn set_rssi(&mut self, rssi: i8) {
        self.rssi = Some(rssi);
    }

    /// Serves ATT requests until the channel closes, then tears down.
    /// Responses go out in the exact order requests came in.
    pub(crate) fn serve(&mut self, reader: &mut dyn PduReader, att: &mut AttServer) {
        loop {
            let pdu = match reader.read_pdu() {
                Ok(pdu) => pdu,
                Err(e) => {
                    debug!("central {}: channel closed: {}", self.remote, e);
                    break;
                }
            };
            if let Some(resp) = att.handle_request(&pdu, self) {
                if let Err(e) = self.writer.write_pdu(&resp) {
                    debug!("central {}: write failed: {}", self.remote, e);
                    break;
                }
            }
        }
        self.teardown();
    }

    // Stops every notifier and clears the subscription map. Safe to call
    // more than once.
    fn teardown(&mut self) {
        for (handle, done) in self.notifiers.drain() {
            trace!("central {}: stopping notifier for handle {}", self.remote, handle);
            done.store(true, Ordering::SeqCst);
        }
    }

    fn request_for(&self, ch: &Arc<Characteristic>) -> Request {
        Request {
            central: self.remote,
            service: ch.service_uuid,
            characteristic: ch.uuid,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl AttHandler for Connection {
    fn read_char(
        &mut self,
        ch: &Arc<Characteristic>,
        maxlen: usize,
        offset: usize,
    ) -> (Vec<u8>, u8) {
        let mut resp = ReadResponseWriter::new(maxlen);
        if let Some(handler) = &ch.rhandler {
            let req = ReadRequest {
                request: self.request_for(ch),
                cap: maxlen,
                offset,
            };
            handler.serve_read(&req, &mut resp);
        }
        resp.into_parts()
    }

    fn write_char(&mut self, ch: &Arc<Characteristic>, data: &[u8], _no_response: bool) -> u8 {
        match &ch.whandler {
            Some(handler) => handler.serve_write(&self.request_for(ch), data),
            None => crate::gatt::types::STATUS_UNEXPECTED_ERROR,
        }
    }

    fn start_notify(&mut self, ch: &Arc<Characteristic>, maxlen: usize) {
        if self.notifiers.contains_key(&ch.value_handle) {
            // Already notifying; CCC rewrites are idempotent.
            return;
        }

        let done = Arc::new(AtomicBool::new(false));
        self.notifiers.insert(ch.value_handle, Arc::clone(&done));

        let notifier = Notifier::new(Arc::clone(&self.writer), ch.value_handle, maxlen, done);
        let req = self.request_for(ch);
        let ch = Arc::clone(ch);
        thread::spawn(move || {
            if let Some(handler) = &ch.nhandler {
                handler.serve_notify(&req, notifier);
            }
        });
    }

    fn stop_notify(&mut self, ch: &Arc<Characteristic>) {
        if let Some(done) = self.notifiers.remove(&ch.value_handle) {
            done.store(true, Ordering::SeqCst);
        }
    }
}
