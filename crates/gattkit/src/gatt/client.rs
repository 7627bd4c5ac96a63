//! GATT client for the central role
//!
//! Issues ATT requests against a remote peripheral over the same bearer
//! abstraction the server side uses. Requests are strictly sequential, as
//! ATT allows one outstanding transaction; responses rendezvous through a
//! channel fed by a demultiplexing reader thread that routes notifications
//! to the registered handler. There are no timeouts at this layer; timeout
//! policy belongs to the caller.

use crate::att::constants::*;
use crate::att::{AttError, ErrorCode};
use crate::error::Error;
use crate::gatt::Properties;
use crate::l2cap::{ChannelError, PduReader, PduWriter};
use crate::uuid::Uuid;
use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, trace, warn};
use std::io::Cursor;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

/// A remote primary service discovered on the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteService {
    pub uuid: Uuid,
    pub start_handle: u16,
    pub end_handle: u16,
}

/// A remote characteristic discovered within a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCharacteristic {
    pub uuid: Uuid,
    pub handle: u16,
    pub value_handle: u16,
    pub properties: Properties,
    /// Last handle belonging to this characteristic, bounding descriptor
    /// discovery.
    pub end_handle: u16,
}

/// A remote descriptor discovered within a characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDescriptor {
    pub uuid: Uuid,
    pub handle: u16,
}

type NotificationHandler = Box<dyn FnMut(u16, &[u8]) + Send>;

/// A GATT client bound to one connection.
pub struct GattClient {
    writer: Arc<dyn PduWriter>,
    responses: Receiver<Vec<u8>>,
    mtu: u16,
    notification_handler: Arc<Mutex<Option<NotificationHandler>>>,
}

impl GattClient {
    /// Wraps a connection's bearer. A reader thread is spawned to split
    /// notifications from responses; it exits when the channel closes.
    pub fn new(mut reader: Box<dyn PduReader>, writer: Arc<dyn PduWriter>) -> Self {
        let (tx, rx): (Sender<Vec<u8>>, Receiver<Vec<u8>>) = channel();
        let handler: Arc<Mutex<Option<NotificationHandler>>> = Arc::new(Mutex::new(None));
        let handler_slot = Arc::clone(&handler);

        thread::spawn(move || loop {
            let pdu = match reader.read_pdu() {
                Ok(pdu) => pdu,
                Err(_) => {
                    // Dropping the sender surfaces a closed-channel error to
                    // any pending request.
                    debug!("gatt client reader exiting");
                    return;
                }
            };
            if pdu.first() == Some(&ATT_HANDLE_VALUE_NTF) {
                if pdu.len() < 3 {
                    warn!("short notification PDU ({} bytes)", pdu.len());
                    continue;
                }
                let handle = u16::from_le_bytes([pdu[1], pdu[2]]);
                if let Ok(mut slot) = handler_slot.lock() {
                    if let Some(f) = slot.as_mut() {
                        f(handle, &pdu[3..]);
                    }
                }
                continue;
            }
            if tx.send(pdu).is_err() {
                return;
            }
        });

        GattClient {
            writer,
            responses: rx,
            mtu: ATT_DEFAULT_MTU,
            notification_handler: handler,
        }
    }

    /// Registers the callback invoked for every Handle Value Notification,
    /// with the value handle and the notified bytes.
    pub fn on_notification<F: FnMut(u16, &[u8]) + Send + 'static>(&self, f: F) {
        if let Ok(mut slot) = self.notification_handler.lock() {
            *slot = Some(Box::new(f));
        }
    }

    /// The ATT MTU agreed with the peripheral.
    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Exchanges MTU with the peripheral and returns the agreed value.
    pub fn exchange_mtu(&mut self, client_mtu: u16) -> Result<u16, Error> {
        let mut req = vec![ATT_EXCHANGE_MTU_REQ];
        req.extend_from_slice(&client_mtu.to_le_bytes());
        let resp = self.request(&req, ATT_EXCHANGE_MTU_RSP)?;
        if resp.len() < 3 {
            return Err(AttError::MalformedPdu.into());
        }
        let server_mtu = u16::from_le_bytes([resp[1], resp[2]]);
        self.mtu = server_mtu.min(client_mtu).max(ATT_DEFAULT_MTU);
        Ok(self.mtu)
    }

    /// Discovers all primary services with Read By Group Type requests.
    pub fn discover_services(&mut self) -> Result<Vec<RemoteService>, Error> {
        let mut services = Vec::new();
        let mut start = ATT_HANDLE_MIN;

        loop {
            let mut req = vec![ATT_READ_BY_GROUP_TYPE_REQ];
            req.extend_from_slice(&start.to_le_bytes());
            req.extend_from_slice(&ATT_HANDLE_MAX.to_le_bytes());
            req.extend_from_slice(&PRIMARY_SERVICE_UUID.to_le_bytes());

            let resp = match self.request(&req, ATT_READ_BY_GROUP_TYPE_RSP) {
                Ok(resp) => resp,
                Err(Error::Att(AttError::Protocol { code: ErrorCode::AttributeNotFound, .. })) => {
                    break
                }
                Err(e) => return Err(e),
            };
            if resp.len() < 2 {
                return Err(AttError::MalformedPdu.into());
            }

            let len = resp[1] as usize;
            if len < 6 {
                return Err(AttError::MalformedPdu.into());
            }
            let mut done = false;
            for rec in resp[2..].chunks_exact(len) {
                let s = u16::from_le_bytes([rec[0], rec[1]]);
                let e = u16::from_le_bytes([rec[2], rec[3]]);
                let uuid = Uuid::from_le_slice(&rec[4..])
                    .ok_or(AttError::InvalidUuidLength(len - 4))?;
                services.push(RemoteService {
                    uuid,
                    start_handle: s,
                    end_handle: e,
                });
                if e == ATT_HANDLE_MAX {
                    done = true;
                }
            }

            let last_end = services.last().map(|s| s.end_handle).unwrap_or(ATT_HANDLE_MAX);
            if done || last_end == ATT_HANDLE_MAX {
                break;
            }
            start = last_end + 1;
        }
        trace!("discovered {} services", services.len());
        Ok(services)
    }

    /// Finds the primary service with `uuid` using Find By Type Value.
    pub fn find_service(&mut self, uuid: &Uuid) -> Result<Option<RemoteService>, Error> {
        let mut req = vec![ATT_FIND_BY_TYPE_VALUE_REQ];
        req.extend_from_slice(&ATT_HANDLE_MIN.to_le_bytes());
        req.extend_from_slice(&ATT_HANDLE_MAX.to_le_bytes());
        req.extend_from_slice(&PRIMARY_SERVICE_UUID.to_le_bytes());
        req.extend_from_slice(&uuid.to_le_bytes());

        let resp = match self.request(&req, ATT_FIND_BY_TYPE_VALUE_RSP) {
            Ok(resp) => resp,
            Err(Error::Att(AttError::Protocol { code: ErrorCode::AttributeNotFound, .. })) => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };
        if resp.len() < 5 {
            return Err(AttError::MalformedPdu.into());
        }
        Ok(Some(RemoteService {
            uuid: *uuid,
            start_handle: u16::from_le_bytes([resp[1], resp[2]]),
            end_handle: u16::from_le_bytes([resp[3], resp[4]]),
        }))
    }

    /// Discovers the characteristics of a service with Read By Type
    /// requests for the characteristic declaration type.
    pub fn discover_characteristics(
        &mut self,
        service: &RemoteService,
    ) -> Result<Vec<RemoteCharacteristic>, Error> {
        let mut chars: Vec<RemoteCharacteristic> = Vec::new();
        let mut start = service.start_handle;

        loop {
            let mut req = vec![ATT_READ_BY_TYPE_REQ];
            req.extend_from_slice(&start.to_le_bytes());
            req.extend_from_slice(&service.end_handle.to_le_bytes());
            req.extend_from_slice(&CHARACTERISTIC_UUID.to_le_bytes());

            let resp = match self.request(&req, ATT_READ_BY_TYPE_RSP) {
                Ok(resp) => resp,
                Err(Error::Att(AttError::Protocol { code: ErrorCode::AttributeNotFound, .. })) => {
                    break
                }
                Err(e) => return Err(e),
            };
            if resp.len() < 2 {
                return Err(AttError::MalformedPdu.into());
            }
            let len = resp[1] as usize;
            if len < 7 {
                return Err(AttError::MalformedPdu.into());
            }

            let mut last_value = start;
            for rec in resp[2..].chunks_exact(len) {
                let mut cur = Cursor::new(rec);
                let handle = cur.read_u16::<LittleEndian>().map_err(|_| AttError::ShortBuffer)?;
                let props = cur.read_u8().map_err(|_| AttError::ShortBuffer)?;
                let value_handle = cur.read_u16::<LittleEndian>().map_err(|_| AttError::ShortBuffer)?;
                let uuid = Uuid::from_le_slice(&rec[5..len])
                    .ok_or(AttError::InvalidUuidLength(len - 5))?;
                chars.push(RemoteCharacteristic {
                    uuid,
                    handle,
                    value_handle,
                    properties: Properties(props),
                    end_handle: service.end_handle, // patched below
                });
                last_value = value_handle;
            }

            if last_value >= service.end_handle {
                break;
            }
            start = last_value + 1;
        }

        // Each characteristic runs to the next declaration, the last to the
        // service end.
        for i in 0..chars.len() {
            let end = match chars.get(i + 1) {
                Some(next) => next.handle - 1,
                None => service.end_handle,
            };
            chars[i].end_handle = end;
        }
        trace!("discovered {} characteristics", chars.len());
        Ok(chars)
    }

    /// Discovers the descriptors of a characteristic with Find Information
    /// requests over its handle range.
    pub fn discover_descriptors(
        &mut self,
        ch: &RemoteCharacteristic,
    ) -> Result<Vec<RemoteDescriptor>, Error> {
        let mut descriptors = Vec::new();
        if ch.value_handle >= ch.end_handle {
            return Ok(descriptors);
        }
        let mut start = ch.value_handle + 1;

        loop {
            let mut req = vec![ATT_FIND_INFO_REQ];
            req.extend_from_slice(&start.to_le_bytes());
            req.extend_from_slice(&ch.end_handle.to_le_bytes());

            let resp = match self.request(&req, ATT_FIND_INFO_RSP) {
                Ok(resp) => resp,
                Err(Error::Att(AttError::Protocol { code: ErrorCode::AttributeNotFound, .. })) => {
                    break
                }
                Err(e) => return Err(e),
            };
            if resp.len() < 2 {
                return Err(AttError::MalformedPdu.into());
            }
            let pair_len = match resp[1] {
                ATT_FIND_INFO_RSP_FORMAT_16BIT => 4,
                ATT_FIND_INFO_RSP_FORMAT_128BIT => 18,
                _ => return Err(AttError::MalformedPdu.into()),
            };

            let mut last = start;
            for rec in resp[2..].chunks_exact(pair_len) {
                let handle = u16::from_le_bytes([rec[0], rec[1]]);
                let uuid = Uuid::from_le_slice(&rec[2..])
                    .ok_or(AttError::InvalidUuidLength(pair_len - 2))?;
                descriptors.push(RemoteDescriptor { uuid, handle });
                last = handle;
            }

            if last >= ch.end_handle {
                break;
            }
            start = last + 1;
        }
        Ok(descriptors)
    }

    /// Reads an attribute value. Long values are truncated to MTU - 1;
    /// continue with `read_blob` or use `read_long`.
    pub fn read(&mut self, handle: u16) -> Result<Vec<u8>, Error> {
        let mut req = vec![ATT_READ_REQ];
        req.extend_from_slice(&handle.to_le_bytes());
        let resp = self.request(&req, ATT_READ_RSP)?;
        Ok(resp[1..].to_vec())
    }

    /// Reads part of an attribute value starting at `offset`.
    pub fn read_blob(&mut self, handle: u16, offset: u16) -> Result<Vec<u8>, Error> {
        let mut req = vec![ATT_READ_BLOB_REQ];
        req.extend_from_slice(&handle.to_le_bytes());
        req.extend_from_slice(&offset.to_le_bytes());
        let resp = self.request(&req, ATT_READ_BLOB_RSP)?;
        Ok(resp[1..].to_vec())
    }

    /// Reads a complete value, issuing Read Blob requests until a response
    /// comes back short.
    pub fn read_long(&mut self, handle: u16) -> Result<Vec<u8>, Error> {
        let mut value = self.read(handle)?;
        let chunk = self.mtu as usize - 1;
        while value.len() % chunk == 0 && !value.is_empty() {
            match self.read_blob(handle, value.len() as u16) {
                Ok(part) => {
                    let done = part.len() < chunk;
                    value.extend_from_slice(&part);
                    if done {
                        break;
                    }
                }
                Err(Error::Att(AttError::Protocol { code: ErrorCode::InvalidOffset, .. })) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(value)
    }

    /// Writes an attribute value and waits for the response.
    pub fn write(&mut self, handle: u16, data: &[u8]) -> Result<(), Error> {
        let mut req = vec![ATT_WRITE_REQ];
        req.extend_from_slice(&handle.to_le_bytes());
        req.extend_from_slice(data);
        self.request(&req, ATT_WRITE_RSP)?;
        Ok(())
    }

    /// Writes an attribute value without response (Write Command).
    pub fn write_command(&mut self, handle: u16, data: &[u8]) -> Result<(), Error> {
        let mut req = vec![ATT_WRITE_CMD];
        req.extend_from_slice(&handle.to_le_bytes());
        req.extend_from_slice(data);
        self.writer.write_pdu(&req).map_err(Error::Channel)
    }

    /// Subscribes to notifications by writing the characteristic's CCC
    /// descriptor.
    pub fn subscribe(&mut self, cccd_handle: u16) -> Result<(), Error> {
        self.write(cccd_handle, &CCC_NOTIFY_FLAG.to_le_bytes())
    }

    /// Unsubscribes from notifications.
    pub fn unsubscribe(&mut self, cccd_handle: u16) -> Result<(), Error> {
        self.write(cccd_handle, &0u16.to_le_bytes())
    }

    // Sends one request and blocks for its response. An error response PDU
    // is surfaced as AttError::Protocol; a closed channel as ChannelError.
    fn request(&mut self, req: &[u8], expect: u8) -> Result<Vec<u8>, Error> {
        self.writer.write_pdu(req).map_err(Error::Channel)?;
        let resp = self
            .responses
            .recv()
            .map_err(|_| Error::Channel(ChannelError::Closed))?;

        match resp.first() {
            None => Err(AttError::MalformedPdu.into()),
            Some(&ATT_ERROR_RSP) => {
                if resp.len() < 5 {
                    return Err(AttError::MalformedPdu.into());
                }
                Err(AttError::Protocol {
                    opcode: resp[1],
                    handle: u16::from_le_bytes([resp[2], resp[3]]),
                    code: ErrorCode::from(resp[4]),
                }
                .into())
            }
            Some(&op) if op == expect => Ok(resp),
            Some(&op) => Err(AttError::UnexpectedResponse { want: expect, got: op }.into()),
        }
    }
}
