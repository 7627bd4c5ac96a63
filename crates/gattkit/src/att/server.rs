//! The ATT request/response state machine
//!
//! One [`AttServer`] exists per connection. It owns the negotiated MTU, the
//! link security level, and the per-connection Client Characteristic
//! Configuration values, and translates each inbound request PDU into a
//! response against the shared attribute database. Characteristic reads,
//! writes, and subscription changes are delegated through [`AttHandler`] to
//! the connection runtime.

use super::constants::*;
use super::database::{Attribute, AttributeDatabase, AttributeKind};
use super::error::{error_response, ErrorCode};
use super::pdu::{read_handle_range, PduWriter};
use super::SecurityLevel;
use crate::gatt::{Characteristic, Properties};
use crate::uuid::Uuid;
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::Arc;

/// The callback seam between the protocol engine and the connection runtime.
pub trait AttHandler {
    /// Invokes the characteristic's read handler with a reply bounded by
    /// `maxlen`, returning the reply bytes and a status code. The handler is
    /// responsible for applying `offset`.
    fn read_char(&mut self, ch: &Arc<Characteristic>, maxlen: usize, offset: usize)
        -> (Vec<u8>, u8);

    /// Invokes the characteristic's write handler, returning its status.
    fn write_char(&mut self, ch: &Arc<Characteristic>, data: &[u8], no_response: bool) -> u8;

    /// Begins notifications for the characteristic with per-notification
    /// capacity `maxlen`. Idempotent per characteristic.
    fn start_notify(&mut self, ch: &Arc<Characteristic>, maxlen: usize);

    /// Ends notifications for the characteristic. Idempotent.
    fn stop_notify(&mut self, ch: &Arc<Characteristic>);
}

/// Per-connection ATT protocol engine.
pub struct AttServer {
    db: Arc<AttributeDatabase>,
    mtu: u16,
    security: SecurityLevel,
    // Per-connection CCC values, keyed by descriptor handle.
    ccc: HashMap<u16, u16>,
}

impl AttServer {
    pub fn new(db: Arc<AttributeDatabase>) -> Self {
        AttServer {
            db,
            mtu: ATT_DEFAULT_MTU,
            security: SecurityLevel::Low,
            ccc: HashMap::new(),
        }
    }

    /// The negotiated MTU for this connection.
    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub fn security(&self) -> SecurityLevel {
        self.security
    }

    /// Updates the link security level, normally on an encryption change
    /// event from the transport.
    pub fn set_security(&mut self, level: SecurityLevel) {
        self.security = level;
    }

    /// Dispatches one request PDU and returns the response to send, if any.
    /// Write commands are fire-and-forget and produce no response.
    pub fn handle_request(&mut self, pdu: &[u8], handler: &mut dyn AttHandler) -> Option<Vec<u8>> {
        let (&opcode, req) = pdu.split_first()?;
        trace!("ATT request opcode {:#04x} ({} bytes)", opcode, pdu.len());

        let resp = match opcode {
            ATT_EXCHANGE_MTU_REQ => self.handle_mtu(req),
            ATT_FIND_INFO_REQ => self.handle_find_info(req),
            ATT_FIND_BY_TYPE_VALUE_REQ => self.handle_find_by_type_value(req),
            ATT_READ_BY_TYPE_REQ => self.handle_read_by_type(req),
            ATT_READ_REQ | ATT_READ_BLOB_REQ => self.handle_read(opcode, req, handler),
            ATT_READ_BY_GROUP_TYPE_REQ => self.handle_read_by_group(req),
            ATT_WRITE_REQ | ATT_WRITE_CMD => return self.handle_write(opcode, req, handler),
            _ => {
                debug!("unsupported ATT opcode {:#04x}", opcode);
                error_response(opcode, 0x0000, ErrorCode::RequestNotSupported)
            }
        };
        Some(resp)
    }

    /// Exchange MTU (0x02). The clamp floor is mandatory; the rest of the
    /// server trusts MTU >= 23 when sizing response headers.
    fn handle_mtu(&mut self, b: &[u8]) -> Vec<u8> {
        if b.len() < 2 {
            return error_response(ATT_EXCHANGE_MTU_REQ, 0x0000, ErrorCode::InvalidPdu);
        }
        let client_mtu = u16::from_le_bytes([b[0], b[1]]);
        self.mtu = client_mtu.clamp(ATT_DEFAULT_MTU, ATT_MAX_MTU);
        vec![ATT_EXCHANGE_MTU_RSP, self.mtu as u8, (self.mtu >> 8) as u8]
    }

    /// Find Information (0x04): handle/UUID pairs for every attribute in the
    /// range. The first pair fixes the format byte; a UUID of the other
    /// length terminates the batch.
    fn handle_find_info(&mut self, b: &[u8]) -> Vec<u8> {
        let Some((start, end)) = read_handle_range(b) else {
            return error_response(ATT_FIND_INFO_REQ, 0x0000, ErrorCode::InvalidPdu);
        };

        let mut w = PduWriter::new(self.mtu);
        w.write_byte_fit(ATT_FIND_INFO_RSP);
        let mut uuid_len = None;
        for attr in self.db.subrange(start, end) {
            // Declarations report their declaration UUID; value and
            // descriptor records report their own.
            let uuid = match attr.kind {
                AttributeKind::Service => Uuid::uuid16(PRIMARY_SERVICE_UUID),
                AttributeKind::IncludedService => Uuid::uuid16(INCLUDE_UUID),
                AttributeKind::Characteristic => Uuid::uuid16(CHARACTERISTIC_UUID),
                AttributeKind::CharacteristicValue | AttributeKind::Descriptor => attr.uuid,
            };

            let expected = *uuid_len.get_or_insert_with(|| {
                w.write_byte_fit(if uuid.len() == 2 {
                    ATT_FIND_INFO_RSP_FORMAT_16BIT
                } else {
                    ATT_FIND_INFO_RSP_FORMAT_128BIT
                });
                uuid.len()
            });
            if uuid.len() != expected {
                break;
            }

            w.chunk();
            w.write_u16_fit(attr.handle);
            w.write_uuid_fit(&uuid);
            if !w.commit() {
                break;
            }
        }

        if uuid_len.is_none() {
            return error_response(ATT_FIND_INFO_REQ, start, ErrorCode::AttributeNotFound);
        }
        w.bytes()
    }

    /// Find By Type Value (0x06). Only the Primary Service discovery variant
    /// is supported: one start/end handle pair per matching primary service.
    fn handle_find_by_type_value(&mut self, b: &[u8]) -> Vec<u8> {
        let Some((start, end)) = read_handle_range(b) else {
            return error_response(ATT_FIND_BY_TYPE_VALUE_REQ, 0x0000, ErrorCode::InvalidPdu);
        };
        if b.len() < 6 {
            return error_response(ATT_FIND_BY_TYPE_VALUE_REQ, 0x0000, ErrorCode::InvalidPdu);
        }

        let attr_type = u16::from_le_bytes([b[4], b[5]]);
        if attr_type != PRIMARY_SERVICE_UUID {
            return error_response(ATT_FIND_BY_TYPE_VALUE_REQ, start, ErrorCode::AttributeNotFound);
        }
        let Some(uuid) = Uuid::from_le_slice(&b[6..]) else {
            return error_response(ATT_FIND_BY_TYPE_VALUE_REQ, start, ErrorCode::AttributeNotFound);
        };

        let mut w = PduWriter::new(self.mtu);
        w.write_byte_fit(ATT_FIND_BY_TYPE_VALUE_RSP);

        let mut wrote = false;
        for attr in self.db.subrange(start, end) {
            if !attr.is_primary_service(&uuid) {
                continue;
            }
            w.chunk();
            w.write_u16_fit(attr.start_handle);
            w.write_u16_fit(attr.end_handle);
            if !w.commit() {
                break;
            }
            wrote = true;
        }

        if !wrote {
            return error_response(ATT_FIND_BY_TYPE_VALUE_REQ, start, ErrorCode::AttributeNotFound);
        }
        w.bytes()
    }

    /// Read By Type (0x08). Type 0x2803 enumerates characteristic
    /// declarations; any other type reads the first matching characteristic
    /// or descriptor value in the range.
    fn handle_read_by_type(&mut self, b: &[u8]) -> Vec<u8> {
        let Some((start, end)) = read_handle_range(b) else {
            return error_response(ATT_READ_BY_TYPE_REQ, 0x0000, ErrorCode::InvalidPdu);
        };
        let Some(uuid) = Uuid::from_le_slice(&b[4..]) else {
            return error_response(ATT_READ_BY_TYPE_REQ, start, ErrorCode::InvalidPdu);
        };
        let db = Arc::clone(&self.db);

        if uuid == Uuid::uuid16(CHARACTERISTIC_UUID) {
            let mut w = PduWriter::new(self.mtu);
            w.write_byte_fit(ATT_READ_BY_TYPE_RSP);
            let mut uuid_len = None;
            for attr in db.subrange(start, end) {
                if attr.kind != AttributeKind::Characteristic {
                    continue;
                }
                let expected = *uuid_len.get_or_insert_with(|| {
                    w.write_byte_fit(attr.uuid.len() as u8 + 5);
                    attr.uuid.len()
                });
                if attr.uuid.len() != expected {
                    break;
                }
                w.chunk();
                w.write_u16_fit(attr.start_handle);
                w.write_byte_fit(attr.props.0);
                w.write_u16_fit(attr.value_handle);
                w.write_uuid_fit(&attr.uuid);
                if !w.commit() {
                    break;
                }
            }
            if uuid_len.is_none() {
                return error_response(ATT_READ_BY_TYPE_REQ, start, ErrorCode::AttributeNotFound);
            }
            return w.bytes();
        }

        // First matching characteristic or descriptor value in range.
        let mut found: Option<(u16, Properties)> = None;
        for attr in db.subrange(start, end) {
            if attr.is_characteristic(&uuid) {
                found = Some((attr.value_handle, attr.secure));
                break;
            }
            if attr.is_descriptor(&uuid) {
                found = Some((attr.handle, attr.secure));
                break;
            }
        }

        let Some((value_handle, secure)) = found else {
            return error_response(ATT_READ_BY_TYPE_REQ, start, ErrorCode::AttributeNotFound);
        };
        if secure.can_read() && self.security == SecurityLevel::Low {
            return error_response(
                ATT_READ_BY_TYPE_REQ,
                start,
                ErrorCode::InsufficientAuthentication,
            );
        }

        let value = match db.at(value_handle) {
            Some(attr) if attr.is_ccc() => self.ccc_value(attr.handle).to_le_bytes().to_vec(),
            Some(attr) => attr.value.clone().unwrap_or_default(),
            None => {
                return error_response(ATT_READ_BY_TYPE_REQ, start, ErrorCode::AttributeNotFound)
            }
        };

        let mut w = PduWriter::new(self.mtu);
        // Header: opcode, length byte, handle.
        let datalen = w.writeable(4, &value);
        w.write_byte_fit(ATT_READ_BY_TYPE_RSP);
        w.write_byte_fit(datalen as u8 + 2);
        w.write_u16_fit(value_handle);
        w.write_fit(&value);
        w.bytes()
    }

    /// Read (0x0A) / Read Blob (0x0C), dispatched by record kind.
    fn handle_read(&mut self, opcode: u8, b: &[u8], handler: &mut dyn AttHandler) -> Vec<u8> {
        if b.len() < 2 || (opcode == ATT_READ_BLOB_REQ && b.len() < 4) {
            return error_response(opcode, 0x0000, ErrorCode::InvalidPdu);
        }
        let handle = u16::from_le_bytes([b[0], b[1]]);
        let mut offset: u16 = if opcode == ATT_READ_BLOB_REQ {
            u16::from_le_bytes([b[2], b[3]])
        } else {
            0
        };
        let resp_opcode = opcode | 0x01;
        let db = Arc::clone(&self.db);

        let Some(attr) = db.at(handle) else {
            return error_response(opcode, handle, ErrorCode::InvalidHandle);
        };

        let mut w = PduWriter::new(self.mtu);
        w.write_byte_fit(resp_opcode);
        w.chunk();

        match attr.kind {
            AttributeKind::Service | AttributeKind::IncludedService => {
                w.write_uuid_fit(&attr.uuid);
            }
            AttributeKind::Characteristic => {
                w.write_byte_fit(attr.props.0);
                w.write_u16_fit(attr.value_handle);
                w.write_uuid_fit(&attr.uuid);
            }
            AttributeKind::CharacteristicValue | AttributeKind::Descriptor => {
                // Permission and security checks run against the owning
                // characteristic for value attributes and against the record
                // itself for descriptors.
                let (props, secure) = if attr.kind == AttributeKind::CharacteristicValue {
                    match db.characteristic_for(attr) {
                        Some(ch) => (ch.props, ch.secure),
                        None => (attr.props, attr.secure),
                    }
                } else {
                    (attr.props, attr.secure)
                };
                if !props.can_read() {
                    return error_response(opcode, handle, ErrorCode::ReadNotPermitted);
                }
                if secure.can_read() && self.security == SecurityLevel::Low {
                    return error_response(opcode, handle, ErrorCode::InsufficientAuthentication);
                }

                if attr.is_ccc() {
                    let v = self.ccc_value(attr.handle).to_le_bytes();
                    w.write_fit(&v);
                } else if let Some(value) = &attr.value {
                    w.write_fit(value);
                } else {
                    // Dynamic value: ask the connection runtime. The handler
                    // has already applied the offset.
                    let ch = match db.characteristic_for(attr) {
                        Some(ch) => Arc::clone(ch),
                        None => return error_response(opcode, handle, ErrorCode::Unlikely),
                    };
                    let (data, status) =
                        handler.read_char(&ch, self.mtu as usize - 1, offset as usize);
                    if status != 0 {
                        return error_response(opcode, handle, ErrorCode::from(status));
                    }
                    w.write_fit(&data);
                    offset = 0;
                }
            }
        }

        if !w.chunk_seek(offset) {
            return error_response(opcode, handle, ErrorCode::InvalidOffset);
        }
        w.commit_fit();
        w.bytes()
    }

    /// Read By Group Type (0x10). Only Primary Service and Include groups
    /// are defined; anything else is an unsupported group type.
    fn handle_read_by_group(&mut self, b: &[u8]) -> Vec<u8> {
        let Some((start, end)) = read_handle_range(b) else {
            return error_response(ATT_READ_BY_GROUP_TYPE_REQ, 0x0000, ErrorCode::InvalidPdu);
        };
        let Some(uuid) = Uuid::from_le_slice(&b[4..]) else {
            return error_response(ATT_READ_BY_GROUP_TYPE_REQ, start, ErrorCode::InvalidPdu);
        };

        let kind = if uuid == Uuid::uuid16(PRIMARY_SERVICE_UUID) {
            AttributeKind::Service
        } else if uuid == Uuid::uuid16(INCLUDE_UUID) {
            AttributeKind::IncludedService
        } else {
            return error_response(
                ATT_READ_BY_GROUP_TYPE_REQ,
                start,
                ErrorCode::UnsupportedGroupType,
            );
        };

        let mut w = PduWriter::new(self.mtu);
        w.write_byte_fit(ATT_READ_BY_GROUP_TYPE_RSP);
        let mut uuid_len = None;
        for attr in self.db.subrange(start, end) {
            if attr.kind != kind {
                continue;
            }
            let expected = *uuid_len.get_or_insert_with(|| {
                w.write_byte_fit(attr.uuid.len() as u8 + 4);
                attr.uuid.len()
            });
            if attr.uuid.len() != expected {
                break;
            }
            w.chunk();
            w.write_u16_fit(attr.start_handle);
            w.write_u16_fit(attr.end_handle);
            w.write_uuid_fit(&attr.uuid);
            if !w.commit() {
                break;
            }
        }
        if uuid_len.is_none() {
            return error_response(ATT_READ_BY_GROUP_TYPE_REQ, start, ErrorCode::AttributeNotFound);
        }
        w.bytes()
    }

    /// Write (0x12) / Write Command (0x52). Commands are fire-and-forget:
    /// they produce no response, not even on error.
    fn handle_write(
        &mut self,
        opcode: u8,
        b: &[u8],
        handler: &mut dyn AttHandler,
    ) -> Option<Vec<u8>> {
        let no_response = opcode == ATT_WRITE_CMD;
        let reply = |r: Vec<u8>| if no_response { None } else { Some(r) };

        if b.len() < 2 {
            return reply(error_response(opcode, 0x0000, ErrorCode::InvalidPdu));
        }
        let handle = u16::from_le_bytes([b[0], b[1]]);
        let data = &b[2..];
        let db = Arc::clone(&self.db);

        let Some(attr) = db.at(handle) else {
            return reply(error_response(opcode, handle, ErrorCode::InvalidHandle));
        };

        // A write to the value attribute is governed by its characteristic's
        // declaration; writes naming the declaration handle resolve to the
        // same characteristic.
        let target: &Attribute = if attr.kind == AttributeKind::CharacteristicValue {
            match attr.decl_index.and_then(|i| db.at_index(i)) {
                Some(decl) => decl,
                None => return reply(error_response(opcode, handle, ErrorCode::Unlikely)),
            }
        } else {
            attr
        };

        let flag = if no_response {
            Properties::WRITE_WITHOUT_RESPONSE
        } else {
            Properties::WRITE
        };
        if !target.props.contains(flag) {
            return reply(error_response(opcode, handle, ErrorCode::WriteNotPermitted));
        }
        if target.secure.contains(flag) && self.security == SecurityLevel::Low {
            return reply(error_response(opcode, handle, ErrorCode::InsufficientAuthentication));
        }

        if target.is_ccc() {
            // Client Characteristic Configuration: flip the notifier for the
            // owning characteristic.
            if data.len() != 2 {
                return reply(error_response(
                    opcode,
                    handle,
                    ErrorCode::InvalidAttributeValueLength,
                ));
            }
            let ccc = u16::from_le_bytes([data[0], data[1]]);
            let ch = match db.characteristic_for(target) {
                Some(ch) => Arc::clone(ch),
                None => return reply(error_response(opcode, handle, ErrorCode::Unlikely)),
            };
            self.ccc.insert(target.handle, ccc);

            if ccc & CCC_NOTIFY_FLAG != 0 {
                handler.start_notify(&ch, (self.mtu - ATT_NOTIFICATION_HEADER_SIZE) as usize);
            } else {
                handler.stop_notify(&ch);
            }
            return reply(vec![ATT_WRITE_RSP]);
        }

        let ch = match db.characteristic_for(target) {
            Some(ch) => Arc::clone(ch),
            None => return reply(error_response(opcode, handle, ErrorCode::WriteNotPermitted)),
        };
        let status = handler.write_char(&ch, data, no_response);
        if status != 0 {
            return reply(error_response(opcode, handle, ErrorCode::from(status)));
        }
        reply(vec![ATT_WRITE_RSP])
    }

    fn ccc_value(&self, handle: u16) -> u16 {
        self.ccc.get(&handle).copied().unwrap_or(0)
    }
}
