//! MTU-bounded serialization of ATT response PDUs
//!
//! Responses that carry a list of uniform records (Find Information, Read By
//! Type, Read By Group Type, ...) are built with [`PduWriter`]: the caller
//! marks the start of a record with `chunk()`, writes its fields, and
//! `commit()`s it. A commit that would exceed the MTU discards the pending
//! record and reports "full", which lets response builders emit exactly as
//! many records as fit.

use crate::uuid::Uuid;

/// An ATT response writer bounded by the connection MTU.
pub struct PduWriter {
    mtu: usize,
    buf: Vec<u8>,
    // Pending record bytes while between chunk() and commit().
    chunk: Option<Vec<u8>>,
}

impl PduWriter {
    pub fn new(mtu: u16) -> Self {
        PduWriter {
            mtu: mtu as usize,
            buf: Vec::with_capacity(mtu as usize),
            chunk: None,
        }
    }

    /// Starts a new record. Panics if a record is already pending; records
    /// never nest.
    pub fn chunk(&mut self) {
        if self.chunk.is_some() {
            panic!("pdu writer: chunk() while a chunk is pending");
        }
        self.chunk = Some(Vec::new());
    }

    /// Commits the pending record if the whole of it fits within the MTU,
    /// discarding it otherwise. Returns whether it fit. Panics if no record
    /// is pending.
    pub fn commit(&mut self) -> bool {
        let chunk = self
            .chunk
            .take()
            .unwrap_or_else(|| panic!("pdu writer: commit() without chunk()"));
        if self.buf.len() + chunk.len() <= self.mtu {
            self.buf.extend_from_slice(&chunk);
            true
        } else {
            false
        }
    }

    /// Commits as much of the pending record as fits within the MTU.
    /// Panics if no record is pending.
    pub fn commit_fit(&mut self) {
        let mut chunk = self
            .chunk
            .take()
            .unwrap_or_else(|| panic!("pdu writer: commit_fit() without chunk()"));
        let avail = self.mtu - self.buf.len();
        chunk.truncate(avail);
        self.buf.extend_from_slice(&chunk);
    }

    /// Discards the first `offset` bytes of the pending record. Returns false
    /// if the record is shorter than `offset`. Panics if no record is pending.
    pub fn chunk_seek(&mut self, offset: u16) -> bool {
        let chunk = self
            .chunk
            .as_mut()
            .unwrap_or_else(|| panic!("pdu writer: chunk_seek() without chunk()"));
        if (offset as usize) > chunk.len() {
            return false;
        }
        chunk.drain(..offset as usize);
        true
    }

    /// Reports how many bytes of `data` would fit if written after `pad`
    /// additional header bytes.
    pub fn writeable(&self, pad: usize, data: &[u8]) -> usize {
        let used = self.buf.len() + self.chunk.as_ref().map_or(0, Vec::len) + pad;
        data.len().min(self.mtu.saturating_sub(used))
    }

    /// Writes as many bytes of `data` as fit, returning the count written.
    /// While a record is pending the bytes land in the record, which is
    /// unbounded until commit; otherwise they land in the main buffer,
    /// bounded by the MTU.
    pub fn write_fit(&mut self, data: &[u8]) -> usize {
        match self.chunk.as_mut() {
            Some(chunk) => {
                chunk.extend_from_slice(data);
                data.len()
            }
            None => {
                let n = data.len().min(self.mtu - self.buf.len());
                self.buf.extend_from_slice(&data[..n]);
                n
            }
        }
    }

    /// Writes a single byte; returns whether it fit.
    pub fn write_byte_fit(&mut self, b: u8) -> bool {
        self.write_fit(&[b]) == 1
    }

    /// Writes a little-endian u16; returns whether it fit whole.
    pub fn write_u16_fit(&mut self, v: u16) -> bool {
        self.write_fit(&v.to_le_bytes()) == 2
    }

    /// Writes a UUID in its wire encoding; returns whether it fit whole.
    pub fn write_uuid_fit(&mut self, u: &Uuid) -> bool {
        let b = u.to_le_bytes();
        self.write_fit(&b) == b.len()
    }

    /// The committed response bytes.
    pub fn bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads the `[start, end]` handle range that opens most ATT request
/// payloads.
pub fn read_handle_range(b: &[u8]) -> Option<(u16, u16)> {
    if b.len() < 4 {
        return None;
    }
    Some((
        u16::from_le_bytes([b[0], b[1]]),
        u16::from_le_bytes([b[2], b[3]]),
    ))
}
