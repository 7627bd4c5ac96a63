//! Common types for GATT services, characteristics, and descriptors
//!
//! Services are declared up front, populated with characteristics and
//! descriptors, and handed to a [`crate::gatt::Server`], which freezes them
//! into the attribute database when handles are assigned.

use crate::att::constants::*;
use crate::att::AttResult;
use crate::gap::BdAddr;
use crate::uuid::Uuid;
use std::ops::BitOr;

/// Characteristic property flags, organized to match the BLE spec bit
/// positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Properties(pub u8);

impl Properties {
    pub const NONE: Properties = Properties(0x00);
    pub const READ: Properties = Properties(0x02);
    pub const WRITE_WITHOUT_RESPONSE: Properties = Properties(0x04);
    pub const WRITE: Properties = Properties(0x08);
    pub const NOTIFY: Properties = Properties(0x10);
    pub const INDICATE: Properties = Properties(0x20);

    pub fn contains(&self, other: Properties) -> bool {
        (self.0 & other.0) != 0
    }

    pub fn can_read(&self) -> bool {
        self.contains(Self::READ)
    }

    pub fn can_write(&self) -> bool {
        self.contains(Self::WRITE)
    }

    pub fn can_write_without_response(&self) -> bool {
        self.contains(Self::WRITE_WITHOUT_RESPONSE)
    }

    pub fn can_notify(&self) -> bool {
        self.contains(Self::NOTIFY)
    }

    pub fn can_indicate(&self) -> bool {
        self.contains(Self::INDICATE)
    }
}

impl BitOr for Properties {
    type Output = Properties;

    fn bitor(self, rhs: Properties) -> Properties {
        Properties(self.0 | rhs.0)
    }
}

/// Supported statuses for characteristic read/write handlers. A non-success
/// status is sent to the central verbatim as an ATT error code.
pub const STATUS_SUCCESS: u8 = 0x00;
pub const STATUS_INVALID_OFFSET: u8 = ATT_ERROR_INVALID_OFFSET;
pub const STATUS_UNEXPECTED_ERROR: u8 = ATT_ERROR_UNLIKELY;

/// The context for a request from a connected central.
#[derive(Debug, Clone)]
pub struct Request {
    /// Address of the remote central.
    pub central: BdAddr,
    /// UUID of the service the characteristic belongs to.
    pub service: Uuid,
    /// UUID of the characteristic being accessed.
    pub characteristic: Uuid,
}

/// A characteristic read request from a connected central.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub request: Request,
    /// Maximum allowed reply length.
    pub cap: usize,
    /// Requested value offset. Handlers are responsible for applying it.
    pub offset: usize,
}

/// Collects the reply to a read request, bounded by the request capacity.
pub struct ReadResponseWriter {
    capacity: usize,
    buf: Vec<u8>,
    status: u8,
}

impl ReadResponseWriter {
    pub(crate) fn new(capacity: usize) -> Self {
        ReadResponseWriter {
            capacity,
            buf: Vec::new(),
            status: STATUS_SUCCESS,
        }
    }

    /// Appends data to the reply. Fails without writing if the data would
    /// exceed the remaining capacity.
    pub fn write(&mut self, data: &[u8]) -> AttResult<usize> {
        if self.buf.len() + data.len() > self.capacity {
            return Err(crate::att::AttError::ShortBuffer);
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    /// Reports the result of the read operation. See the STATUS_* constants.
    pub fn set_status(&mut self, status: u8) {
        self.status = status;
    }

    pub(crate) fn into_parts(self) -> (Vec<u8>, u8) {
        (self.buf, self.status)
    }
}

/// Handles GATT read requests. The handler writes up to `req.cap` bytes into
/// `resp`, already adjusted for `req.offset`.
pub trait ReadHandler: Send + Sync {
    fn serve_read(&self, req: &ReadRequest, resp: &mut ReadResponseWriter);
}

impl<F> ReadHandler for F
where
    F: Fn(&ReadRequest, &mut ReadResponseWriter) + Send + Sync,
{
    fn serve_read(&self, req: &ReadRequest, resp: &mut ReadResponseWriter) {
        self(req, resp)
    }
}

/// Handles GATT write requests. Write and write-without-response are
/// presented identically; the server sends a response when appropriate.
pub trait WriteHandler: Send + Sync {
    fn serve_write(&self, req: &Request, data: &[u8]) -> u8;
}

impl<F> WriteHandler for F
where
    F: Fn(&Request, &[u8]) -> u8 + Send + Sync,
{
    fn serve_write(&self, req: &Request, data: &[u8]) -> u8 {
        self(req, data)
    }
}

/// Handles GATT subscription requests. The handler runs on its own task and
/// may push values through the notifier until it reports done.
pub trait NotifyHandler: Send + Sync {
    fn serve_notify(&self, req: &Request, notifier: crate::gatt::Notifier);
}

impl<F> NotifyHandler for F
where
    F: Fn(&Request, crate::gatt::Notifier) + Send + Sync,
{
    fn serve_notify(&self, req: &Request, notifier: crate::gatt::Notifier) {
        self(req, notifier)
    }
}

/// A user descriptor: a UUID with a static value.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub(crate) uuid: Uuid,
    pub(crate) value: Vec<u8>,
}

impl Descriptor {
    pub fn new(uuid: Uuid, value: Vec<u8>) -> Self {
        Descriptor { uuid, value }
    }

    pub fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// A BLE characteristic: a UUID, property and secure-only masks, a static
/// value or pluggable handlers, and user descriptors.
pub struct Characteristic {
    pub(crate) uuid: Uuid,
    pub(crate) service_uuid: Uuid,
    pub(crate) props: Properties,
    pub(crate) secure: Properties,
    pub(crate) value: Option<Vec<u8>>,
    pub(crate) descriptors: Vec<Descriptor>,
    // Set during attribute generation; needed when notifying.
    pub(crate) value_handle: u16,
    pub(crate) rhandler: Option<Box<dyn ReadHandler>>,
    pub(crate) whandler: Option<Box<dyn WriteHandler>>,
    pub(crate) nhandler: Option<Box<dyn NotifyHandler>>,
}

impl Characteristic {
    pub(crate) fn new(uuid: Uuid, service_uuid: Uuid) -> Self {
        Characteristic {
            uuid,
            service_uuid,
            props: Properties::NONE,
            secure: Properties::NONE,
            value: None,
            descriptors: Vec::new(),
            value_handle: 0,
            rhandler: None,
            whandler: None,
            nhandler: None,
        }
    }

    pub fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    pub fn properties(&self) -> Properties {
        self.props
    }

    /// The handle of the characteristic value attribute. Zero until the
    /// database has been finalized.
    pub fn value_handle(&self) -> u16 {
        self.value_handle
    }

    /// Sets a static readable value. Mutually exclusive with a read handler.
    pub fn set_value(&mut self, value: Vec<u8>) -> &mut Self {
        self.props = self.props | Properties::READ;
        self.value = Some(value);
        self
    }

    /// Marks the given properties as requiring an encrypted (Medium or High
    /// security) link.
    pub fn set_secure(&mut self, secure: Properties) -> &mut Self {
        self.secure = secure;
        self
    }

    /// Makes the characteristic readable, routing read requests to `h`.
    /// Must be called before any server using the characteristic is started.
    pub fn handle_read<H: ReadHandler + 'static>(&mut self, h: H) -> &mut Self {
        self.props = self.props | Properties::READ;
        self.rhandler = Some(Box::new(h));
        self
    }

    /// Makes the characteristic writable with and without response, routing
    /// write requests to `h`. The handler does not distinguish the two; the
    /// server responds when the request form asks for it.
    pub fn handle_write<H: WriteHandler + 'static>(&mut self, h: H) -> &mut Self {
        self.props = self.props | Properties::WRITE | Properties::WRITE_WITHOUT_RESPONSE;
        self.whandler = Some(Box::new(h));
        self
    }

    /// Makes the characteristic notifiable, routing subscription requests to
    /// `h`. A Client Characteristic Configuration descriptor is materialized
    /// for the characteristic when handles are assigned.
    pub fn handle_notify<H: NotifyHandler + 'static>(&mut self, h: H) -> &mut Self {
        self.props = self.props | Properties::NOTIFY;
        self.nhandler = Some(Box::new(h));
        self
    }

    /// Adds a user descriptor with a static value.
    pub fn add_descriptor(&mut self, uuid: Uuid, value: Vec<u8>) -> &mut Self {
        self.descriptors.push(Descriptor::new(uuid, value));
        self
    }
}

impl std::fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Characteristic")
            .field("uuid", &self.uuid)
            .field("props", &self.props)
            .field("secure", &self.secure)
            .field("value_handle", &self.value_handle)
            .finish()
    }
}

/// A BLE service: a UUID owning an ordered list of characteristics.
pub struct Service {
    pub(crate) uuid: Uuid,
    pub(crate) chars: Vec<Characteristic>,
}

impl Service {
    pub fn new(uuid: Uuid) -> Self {
        Service {
            uuid,
            chars: Vec::new(),
        }
    }

    pub fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    /// Adds a characteristic to the service. Panics if the service already
    /// contains a characteristic with the same UUID.
    pub fn add_characteristic(&mut self, uuid: Uuid) -> &mut Characteristic {
        if self.chars.iter().any(|c| c.uuid == uuid) {
            panic!("service already contains a characteristic with uuid {}", uuid);
        }
        self.chars.push(Characteristic::new(uuid, self.uuid));
        self.chars.last_mut().unwrap()
    }

    pub fn characteristics(&self) -> &[Characteristic] {
        &self.chars
    }
}
