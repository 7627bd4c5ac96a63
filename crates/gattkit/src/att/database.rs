//! The attribute database: services flattened into a contiguous handle range
//!
//! After all services are declared the database is frozen by a single walk
//! that assigns handles and materializes one attribute record per service
//! declaration, characteristic declaration, characteristic value, and
//! descriptor. Handles start at 1 and are adjacent with no gaps, which is
//! what lets range queries be plain slice arithmetic.

use super::constants::*;
use crate::gatt::{Characteristic, Descriptor, Properties, Service};
use crate::uuid::Uuid;
use std::sync::Arc;

/// The record kind tag. Discovery responses report different payloads per
/// kind, and read/write dispatch branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Service,
    IncludedService,
    Characteristic,
    CharacteristicValue,
    Descriptor,
}

/// One attribute in the finalized database.
///
/// Group handles are only meaningful for some kinds: `start_handle` /
/// `end_handle` span a service's range, `value_handle` points from a
/// characteristic declaration to its value attribute. A value or CCC record
/// links back to its declaration by index into the attribute vector; the
/// declaration record owns the characteristic.
#[derive(Clone)]
pub struct Attribute {
    pub handle: u16,
    pub start_handle: u16,
    pub end_handle: u16,
    pub value_handle: u16,
    pub kind: AttributeKind,
    pub uuid: Uuid,
    pub props: Properties,
    pub secure: Properties,
    /// Static value, if the attribute has one. A characteristic value
    /// attribute without one is served by the characteristic's read handler.
    pub value: Option<Vec<u8>>,
    /// The characteristic owning this record, present on declarations.
    pub characteristic: Option<Arc<Characteristic>>,
    /// Index of the owning characteristic's declaration record, present on
    /// value and CCC records.
    pub decl_index: Option<usize>,
}

impl Attribute {
    /// Whether this record is the primary service declaration for `uuid`.
    pub fn is_primary_service(&self, uuid: &Uuid) -> bool {
        self.kind == AttributeKind::Service && self.uuid == *uuid
    }

    /// Whether this record is the characteristic declaration for `uuid`.
    pub fn is_characteristic(&self, uuid: &Uuid) -> bool {
        self.kind == AttributeKind::Characteristic && self.uuid == *uuid
    }

    /// Whether this record is a descriptor with `uuid`.
    pub fn is_descriptor(&self, uuid: &Uuid) -> bool {
        self.kind == AttributeKind::Descriptor && self.uuid == *uuid
    }

    /// Whether this record is the Client Characteristic Configuration
    /// descriptor.
    pub fn is_ccc(&self) -> bool {
        self.kind == AttributeKind::Descriptor && self.uuid == Uuid::uuid16(CLIENT_CHAR_CONFIG_UUID)
    }
}

impl std::fmt::Debug for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("uuid", &self.uuid)
            .field("start", &self.start_handle)
            .field("end", &self.end_handle)
            .field("value_handle", &self.value_handle)
            .field("props", &self.props)
            .finish()
    }
}

/// A contiguous range of attributes, read-only after construction and shared
/// across all connection tasks.
pub struct AttributeDatabase {
    attrs: Vec<Attribute>,
    // Handle number of the first attribute.
    base: u16,
}

impl AttributeDatabase {
    /// Returns the attribute with handle `h`.
    pub fn at(&self, h: u16) -> Option<&Attribute> {
        self.idx(h as i32).map(|i| &self.attrs[i])
    }

    /// Returns the attributes with handles in `[start, end]`, clamped to the
    /// actual base and top. Out-of-range or inverted bounds yield an empty
    /// slice.
    pub fn subrange(&self, start: u16, end: u16) -> &[Attribute] {
        let start_idx = match self.idx(start as i32) {
            Some(i) => i,
            None if (start as i32) < self.base as i32 => 0,
            None => return &[],
        };

        // [start, end] includes its upper bound.
        let end_idx = match self.idx(end as i32 + 1) {
            Some(i) => i,
            None if (end as i32) + 1 < self.base as i32 => return &[],
            None => self.attrs.len(),
        };

        if start_idx > end_idx {
            return &[];
        }
        &self.attrs[start_idx..end_idx]
    }

    /// Returns the attribute at a vector index, as stored in a record's
    /// declaration back-link.
    pub(crate) fn at_index(&self, i: usize) -> Option<&Attribute> {
        self.attrs.get(i)
    }

    /// Resolves a value or CCC record to its owning characteristic.
    pub fn characteristic_for<'a>(&'a self, attr: &'a Attribute) -> Option<&'a Arc<Characteristic>> {
        match attr.kind {
            AttributeKind::Characteristic => attr.characteristic.as_ref(),
            _ => attr
                .decl_index
                .and_then(|i| self.attrs.get(i))
                .and_then(|decl| decl.characteristic.as_ref()),
        }
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attrs.iter()
    }

    fn idx(&self, h: i32) -> Option<usize> {
        if h < self.base as i32 || h >= self.base as i32 + self.attrs.len() as i32 {
            return None;
        }
        Some((h - self.base as i32) as usize)
    }
}

/// The two mandatory services prepended to every database: GAP (0x1800) with
/// Device Name and Appearance, and GATT (0x1801).
fn default_services(name: &str) -> Vec<Service> {
    let mut gap = Service::new(Uuid::uuid16(GAP_SERVICE_UUID));
    gap.add_characteristic(Uuid::uuid16(DEVICE_NAME_UUID))
        .set_value(name.as_bytes().to_vec());
    gap.add_characteristic(Uuid::uuid16(APPEARANCE_UUID))
        .set_value(crate::gap::APPEARANCE_GENERIC_COMPUTER.to_vec());

    let gatt = Service::new(Uuid::uuid16(GATT_SERVICE_UUID));
    vec![gap, gatt]
}

/// Freezes `services` into an attribute database, assigning handles starting
/// at `base`. GAP and GATT services are injected at the head of the list, and
/// the last service's end handle is pinned to 0xFFFF so discovery terminates.
pub fn generate_attributes(name: &str, services: Vec<Service>, base: u16) -> AttributeDatabase {
    let mut all = default_services(name);
    all.extend(services);

    let mut attrs = Vec::new();
    let mut n = base;

    let last = all.len() - 1;
    for (i, svc) in all.into_iter().enumerate() {
        n = generate_service_attributes(svc, n, i == last, &mut attrs);
    }

    AttributeDatabase { attrs, base }
}

fn generate_service_attributes(
    svc: Service,
    mut n: u16,
    last: bool,
    attrs: &mut Vec<Attribute>,
) -> u16 {
    let svc_index = attrs.len();
    attrs.push(Attribute {
        handle: n,
        start_handle: n,
        end_handle: 0, // patched below
        value_handle: 0,
        kind: AttributeKind::Service,
        uuid: svc.uuid,
        props: Properties::NONE,
        secure: Properties::NONE,
        value: Some(svc.uuid.to_le_bytes()),
        characteristic: None,
        decl_index: None,
    });

    for ch in svc.chars {
        n += 1;
        n = generate_characteristic_attributes(ch, n, attrs);
    }

    attrs[svc_index].end_handle = n;
    n += 1;
    if last {
        // The ATT wildcard: discovery of the final group runs to the top of
        // the handle space.
        attrs[svc_index].end_handle = ATT_HANDLE_MAX;
        n = ATT_HANDLE_MAX;
    }
    n
}

fn generate_characteristic_attributes(
    mut ch: Characteristic,
    mut n: u16,
    attrs: &mut Vec<Attribute>,
) -> u16 {
    ch.value_handle = n + 1;

    let uuid = ch.uuid;
    let props = ch.props;
    let secure = ch.secure;
    let static_value = ch.value.clone();
    let descriptors: Vec<Descriptor> = ch.descriptors.clone();

    let decl_index = attrs.len();
    let chararc = Arc::new(ch);
    attrs.push(Attribute {
        handle: n,
        start_handle: n,
        end_handle: 0,
        value_handle: n + 1,
        kind: AttributeKind::Characteristic,
        uuid,
        props,
        secure,
        value: None,
        characteristic: Some(chararc),
        decl_index: None,
    });

    n += 1;
    attrs.push(Attribute {
        handle: n,
        start_handle: 0,
        end_handle: 0,
        value_handle: 0,
        kind: AttributeKind::CharacteristicValue,
        uuid,
        props: Properties::NONE,
        secure: Properties::NONE,
        value: static_value,
        characteristic: None,
        decl_index: Some(decl_index),
    });

    if props.can_notify() {
        // The CCC descriptor sits immediately after the value attribute.
        n += 1;
        let ccc_secure = if secure.can_notify() {
            Properties::READ | Properties::WRITE
        } else {
            Properties::NONE
        };
        attrs.push(Attribute {
            handle: n,
            start_handle: 0,
            end_handle: 0,
            value_handle: 0,
            kind: AttributeKind::Descriptor,
            uuid: Uuid::uuid16(CLIENT_CHAR_CONFIG_UUID),
            props: Properties::READ | Properties::WRITE,
            secure: ccc_secure,
            value: Some(vec![0x00, 0x00]),
            characteristic: None,
            decl_index: Some(decl_index),
        });
    }

    for d in descriptors {
        n += 1;
        attrs.push(Attribute {
            handle: n,
            start_handle: 0,
            end_handle: 0,
            value_handle: 0,
            kind: AttributeKind::Descriptor,
            uuid: d.uuid,
            props: Properties::READ,
            secure: Properties::NONE,
            value: Some(d.value),
            characteristic: None,
            decl_index: Some(decl_index),
        });
    }

    n
}
