//! GAP types: device addresses and parsed advertisement data

use super::constants::*;
use crate::uuid::Uuid;
use std::fmt;

/// A Bluetooth device address, stored in wire order (least-significant byte
/// first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() >= 6 {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(&slice[0..6]);
            Some(Self { bytes })
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Public,
    Random,
}

impl From<u8> for AddressType {
    fn from(value: u8) -> Self {
        match value {
            RANDOM_DEVICE_ADDRESS => AddressType::Random,
            _ => AddressType::Public,
        }
    }
}

impl From<AddressType> for u8 {
    fn from(value: AddressType) -> Self {
        match value {
            AddressType::Public => PUBLIC_DEVICE_ADDRESS,
            AddressType::Random => RANDOM_DEVICE_ADDRESS,
        }
    }
}

/// The role of the remote peer on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Central,
    Peripheral,
}

/// Service data carried in an advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceData {
    pub uuid: Uuid,
    pub data: Vec<u8>,
}

/// A parsed view of an advertising or scan-response payload.
#[derive(Debug, Clone, Default)]
pub struct Advertisement {
    pub local_name: String,
    pub manufacturer_data: Vec<u8>,
    pub service_data: Vec<ServiceData>,
    pub services: Vec<Uuid>,
    pub solicited_services: Vec<Uuid>,
    pub tx_power_level: Option<i8>,
    pub flags: Option<u8>,
}

impl Advertisement {
    /// Parses the length-tagged EIR fields of an advertising payload.
    /// Unknown field types are skipped.
    pub fn unmarshal(b: &[u8]) -> Result<Advertisement, AdvertisementError> {
        let mut a = Advertisement::default();
        let mut rest = b;

        while !rest.is_empty() {
            if rest.len() < 2 {
                return Err(AdvertisementError::Truncated);
            }
            let len = rest[0] as usize;
            if len == 0 {
                // Zero padding marks the end of the significant part.
                break;
            }
            let typ = rest[1];
            if rest.len() < 1 + len {
                return Err(AdvertisementError::Truncated);
            }
            let data = &rest[2..1 + len];

            match typ {
                ADV_TYPE_FLAGS => {
                    if !data.is_empty() {
                        a.flags = Some(data[0]);
                    }
                }
                ADV_TYPE_SOME_UUID16 | ADV_TYPE_ALL_UUID16 => uuid_list(&mut a.services, data, 2),
                ADV_TYPE_SOME_UUID128 | ADV_TYPE_ALL_UUID128 => uuid_list(&mut a.services, data, 16),
                ADV_TYPE_SHORT_NAME | ADV_TYPE_COMPLETE_NAME => {
                    a.local_name = String::from_utf8_lossy(data).into_owned();
                }
                ADV_TYPE_TX_POWER => {
                    if !data.is_empty() {
                        a.tx_power_level = Some(data[0] as i8);
                    }
                }
                ADV_TYPE_SERVICE_SOL16 => uuid_list(&mut a.solicited_services, data, 2),
                ADV_TYPE_SERVICE_SOL128 => uuid_list(&mut a.solicited_services, data, 16),
                ADV_TYPE_SERVICE_DATA16 => {
                    if data.len() >= 2 {
                        if let Some(uuid) = Uuid::from_le_slice(&data[..2]) {
                            a.service_data.push(ServiceData {
                                uuid,
                                data: data[2..].to_vec(),
                            });
                        }
                    }
                }
                ADV_TYPE_MANUFACTURER_DATA => {
                    a.manufacturer_data = data.to_vec();
                }
                _ => {}
            }
            rest = &rest[1 + len..];
        }
        Ok(a)
    }
}

fn uuid_list(out: &mut Vec<Uuid>, data: &[u8], width: usize) {
    for chunk in data.chunks_exact(width) {
        if let Some(u) = Uuid::from_le_slice(chunk) {
            out.push(u);
        }
    }
}

/// Errors parsing advertisement payloads.
#[derive(Debug, thiserror::Error)]
pub enum AdvertisementError {
    #[error("truncated advertisement field")]
    Truncated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bdaddr_display() {
        let a = BdAddr::new([0x55, 0x44, 0x33, 0x22, 0x11, 0x00]);
        assert_eq!(a.to_string(), "00:11:22:33:44:55");
    }

    #[test]
    fn test_unmarshal_flags_name_and_uuids() {
        // Flags 0x06, complete 16-bit UUID list [0x180D], complete name "HRM".
        let b = [
            0x02, 0x01, 0x06, 0x03, 0x03, 0x0D, 0x18, 0x04, 0x09, b'H', b'R', b'M',
        ];
        let a = Advertisement::unmarshal(&b).unwrap();
        assert_eq!(a.flags, Some(0x06));
        assert_eq!(a.services, vec![Uuid::uuid16(0x180D)]);
        assert_eq!(a.local_name, "HRM");
    }

    #[test]
    fn test_unmarshal_manufacturer_data() {
        let b = [0x05, 0xFF, 0x34, 0x12, 0xAB, 0xCD];
        let a = Advertisement::unmarshal(&b).unwrap();
        assert_eq!(a.manufacturer_data, vec![0x34, 0x12, 0xAB, 0xCD]);
    }

    #[test]
    fn test_unmarshal_truncated() {
        assert!(Advertisement::unmarshal(&[0x05, 0x09, b'A']).is_err());
        assert!(Advertisement::unmarshal(&[0x01]).is_err());
    }
}
