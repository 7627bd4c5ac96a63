use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The base UUID used for constructing 128-bit UUIDs from 16-bit values,
/// "00000000-0000-1000-8000-00805F9B34FB", in little-endian byte order.
const BASE_UUID_BYTES: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Offset within the base UUID where the 16-bit value is inserted.
const BASE_OFFSET: usize = 12;

/// A Bluetooth UUID, either a SIG-assigned 16-bit value or a full 128-bit
/// value. 128-bit UUIDs are stored in little-endian byte order, matching the
/// ATT wire representation.
///
/// Constructors normalize: a 128-bit UUID that lies on the Bluetooth base
/// UUID collapses to its 16-bit form, so equality holds across encodings of
/// the same identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uuid {
    Uuid16(u16),
    Uuid128([u8; 16]),
}

impl Uuid {
    /// Creates a UUID from a SIG-assigned 16-bit value.
    pub const fn uuid16(value: u16) -> Self {
        Uuid::Uuid16(value)
    }

    /// Creates a UUID from 16 little-endian bytes, normalizing to the 16-bit
    /// form when the bytes lie on the Bluetooth base UUID.
    pub fn from_le_bytes(bytes: [u8; 16]) -> Self {
        if bytes[..BASE_OFFSET] == BASE_UUID_BYTES[..BASE_OFFSET]
            && bytes[BASE_OFFSET + 2] == 0
            && bytes[BASE_OFFSET + 3] == 0
        {
            return Uuid::Uuid16(u16::from_le_bytes([bytes[BASE_OFFSET], bytes[BASE_OFFSET + 1]]));
        }
        Uuid::Uuid128(bytes)
    }

    /// Creates a UUID from 16 big-endian bytes (the order used by the
    /// canonical hyphenated string form).
    pub fn from_be_bytes(mut bytes: [u8; 16]) -> Self {
        bytes.reverse();
        Uuid::from_le_bytes(bytes)
    }

    /// Tries to create a UUID from a little-endian wire slice of length 2 or
    /// 16. Returns `None` for any other length.
    pub fn from_le_slice(slice: &[u8]) -> Option<Self> {
        match slice.len() {
            2 => Some(Uuid::Uuid16(u16::from_le_bytes([slice[0], slice[1]]))),
            16 => {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(slice);
                Some(Uuid::from_le_bytes(bytes))
            }
            _ => None,
        }
    }

    /// Generates a random (version 4) 128-bit UUID.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);

        // Version 4, RFC 4122 variant. The stored order is little-endian, so
        // the version byte (big-endian index 6) sits at index 9 and the
        // variant byte (big-endian index 8) at index 7.
        bytes[9] = (bytes[9] & 0x0F) | 0x40;
        bytes[7] = (bytes[7] & 0x3F) | 0x80;

        Uuid::Uuid128(bytes)
    }

    /// The encoded length on the wire: 2 or 16 bytes.
    pub fn len(&self) -> usize {
        match self {
            Uuid::Uuid16(_) => 2,
            Uuid::Uuid128(_) => 16,
        }
    }

    /// Returns the 16-bit value if this is a SIG-assigned UUID.
    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Uuid::Uuid16(v) => Some(*v),
            Uuid::Uuid128(_) => None,
        }
    }

    /// The little-endian wire encoding of this UUID.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Uuid::Uuid16(v) => v.to_le_bytes().to_vec(),
            Uuid::Uuid128(b) => b.to_vec(),
        }
    }
}

impl From<u16> for Uuid {
    fn from(value: u16) -> Self {
        Uuid::Uuid16(value)
    }
}

impl PartialEq<u16> for Uuid {
    fn eq(&self, other: &u16) -> bool {
        self.as_u16() == Some(*other)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uuid::Uuid16(v) => write!(f, "{:04x}", v),
            Uuid::Uuid128(b) => {
                // Canonical hyphenated form is big-endian.
                write!(
                    f,
                    "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
                    b[15], b[14], b[13], b[12],
                    b[11], b[10],
                    b[9], b[8],
                    b[7], b[6],
                    b[5], b[4], b[3], b[2], b[1], b[0]
                )
            }
        }
    }
}

/// Errors produced when parsing a UUID from a string.
#[derive(Debug, Error)]
pub enum UuidParseError {
    #[error("invalid UUID length: expected 4 or 32 hex digits, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl FromStr for Uuid {
    type Err = UuidParseError;

    /// Parses the 4-hex-digit short form ("2902") or the canonical
    /// 8-4-4-4-12 form, case-insensitive; hyphens are optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s.chars().filter(|c| *c != '-').collect();

        match cleaned.len() {
            4 => {
                let mut b = [0u8; 2];
                hex::decode_to_slice(&cleaned, &mut b)?;
                Ok(Uuid::Uuid16(u16::from_be_bytes(b)))
            }
            32 => {
                let mut b = [0u8; 16];
                hex::decode_to_slice(&cleaned, &mut b)?;
                Ok(Uuid::from_be_bytes(b))
            }
            n => Err(UuidParseError::InvalidLength(n)),
        }
    }
}
