//! GAP and advertising constants from the BLE spec

// Advertising data field types
pub const ADV_TYPE_FLAGS: u8 = 0x01; // Flags
pub const ADV_TYPE_SOME_UUID16: u8 = 0x02; // Incomplete List of 16-bit Service UUIDs
pub const ADV_TYPE_ALL_UUID16: u8 = 0x03; // Complete List of 16-bit Service UUIDs
pub const ADV_TYPE_SOME_UUID32: u8 = 0x04; // Incomplete List of 32-bit Service UUIDs
pub const ADV_TYPE_ALL_UUID32: u8 = 0x05; // Complete List of 32-bit Service UUIDs
pub const ADV_TYPE_SOME_UUID128: u8 = 0x06; // Incomplete List of 128-bit Service UUIDs
pub const ADV_TYPE_ALL_UUID128: u8 = 0x07; // Complete List of 128-bit Service UUIDs
pub const ADV_TYPE_SHORT_NAME: u8 = 0x08; // Shortened Local Name
pub const ADV_TYPE_COMPLETE_NAME: u8 = 0x09; // Complete Local Name
pub const ADV_TYPE_TX_POWER: u8 = 0x0A; // Tx Power Level
pub const ADV_TYPE_SERVICE_SOL16: u8 = 0x14; // 16-bit Service Solicitation UUIDs
pub const ADV_TYPE_SERVICE_SOL128: u8 = 0x15; // 128-bit Service Solicitation UUIDs
pub const ADV_TYPE_SERVICE_DATA16: u8 = 0x16; // Service Data - 16-bit UUID
pub const ADV_TYPE_SERVICE_SOL32: u8 = 0x1F; // 32-bit Service Solicitation UUIDs
pub const ADV_TYPE_MANUFACTURER_DATA: u8 = 0xFF; // Manufacturer Specific Data

// Flag bits
pub const FLAG_LIMITED_DISCOVERABLE: u8 = 0x01; // LE Limited Discoverable Mode
pub const FLAG_GENERAL_DISCOVERABLE: u8 = 0x02; // LE General Discoverable Mode
pub const FLAG_LE_ONLY: u8 = 0x04; // BR/EDR Not Supported

// Address type values on the wire
pub const PUBLIC_DEVICE_ADDRESS: u8 = 0x00;
pub const RANDOM_DEVICE_ADDRESS: u8 = 0x01;

// Appearance characteristic value for a generic computer, little-endian.
pub const APPEARANCE_GENERIC_COMPUTER: [u8; 2] = [0x00, 0x80];
