//! GattKit - a Bluetooth Low Energy GATT stack for Rust
//!
//! This library implements the GATT (Generic Attribute Profile) peripheral role
//! on top of an abstract HCI/L2CAP transport: an attribute database with handle
//! allocation, the ATT request/response state machine, a per-connection runtime
//! with subscriptions and notifications, and the advertising payload builder.
//! It also includes a GATT client implementation for the central role.

pub mod att;
pub mod error;
pub mod gap;
pub mod gatt;
pub mod hci;
pub mod l2cap;
pub mod scan;
pub mod uuid;

// Re-export common types for convenience
pub use att::{AttServer, AttributeDatabase, ErrorCode, SecurityLevel};
pub use error::Error;
pub use gap::{AdvPacket, Advertisement, Advertiser, BdAddr};
pub use gatt::{Characteristic, GattClient, Notifier, Properties, Server, Service};
pub use hci::{AdapterState, AdvertisingData, ControllerCommands};
pub use uuid::Uuid;
