//! GATT (Generic Attribute Profile) implementation
//!
//! The peripheral role: declare services and characteristics, freeze them
//! into the attribute database, and serve connections. The client role:
//! discover, read, write, and subscribe against a remote peripheral.

pub mod client;
pub mod connection;
pub mod notifier;
pub mod server;
pub mod types;

#[cfg(test)]
mod tests;

pub use client::{GattClient, RemoteCharacteristic, RemoteDescriptor, RemoteService};
pub use connection::Connection;
pub use notifier::Notifier;
pub use server::Server;
pub use types::{
    Characteristic, Descriptor, NotifyHandler, Properties, ReadHandler, ReadRequest,
    ReadResponseWriter, Request, Service, WriteHandler, STATUS_INVALID_OFFSET, STATUS_SUCCESS,
    STATUS_UNEXPECTED_ERROR,
};
