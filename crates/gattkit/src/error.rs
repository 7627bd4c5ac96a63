//! Error types for the gattkit library
//!
//! This module defines the top-level error type; each protocol layer has its
//! own error enum that converts into it.

use thiserror::Error;

/// Errors that can occur when talking to the Bluetooth controller
#[derive(Error, Debug)]
pub enum HciError {
    #[error("controller I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HCI command timed out")]
    CommandTimeout,

    #[error("unauthorized; insufficient permissions for the HCI device")]
    Unauthorized,

    #[error("controller does not support Bluetooth LE")]
    LeNotSupported,

    #[error("controller stopped responding")]
    ControllerDead,
}

/// General errors that can occur in the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("ATT error: {0}")]
    Att(#[from] crate::att::AttError),

    #[error("channel error: {0}")]
    Channel(#[from] crate::l2cap::ChannelError),

    #[error("HCI error: {0}")]
    Hci(#[from] HciError),

    #[error("central stopped notifications")]
    NotifierStopped,

    #[error("max advertising packet length is 31")]
    EirPacketTooLong,

    #[error("services cannot be changed after the database is finalized")]
    DatabaseFrozen,
}
