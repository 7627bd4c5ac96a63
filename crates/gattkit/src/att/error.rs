//! Error handling for the ATT protocol
use super::constants::*;
use thiserror::Error;

/// ATT error codes as defined in the specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success,
    InvalidHandle,
    ReadNotPermitted,
    WriteNotPermitted,
    InvalidPdu,
    InsufficientAuthentication,
    RequestNotSupported,
    InvalidOffset,
    InsufficientAuthorization,
    PrepareQueueFull,
    AttributeNotFound,
    AttributeNotLong,
    InsufficientEncryptionKeySize,
    InvalidAttributeValueLength,
    Unlikely,
    InsufficientEncryption,
    UnsupportedGroupType,
    InsufficientResources,
    /// An application-defined or otherwise unrecognized code.
    Other(u8),
}

impl From<u8> for ErrorCode {
    fn from(code: u8) -> Self {
        match code {
            0x00 => ErrorCode::Success,
            ATT_ERROR_INVALID_HANDLE => ErrorCode::InvalidHandle,
            ATT_ERROR_READ_NOT_PERMITTED => ErrorCode::ReadNotPermitted,
            ATT_ERROR_WRITE_NOT_PERMITTED => ErrorCode::WriteNotPermitted,
            ATT_ERROR_INVALID_PDU => ErrorCode::InvalidPdu,
            ATT_ERROR_INSUFFICIENT_AUTHENTICATION => ErrorCode::InsufficientAuthentication,
            ATT_ERROR_REQUEST_NOT_SUPPORTED => ErrorCode::RequestNotSupported,
            ATT_ERROR_INVALID_OFFSET => ErrorCode::InvalidOffset,
            ATT_ERROR_INSUFFICIENT_AUTHORIZATION => ErrorCode::InsufficientAuthorization,
            ATT_ERROR_PREPARE_QUEUE_FULL => ErrorCode::PrepareQueueFull,
            ATT_ERROR_ATTRIBUTE_NOT_FOUND => ErrorCode::AttributeNotFound,
            ATT_ERROR_ATTRIBUTE_NOT_LONG => ErrorCode::AttributeNotLong,
            ATT_ERROR_INSUFFICIENT_ENCRYPTION_KEY_SIZE => ErrorCode::InsufficientEncryptionKeySize,
            ATT_ERROR_INVALID_ATTRIBUTE_VALUE_LENGTH => ErrorCode::InvalidAttributeValueLength,
            ATT_ERROR_UNLIKELY => ErrorCode::Unlikely,
            ATT_ERROR_INSUFFICIENT_ENCRYPTION => ErrorCode::InsufficientEncryption,
            ATT_ERROR_UNSUPPORTED_GROUP_TYPE => ErrorCode::UnsupportedGroupType,
            ATT_ERROR_INSUFFICIENT_RESOURCES => ErrorCode::InsufficientResources,
            c => ErrorCode::Other(c),
        }
    }
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> u8 {
        match code {
            ErrorCode::Success => 0x00,
            ErrorCode::InvalidHandle => ATT_ERROR_INVALID_HANDLE,
            ErrorCode::ReadNotPermitted => ATT_ERROR_READ_NOT_PERMITTED,
            ErrorCode::WriteNotPermitted => ATT_ERROR_WRITE_NOT_PERMITTED,
            ErrorCode::InvalidPdu => ATT_ERROR_INVALID_PDU,
            ErrorCode::InsufficientAuthentication => ATT_ERROR_INSUFFICIENT_AUTHENTICATION,
            ErrorCode::RequestNotSupported => ATT_ERROR_REQUEST_NOT_SUPPORTED,
            ErrorCode::InvalidOffset => ATT_ERROR_INVALID_OFFSET,
            ErrorCode::InsufficientAuthorization => ATT_ERROR_INSUFFICIENT_AUTHORIZATION,
            ErrorCode::PrepareQueueFull => ATT_ERROR_PREPARE_QUEUE_FULL,
            ErrorCode::AttributeNotFound => ATT_ERROR_ATTRIBUTE_NOT_FOUND,
            ErrorCode::AttributeNotLong => ATT_ERROR_ATTRIBUTE_NOT_LONG,
            ErrorCode::InsufficientEncryptionKeySize => ATT_ERROR_INSUFFICIENT_ENCRYPTION_KEY_SIZE,
            ErrorCode::InvalidAttributeValueLength => ATT_ERROR_INVALID_ATTRIBUTE_VALUE_LENGTH,
            ErrorCode::Unlikely => ATT_ERROR_UNLIKELY,
            ErrorCode::InsufficientEncryption => ATT_ERROR_INSUFFICIENT_ENCRYPTION,
            ErrorCode::UnsupportedGroupType => ATT_ERROR_UNSUPPORTED_GROUP_TYPE,
            ErrorCode::InsufficientResources => ATT_ERROR_INSUFFICIENT_RESOURCES,
            ErrorCode::Other(c) => c,
        }
    }
}

/// Builds the 5-byte ATT error response PDU for a failed request.
pub fn error_response(request_opcode: u8, handle: u16, code: ErrorCode) -> Vec<u8> {
    vec![
        ATT_ERROR_RSP,
        request_opcode,
        handle as u8,
        (handle >> 8) as u8,
        code.into(),
    ]
}

/// ATT failures surfaced by the client role and by wire parsing.
#[derive(Debug, Error)]
pub enum AttError {
    /// The peer answered a request with an error response.
    #[error("ATT error {code:?} for opcode {opcode:#04x} at handle {handle:#06x}")]
    Protocol { opcode: u8, handle: u16, code: ErrorCode },

    #[error("malformed ATT PDU")]
    MalformedPdu,

    #[error("response opcode {got:#04x} does not match request {want:#04x}")]
    UnexpectedResponse { want: u8, got: u8 },

    #[error("buffer too short for field")]
    ShortBuffer,

    #[error("invalid UUID length: {0}")]
    InvalidUuidLength(usize),
}

/// ATT result type
pub type AttResult<T> = Result<T, AttError>;
