//! Error types for the broadcast assistant protocol
//!
//! `ProtocolError` covers everything that can go wrong while decoding frames,
//! TLV records and advertising data received from the controller or the radio.
//! Return codes carried on the wire are plain `i32` values; the well-known ones
//! live in [`codes`].

use thiserror::Error;

// ----------------------------------------------------------------------------
// Protocol Errors
// ----------------------------------------------------------------------------

/// Errors raised by the wire codec and the advertising data parsers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Frame length mismatch: header says {declared}, payload has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Unknown message type: {0:#04x}")]
    UnknownMessageType(u8),

    #[error("Unknown message subtype: {0:#04x}")]
    UnknownSubtype(u8),

    #[error("Malformed TLV record at offset {offset}")]
    MalformedTlv { offset: usize },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Value too large for a TLV record: {0} bytes")]
    ValueTooLarge(usize),

    #[error("Payload too large for a frame: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Invalid device address: {0}")]
    InvalidAddress(String),

    #[error("Invalid broadcast audio source endpoint: {0}")]
    InvalidBase(String),
}

/// Result type for protocol operations
pub type Result<T> = core::result::Result<T, ProtocolError>;

/// Errors raised while loading an [`AssistantConfig`](crate::AssistantConfig)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ----------------------------------------------------------------------------
// Return Codes
// ----------------------------------------------------------------------------

/// Signed return codes carried in `ERROR_CODE` records
pub mod codes {
    /// Success
    pub const OK: i32 = 0;
    /// Generic failure, also used for unsupported commands
    pub const FAILURE: i32 = -1;
    /// Resource busy
    pub const EBUSY: i32 = -16;
    /// Invalid argument
    pub const EINVAL: i32 = -22;
    /// Operation timed out
    pub const ETIMEDOUT: i32 = -110;
}
