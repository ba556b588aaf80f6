//! Runtime error types
//!
//! Every failure the engine can report to the controller maps to a signed
//! return code through [`AssistantError::code`].

use bassist_core::{codes, Address, ConfigError, ProtocolError};
use thiserror::Error;

/// A call into the link layer failed with the collaborator's return code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{op} failed with code {code}")]
pub struct LinkError {
    pub op: &'static str,
    pub code: i32,
}

impl LinkError {
    pub fn new(op: &'static str, code: i32) -> Self {
        Self { op, code }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssistantError {
    #[error("Link layer error: {0}")]
    Link(#[from] LinkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Unknown broadcast source {0}")]
    UnknownSource(Address),

    #[error("A periodic advertising sync is already active")]
    Busy,

    #[error("No connection to {0}")]
    NoConnection(Address),

    #[error("No volume control discovered on {0}")]
    NoVolumeControl(Address),

    #[error("Volume control request failed: {0}")]
    VolumeControl(LinkError),

    #[error("Timed out waiting for the {0} gate")]
    GateTimeout(&'static str),

    #[error("Unsupported command {0:#04x}")]
    Unsupported(u8),
}

impl AssistantError {
    /// Return code carried in the RESPONSE for this error
    pub fn code(&self) -> i32 {
        match self {
            AssistantError::Link(e) => e.code,
            AssistantError::Protocol(_) | AssistantError::Config(_) => codes::EINVAL,
            AssistantError::ChannelClosed(_) => codes::FAILURE,
            AssistantError::UnknownSource(_)
            | AssistantError::NoConnection(_)
            | AssistantError::NoVolumeControl(_)
            | AssistantError::VolumeControl(_) => codes::EINVAL,
            AssistantError::Busy => codes::EBUSY,
            AssistantError::GateTimeout(_) => codes::ETIMEDOUT,
            AssistantError::Unsupported(_) => codes::FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;
