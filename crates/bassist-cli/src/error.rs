//! Error handling for the bassist CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] bassist_core::ProtocolError),

    #[error("Stream error: {0}")]
    Stream(#[from] bassist_core::protocol::StreamError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No response to {subtype:#04x} (seq {seq}) within {waited_ms} ms")]
    Timeout { subtype: u8, seq: u8, waited_ms: u64 },

    #[error("Connection closed by {0}")]
    ConnectionClosed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("Hex decoding error: {0}")]
    HexDecoding(#[from] hex::FromHexError),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
