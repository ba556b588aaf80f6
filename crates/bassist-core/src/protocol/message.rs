//! Message framing
//!
//! Every frame exchanged with the controller is a fixed five byte header
//! followed by a TLV payload:
//!
//! ```text
//! +------+---------+-----+------------+-----------------+
//! | type | subtype | seq | len (LE16) | payload (len)   |
//! +------+---------+-----+------------+-----------------+
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};
use crate::protocol::tlv::{TlvCodec, TlvEntry, TlvTag};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Size of the frame header
pub const HEADER_SIZE: usize = 5;

/// Largest payload a frame header can describe
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

// ----------------------------------------------------------------------------
// Message Types
// ----------------------------------------------------------------------------

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Command = 1,
    Response = 2,
    Event = 3,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(MessageType::Command),
            2 => Ok(MessageType::Response),
            3 => Ok(MessageType::Event),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

/// Command (and matching response) subtypes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandSubtype {
    StartSinkScan = 0x01,
    StartSourceScan = 0x02,
    StartScanAll = 0x03,
    StopScan = 0x04,
    ConnectSink = 0x05,
    DisconnectSink = 0x06,
    AddSource = 0x07,
    RemoveSource = 0x08,
    BigBroadcastCode = 0x09,
    SetVolume = 0x0A,
    Mute = 0x0B,
    Unmute = 0x0C,
    PaSync = 0x0D,
    StartCsisScan = 0x0E,
    Reset = 0x2A,
    Heartbeat = 0xFF,
}

impl CommandSubtype {
    pub fn from_u8(value: u8) -> Option<Self> {
        use CommandSubtype::*;
        let subtype = match value {
            0x01 => StartSinkScan,
            0x02 => StartSourceScan,
            0x03 => StartScanAll,
            0x04 => StopScan,
            0x05 => ConnectSink,
            0x06 => DisconnectSink,
            0x07 => AddSource,
            0x08 => RemoveSource,
            0x09 => BigBroadcastCode,
            0x0A => SetVolume,
            0x0B => Mute,
            0x0C => Unmute,
            0x0D => PaSync,
            0x0E => StartCsisScan,
            0x2A => Reset,
            0xFF => Heartbeat,
            _ => return None,
        };
        Some(subtype)
    }
}

/// Event subtypes (bit 7 set, apart from the scan-stopped notification)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSubtype {
    ScanStopped = 0x04,
    SinkFound = 0x81,
    SourceFound = 0x82,
    SinkConnected = 0x83,
    SinkDisconnected = 0x84,
    SourceAdded = 0x85,
    SourceRemoved = 0x86,
    PaNotSynced = 0x87,
    PaInfoRequested = 0x88,
    PaSynced = 0x89,
    PaFailed = 0x8A,
    PaNoPast = 0x8B,
    BisSynced = 0x8C,
    BisNotSynced = 0x8D,
    IdentityResolved = 0x8E,
    SourceBaseFound = 0x8F,
    SourceBigInfo = 0x90,
    EncNotEncrypted = 0x91,
    EncBroadcastCodeRequired = 0x92,
    EncDecrypting = 0x93,
    EncBadCode = 0x94,
    VolumeState = 0x95,
    VolumeControlFound = 0x96,
    SetIdentifierFound = 0x97,
    SetMemberFound = 0x98,
    Heartbeat = 0xFF,
}

impl EventSubtype {
    pub fn from_u8(value: u8) -> Option<Self> {
        use EventSubtype::*;
        let subtype = match value {
            0x04 => ScanStopped,
            0x81 => SinkFound,
            0x82 => SourceFound,
            0x83 => SinkConnected,
            0x84 => SinkDisconnected,
            0x85 => SourceAdded,
            0x86 => SourceRemoved,
            0x87 => PaNotSynced,
            0x88 => PaInfoRequested,
            0x89 => PaSynced,
            0x8A => PaFailed,
            0x8B => PaNoPast,
            0x8C => BisSynced,
            0x8D => BisNotSynced,
            0x8E => IdentityResolved,
            0x8F => SourceBaseFound,
            0x90 => SourceBigInfo,
            0x91 => EncNotEncrypted,
            0x92 => EncBroadcastCodeRequired,
            0x93 => EncDecrypting,
            0x94 => EncBadCode,
            0x95 => VolumeState,
            0x96 => VolumeControlFound,
            0x97 => SetIdentifierFound,
            0x98 => SetMemberFound,
            0xFF => Heartbeat,
            _ => return None,
        };
        Some(subtype)
    }
}

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// One framed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub subtype: u8,
    pub seq: u8,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(kind: MessageType, subtype: u8, seq: u8, payload: Vec<u8>) -> Self {
        Self { kind, subtype, seq, payload }
    }

    /// A response carrying only a return code
    pub fn response(subtype: u8, seq: u8, rc: i32) -> Self {
        Self::new(MessageType::Response, subtype, seq, TlvEntry::error_code(rc).encode())
    }

    /// An event; events carry sequence number zero
    pub fn event(subtype: EventSubtype, payload: Vec<u8>) -> Self {
        Self::new(MessageType::Event, subtype as u8, 0, payload)
    }

    pub fn command(subtype: CommandSubtype, seq: u8, payload: Vec<u8>) -> Self {
        Self::new(MessageType::Command, subtype as u8, seq, payload)
    }

    pub fn records(&self) -> Result<TlvCodec> {
        TlvCodec::decode(&self.payload)
    }

    /// Return code of a response or of an event that carries one
    pub fn return_code(&self) -> Option<i32> {
        self.records()
            .ok()?
            .find(TlvTag::ErrorCode)
            .and_then(|e| e.as_i32().ok())
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge(self.payload.len()));
        }

        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.push(self.kind as u8);
        bytes.push(self.subtype);
        bytes.push(self.seq);
        bytes.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }

    /// Decode the header alone, returning the message type, subtype, sequence
    /// number and payload length
    pub fn decode_header(bytes: &[u8]) -> Result<(MessageType, u8, u8, usize)> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::Truncated { needed: HEADER_SIZE, available: bytes.len() });
        }
        let kind = MessageType::from_u8(bytes[0])?;
        let len = u16::from_le_bytes([bytes[3], bytes[4]]) as usize;
        Ok((kind, bytes[1], bytes[2], len))
    }

    /// Decode a message from the front of `bytes`, returning it with the
    /// number of bytes consumed
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        let (kind, subtype, seq, len) = Self::decode_header(bytes)?;
        let total = HEADER_SIZE + len;
        if bytes.len() < total {
            return Err(ProtocolError::Truncated { needed: total, available: bytes.len() });
        }
        let payload = bytes[HEADER_SIZE..total].to_vec();
        Ok((Self { kind, subtype, seq, payload }, total))
    }

    /// Decode a buffer holding exactly one message
    pub fn decode_exact(bytes: &[u8]) -> Result<Self> {
        let (message, consumed) = Self::decode(bytes)?;
        if consumed != bytes.len() {
            return Err(ProtocolError::LengthMismatch {
                declared: consumed - HEADER_SIZE,
                actual: bytes.len() - HEADER_SIZE,
            });
        }
        Ok(message)
    }
}
