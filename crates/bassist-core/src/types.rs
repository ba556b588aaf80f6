//! Core domain types shared by the codec and the orchestration engine

use core::fmt;
use core::str::FromStr;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Size of a device address on the wire (without the type octet)
pub const ADDRESS_SIZE: usize = 6;

/// Size of a broadcast code and of a set identity resolving key
pub const KEY_SIZE: usize = 16;

/// Broadcast code used to decrypt an encrypted broadcast isochronous group
pub type BroadcastCode = [u8; KEY_SIZE];

/// Set Identity Resolving Key shared by the members of a coordinated set
pub type Sirk = [u8; KEY_SIZE];

/// Source id assigned by a scan delegator to one of its receive states
pub type SourceId = u8;

/// Advertising set identifier of an extended advertiser
pub type AdvertisingSid = u8;

// ----------------------------------------------------------------------------
// Device Address
// ----------------------------------------------------------------------------

/// Bluetooth LE address type
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressType {
    Public = 0x00,
    Random = 0x01,
    PublicIdentity = 0x02,
    RandomIdentity = 0x03,
}

impl TryFrom<u8> for AddressType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(AddressType::Public),
            0x01 => Ok(AddressType::Random),
            0x02 => Ok(AddressType::PublicIdentity),
            0x03 => Ok(AddressType::RandomIdentity),
            other => Err(ProtocolError::InvalidField {
                field: "address type",
                reason: format!("{other:#04x}"),
            }),
        }
    }
}

impl AddressType {
    fn label(self) -> &'static str {
        match self {
            AddressType::Public => "public",
            AddressType::Random => "random",
            AddressType::PublicIdentity => "public-id",
            AddressType::RandomIdentity => "random-id",
        }
    }
}

/// A typed Bluetooth LE device address.
///
/// `bytes` are kept in over-the-air (little-endian) order; `Display` prints the
/// conventional most-significant-octet-first form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub kind: AddressType,
    pub bytes: [u8; ADDRESS_SIZE],
}

impl Address {
    pub const fn new(kind: AddressType, bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self { kind, bytes }
    }

    pub const fn public(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self::new(AddressType::Public, bytes)
    }

    pub const fn random(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self::new(AddressType::Random, bytes)
    }

    /// Public addresses and random static addresses identify a device;
    /// resolvable private addresses do not.
    pub fn is_identity(&self) -> bool {
        match self.kind {
            AddressType::Public => true,
            _ => self.bytes[ADDRESS_SIZE - 1] & 0xC0 == 0xC0,
        }
    }

    /// Encode as `type ‖ address` (7 octets)
    pub fn to_wire(&self) -> [u8; ADDRESS_SIZE + 1] {
        let mut out = [0u8; ADDRESS_SIZE + 1];
        out[0] = self.kind as u8;
        out[1..].copy_from_slice(&self.bytes);
        out
    }

    /// Decode from `type ‖ address`
    pub fn from_wire(data: &[u8]) -> Result<Self> {
        if data.len() < ADDRESS_SIZE + 1 {
            return Err(ProtocolError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                ADDRESS_SIZE + 1,
                data.len()
            )));
        }
        let kind = AddressType::try_from(data[0])?;
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(&data[1..=ADDRESS_SIZE]);
        Ok(Self { kind, bytes })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X} ({})",
            b[5],
            b[4],
            b[3],
            b[2],
            b[1],
            b[0],
            self.kind.label()
        )
    }
}

impl FromStr for Address {
    type Err = ProtocolError;

    /// Parses `AA:BB:CC:DD:EE:FF` with an optional `/public`, `/random`,
    /// `/public-id` or `/random-id` suffix (public when omitted).
    fn from_str(s: &str) -> Result<Self> {
        let (addr, kind) = match s.split_once('/') {
            Some((addr, "public")) => (addr, AddressType::Public),
            Some((addr, "random")) => (addr, AddressType::Random),
            Some((addr, "public-id")) => (addr, AddressType::PublicIdentity),
            Some((addr, "random-id")) => (addr, AddressType::RandomIdentity),
            Some((_, other)) => {
                return Err(ProtocolError::InvalidAddress(format!(
                    "unknown address type '{other}'"
                )))
            }
            None => (s, AddressType::Public),
        };

        let octets: Vec<&str> = addr.split(':').collect();
        if octets.len() != ADDRESS_SIZE {
            return Err(ProtocolError::InvalidAddress(s.to_string()));
        }

        let mut bytes = [0u8; ADDRESS_SIZE];
        for (i, octet) in octets.iter().enumerate() {
            let value = hex::decode(octet)
                .ok()
                .and_then(|v| v.first().copied().filter(|_| v.len() == 1))
                .ok_or_else(|| ProtocolError::InvalidAddress(s.to_string()))?;
            bytes[ADDRESS_SIZE - 1 - i] = value;
        }

        Ok(Self { kind, bytes })
    }
}

// ----------------------------------------------------------------------------
// Broadcast Identifiers
// ----------------------------------------------------------------------------

/// 24-bit Broadcast_ID advertised by a broadcast source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BroadcastId(u32);

impl BroadcastId {
    pub const MAX: u32 = 0x00FF_FFFF;

    /// Builds a broadcast id, masking anything above 24 bits
    pub const fn new(raw: u32) -> Self {
        Self(raw & Self::MAX)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// Read a 24-bit little-endian value
    pub fn from_le24(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(ProtocolError::InvalidField {
                field: "broadcast id",
                reason: format!("expected 3 bytes, got {}", data.len()),
            });
        }
        Ok(Self(u32::from_le_bytes([data[0], data[1], data[2], 0])))
    }
}

impl TryFrom<u32> for BroadcastId {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self> {
        if value > Self::MAX {
            return Err(ProtocolError::InvalidField {
                field: "broadcast id",
                reason: "cannot exceed 3 bytes".to_string(),
            });
        }
        Ok(Self(value))
    }
}

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#08x}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Periodic Advertising Timing
// ----------------------------------------------------------------------------

/// Periodic advertising interval in units of 1.25 ms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaInterval(pub u16);

impl PaInterval {
    /// Interval not known to the sender
    pub const UNKNOWN: PaInterval = PaInterval(0xFFFF);

    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }

    pub fn as_millis(self) -> u32 {
        u32::from(self.0) * 5 / 4
    }

    /// Sync timeout for this interval: `ratio` intervals, in 10 ms units,
    /// clamped to the range the controller accepts. An unknown interval gets
    /// the maximum timeout.
    pub fn sync_timeout(self, ratio: u32) -> SyncTimeout {
        if self.is_unknown() {
            return SyncTimeout::MAX;
        }
        let timeout = self.as_millis().saturating_mul(ratio) / 10;
        let clamped = timeout.clamp(u32::from(SyncTimeout::MIN.0), u32::from(SyncTimeout::MAX.0));
        SyncTimeout(clamped as u16)
    }
}

impl Default for PaInterval {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// Periodic advertising sync timeout in units of 10 ms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncTimeout(pub u16);

impl SyncTimeout {
    pub const MIN: SyncTimeout = SyncTimeout(0x000A);
    pub const MAX: SyncTimeout = SyncTimeout(0x4000);

    pub fn as_duration(self) -> Duration {
        Duration::from_millis(u64::from(self.0) * 10)
    }
}

// ----------------------------------------------------------------------------
// Connections
// ----------------------------------------------------------------------------

/// Opaque identity of an LE connection handed out by the link layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnHandle(pub u16);

impl fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Coordinated set membership reported by a set member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetInfo {
    pub sirk: Sirk,
    pub set_size: u8,
    pub rank: u8,
    pub lockable: bool,
}

// ----------------------------------------------------------------------------
// BIGInfo
// ----------------------------------------------------------------------------

/// BIGInfo report received over a periodic advertising train
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BigInfo {
    pub num_bis: u8,
    pub sub_event_count: u8,
    pub iso_interval: u16,
    pub burst_number: u8,
    pub offset: u8,
    pub repetition_count: u8,
    pub max_pdu: u16,
    pub sdu_interval: u32,
    pub max_sdu: u16,
    pub phy: u8,
    pub framing: u8,
    pub encrypted: bool,
}

impl BigInfo {
    pub const WIRE_SIZE: usize = 18;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        out[0] = self.num_bis;
        out[1] = self.sub_event_count;
        out[2..4].copy_from_slice(&self.iso_interval.to_le_bytes());
        out[4] = self.burst_number;
        out[5] = self.offset;
        out[6] = self.repetition_count;
        out[7..9].copy_from_slice(&self.max_pdu.to_le_bytes());
        out[9..13].copy_from_slice(&self.sdu_interval.to_le_bytes());
        out[13..15].copy_from_slice(&self.max_sdu.to_le_bytes());
        out[15] = self.phy;
        out[16] = self.framing;
        out[17] = u8::from(self.encrypted);
        out
    }
}
