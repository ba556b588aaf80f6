use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};
use crate::types::{Address, BigInfo, BroadcastId, KEY_SIZE};

/// Largest value a single record can carry (the length octet counts the tag)
pub const MAX_VALUE_LEN: usize = u8::MAX as usize - 1;

/// Record tags used in command and event payloads.
///
/// Payload records share the advertising-data `len ‖ type ‖ value` layout, so
/// raw advertising data can be appended to an event as-is. The assistant's own
/// tags live at the top of the AD type space.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TlvTag {
    ShortenedName = 0x08,
    CompleteName = 0x09,
    PaSyncAttempt = 0xED,
    SetRank = 0xEE,
    SetSize = 0xEF,
    Sirk = 0xF0,
    BigInfo = 0xF1,
    Mute = 0xF2,
    Volume = 0xF3,
    BisSync = 0xF4,
    BroadcastCode = 0xF5,
    SourceId = 0xF6,
    Base = 0xF7,
    Identity = 0xF8,
    Rpa = 0xF9,
    BroadcastId = 0xFA,
    ErrorCode = 0xFB,
    PaInterval = 0xFC,
    Sid = 0xFD,
    Rssi = 0xFE,
}

impl TlvTag {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x08 => Some(TlvTag::ShortenedName),
            0x09 => Some(TlvTag::CompleteName),
            0xED => Some(TlvTag::PaSyncAttempt),
            0xEE => Some(TlvTag::SetRank),
            0xEF => Some(TlvTag::SetSize),
            0xF0 => Some(TlvTag::Sirk),
            0xF1 => Some(TlvTag::BigInfo),
            0xF2 => Some(TlvTag::Mute),
            0xF3 => Some(TlvTag::Volume),
            0xF4 => Some(TlvTag::BisSync),
            0xF5 => Some(TlvTag::BroadcastCode),
            0xF6 => Some(TlvTag::SourceId),
            0xF7 => Some(TlvTag::Base),
            0xF8 => Some(TlvTag::Identity),
            0xF9 => Some(TlvTag::Rpa),
            0xFA => Some(TlvTag::BroadcastId),
            0xFB => Some(TlvTag::ErrorCode),
            0xFC => Some(TlvTag::PaInterval),
            0xFD => Some(TlvTag::Sid),
            0xFE => Some(TlvTag::Rssi),
            _ => None,
        }
    }
}

/// A single `len ‖ tag ‖ value` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvEntry {
    pub tag: u8,
    pub value: Vec<u8>,
}

impl TlvEntry {
    /// Create a new entry, rejecting values that do not fit the length octet
    pub fn new(tag: TlvTag, value: Vec<u8>) -> Result<Self> {
        Self::raw(tag as u8, value)
    }

    /// Create an entry with a tag outside [`TlvTag`] (e.g. an AD type)
    pub fn raw(tag: u8, value: Vec<u8>) -> Result<Self> {
        if value.len() > MAX_VALUE_LEN {
            return Err(ProtocolError::ValueTooLarge(value.len()));
        }
        Ok(Self { tag, value })
    }

    fn fixed(tag: TlvTag, value: &[u8]) -> Self {
        Self { tag: tag as u8, value: value.to_vec() }
    }

    pub fn tag(&self) -> Option<TlvTag> {
        TlvTag::from_u8(self.tag)
    }

    /// Address record, tagged IDENTITY for identity addresses and RPA otherwise
    pub fn address(addr: &Address) -> Self {
        let tag = if addr.is_identity() { TlvTag::Identity } else { TlvTag::Rpa };
        Self::fixed(tag, &addr.to_wire())
    }

    /// Address record with an explicit tag, used where both an RPA and its
    /// identity travel in the same payload
    pub fn address_as(tag: TlvTag, addr: &Address) -> Self {
        Self::fixed(tag, &addr.to_wire())
    }

    pub fn error_code(rc: i32) -> Self {
        Self::fixed(TlvTag::ErrorCode, &rc.to_le_bytes())
    }

    pub fn rssi(rssi: i8) -> Self {
        Self::fixed(TlvTag::Rssi, &rssi.to_le_bytes())
    }

    pub fn sid(sid: u8) -> Self {
        Self::fixed(TlvTag::Sid, &[sid])
    }

    pub fn pa_interval(interval: u16) -> Self {
        Self::fixed(TlvTag::PaInterval, &interval.to_le_bytes())
    }

    /// Broadcast id as carried in commands (3 octets)
    pub fn broadcast_id24(id: BroadcastId) -> Self {
        Self::fixed(TlvTag::BroadcastId, &id.value().to_le_bytes()[..3])
    }

    /// Broadcast id as carried in events (4 octets)
    pub fn broadcast_id32(id: BroadcastId) -> Self {
        Self::fixed(TlvTag::BroadcastId, &id.value().to_le_bytes())
    }

    pub fn source_id(id: u8) -> Self {
        Self::fixed(TlvTag::SourceId, &[id])
    }

    pub fn volume(volume: u8) -> Self {
        Self::fixed(TlvTag::Volume, &[volume])
    }

    pub fn mute(mute: u8) -> Self {
        Self::fixed(TlvTag::Mute, &[mute])
    }

    pub fn set_rank(rank: u8) -> Self {
        Self::fixed(TlvTag::SetRank, &[rank])
    }

    pub fn set_size(size: u8) -> Self {
        Self::fixed(TlvTag::SetSize, &[size])
    }

    pub fn pa_sync_attempt(attempts: u8) -> Self {
        Self::fixed(TlvTag::PaSyncAttempt, &[attempts])
    }

    pub fn sirk(sirk: &[u8; KEY_SIZE]) -> Self {
        Self::fixed(TlvTag::Sirk, sirk)
    }

    pub fn broadcast_code(code: &[u8; KEY_SIZE]) -> Self {
        Self::fixed(TlvTag::BroadcastCode, code)
    }

    pub fn big_info(info: &BigInfo) -> Self {
        Self::fixed(TlvTag::BigInfo, &info.to_bytes())
    }

    /// One little-endian u32 bitmap per subgroup
    pub fn bis_sync(bitmaps: &[u32]) -> Result<Self> {
        let value = bitmaps.iter().flat_map(|b| b.to_le_bytes()).collect();
        Self::new(TlvTag::BisSync, value)
    }

    pub fn base(data: &[u8]) -> Result<Self> {
        Self::new(TlvTag::Base, data.to_vec())
    }

    pub fn name(complete: bool, name: &[u8]) -> Result<Self> {
        let tag = if complete { TlvTag::CompleteName } else { TlvTag::ShortenedName };
        Self::new(tag, name.to_vec())
    }

    pub fn as_u8(&self) -> Result<u8> {
        self.value.first().copied().ok_or(ProtocolError::InvalidField {
            field: "u8 record",
            reason: "empty value".to_string(),
        })
    }

    pub fn as_u16(&self) -> Result<u16> {
        let bytes: [u8; 2] = self.prefix("u16 record")?;
        Ok(u16::from_le_bytes(bytes))
    }

    pub fn as_i32(&self) -> Result<i32> {
        let bytes: [u8; 4] = self.prefix("i32 record")?;
        Ok(i32::from_le_bytes(bytes))
    }

    pub fn as_address(&self) -> Result<Address> {
        Address::from_wire(&self.value)
    }

    /// Accepts both the 3-octet command form and the 4-octet event form
    pub fn as_broadcast_id(&self) -> Result<BroadcastId> {
        match self.value.len() {
            3 => BroadcastId::from_le24(&self.value),
            4 => {
                let raw = u32::from_le_bytes(self.prefix("broadcast id")?);
                BroadcastId::try_from(raw)
            }
            n => Err(ProtocolError::InvalidField {
                field: "broadcast id",
                reason: format!("unexpected length {n}"),
            }),
        }
    }

    pub fn as_key(&self) -> Result<[u8; KEY_SIZE]> {
        self.value.as_slice().try_into().map_err(|_| ProtocolError::InvalidField {
            field: "key",
            reason: format!("expected {} bytes, got {}", KEY_SIZE, self.value.len()),
        })
    }

    pub fn as_bis_sync(&self) -> Result<Vec<u32>> {
        if self.value.len() % 4 != 0 {
            return Err(ProtocolError::InvalidField {
                field: "bis sync",
                reason: format!("length {} is not a multiple of 4", self.value.len()),
            });
        }
        Ok(self
            .value
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    fn prefix<const N: usize>(&self, field: &'static str) -> Result<[u8; N]> {
        self.value
            .get(..N)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| ProtocolError::InvalidField {
                field,
                reason: format!("expected {} bytes, got {}", N, self.value.len()),
            })
    }

    /// Size of this record once encoded
    pub fn encoded_len(&self) -> usize {
        2 + self.value.len()
    }

    /// Append this record to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        // Length covers the tag octet and the value
        out.push((self.value.len() + 1) as u8);
        out.push(self.tag);
        out.extend_from_slice(&self.value);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut encoded);
        encoded
    }

    /// Decode one record, returning it with the number of bytes consumed
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let Some(&len) = data.first() else {
            return Err(ProtocolError::Truncated { needed: 2, available: 0 });
        };
        if len == 0 {
            return Err(ProtocolError::MalformedTlv { offset: 0 });
        }

        let total = 1 + len as usize;
        if data.len() < total {
            return Err(ProtocolError::Truncated { needed: total, available: data.len() });
        }

        let entry = TlvEntry { tag: data[1], value: data[2..total].to_vec() };
        Ok((entry, total))
    }
}

/// Ordered collection of records forming a message payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlvCodec {
    entries: Vec<TlvEntry>,
}

impl TlvCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, entry: TlvEntry) {
        self.entries.push(entry);
    }

    /// Builder-style variant of [`TlvCodec::add_entry`]
    pub fn with(mut self, entry: TlvEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn entries(&self) -> &[TlvEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the last entry with a given tag; later records override earlier
    /// ones, matching how the controller parses repeated fields
    pub fn find(&self, tag: TlvTag) -> Option<&TlvEntry> {
        self.entries.iter().rev().find(|entry| entry.tag == tag as u8)
    }

    /// Find the address record, whichever of IDENTITY or RPA it is tagged with
    pub fn find_address(&self) -> Option<&TlvEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.tag == TlvTag::Identity as u8 || e.tag == TlvTag::Rpa as u8)
    }

    pub fn require(&self, tag: TlvTag, field: &'static str) -> Result<&TlvEntry> {
        self.find(tag).ok_or(ProtocolError::MissingField(field))
    }

    pub fn encode(&self) -> Vec<u8> {
        let len = self.entries.iter().map(TlvEntry::encoded_len).sum();
        let mut encoded = Vec::with_capacity(len);
        for entry in &self.entries {
            entry.encode_into(&mut encoded);
        }
        encoded
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut codec = TlvCodec::new();
        let mut offset = 0;

        while offset < data.len() {
            let (entry, consumed) = TlvEntry::decode(&data[offset..]).map_err(|e| match e {
                ProtocolError::MalformedTlv { .. } => ProtocolError::MalformedTlv { offset },
                other => other,
            })?;
            codec.add_entry(entry);
            offset += consumed;
        }

        Ok(codec)
    }
}
