//! Typed commands received from the controller

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};
use crate::protocol::message::{CommandSubtype, Message, MessageType};
use crate::protocol::tlv::{TlvCodec, TlvEntry, TlvTag};
use crate::types::{Address, AdvertisingSid, BroadcastCode, BroadcastId, PaInterval, Sirk, SourceId};

/// Parameters of an add-source request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddSourceRequest {
    pub address: Address,
    pub sid: AdvertisingSid,
    pub pa_interval: PaInterval,
    pub broadcast_id: BroadcastId,
    /// Requested BIS sync bitmap, one entry per subgroup
    pub bis_sync: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    StartSinkScan,
    /// `pa_sync_attempts` overrides the configured per-source attempt count
    StartSourceScan { pa_sync_attempts: Option<u8> },
    StartScanAll,
    StartCsisScan { sirk: Sirk, set_size: u8 },
    StopScan,
    ConnectSink { address: Address },
    DisconnectSink { address: Address },
    AddSource(AddSourceRequest),
    PaSync { address: Address, sid: AdvertisingSid, pa_interval: PaInterval },
    RemoveSource { source_id: SourceId, num_subgroups: u8 },
    SetBroadcastCode { source_id: SourceId, code: BroadcastCode },
    SetVolume { address: Address, volume: u8 },
    Mute { address: Address },
    Unmute { address: Address },
    Reset,
    Heartbeat,
}

impl Command {
    pub fn subtype(&self) -> CommandSubtype {
        match self {
            Command::StartSinkScan => CommandSubtype::StartSinkScan,
            Command::StartSourceScan { .. } => CommandSubtype::StartSourceScan,
            Command::StartScanAll => CommandSubtype::StartScanAll,
            Command::StartCsisScan { .. } => CommandSubtype::StartCsisScan,
            Command::StopScan => CommandSubtype::StopScan,
            Command::ConnectSink { .. } => CommandSubtype::ConnectSink,
            Command::DisconnectSink { .. } => CommandSubtype::DisconnectSink,
            Command::AddSource(_) => CommandSubtype::AddSource,
            Command::PaSync { .. } => CommandSubtype::PaSync,
            Command::RemoveSource { .. } => CommandSubtype::RemoveSource,
            Command::SetBroadcastCode { .. } => CommandSubtype::BigBroadcastCode,
            Command::SetVolume { .. } => CommandSubtype::SetVolume,
            Command::Mute { .. } => CommandSubtype::Mute,
            Command::Unmute { .. } => CommandSubtype::Unmute,
            Command::Reset => CommandSubtype::Reset,
            Command::Heartbeat => CommandSubtype::Heartbeat,
        }
    }

    /// Parse a command frame. Unknown records are ignored; missing required
    /// records are an error.
    pub fn from_message(msg: &Message) -> Result<Self> {
        if msg.kind != MessageType::Command {
            return Err(ProtocolError::InvalidField {
                field: "message type",
                reason: format!("expected command, got {:?}", msg.kind),
            });
        }
        let subtype =
            CommandSubtype::from_u8(msg.subtype).ok_or(ProtocolError::UnknownSubtype(msg.subtype))?;
        let tlv = msg.records()?;

        let command = match subtype {
            CommandSubtype::StartSinkScan => Command::StartSinkScan,
            CommandSubtype::StartSourceScan => Command::StartSourceScan {
                pa_sync_attempts: tlv.find(TlvTag::PaSyncAttempt).map(TlvEntry::as_u8).transpose()?,
            },
            CommandSubtype::StartScanAll => Command::StartScanAll,
            CommandSubtype::StartCsisScan => Command::StartCsisScan {
                sirk: tlv.require(TlvTag::Sirk, "sirk")?.as_key()?,
                set_size: tlv.require(TlvTag::SetSize, "set size")?.as_u8()?,
            },
            CommandSubtype::StopScan => Command::StopScan,
            CommandSubtype::ConnectSink => Command::ConnectSink { address: address(&tlv)? },
            CommandSubtype::DisconnectSink => Command::DisconnectSink { address: address(&tlv)? },
            CommandSubtype::AddSource => Command::AddSource(AddSourceRequest {
                address: address(&tlv)?,
                sid: tlv.require(TlvTag::Sid, "sid")?.as_u8()?,
                pa_interval: pa_interval(&tlv)?,
                broadcast_id: tlv.require(TlvTag::BroadcastId, "broadcast id")?.as_broadcast_id()?,
                bis_sync: bis_sync(&tlv)?,
            }),
            CommandSubtype::PaSync => Command::PaSync {
                address: address(&tlv)?,
                sid: tlv.require(TlvTag::Sid, "sid")?.as_u8()?,
                pa_interval: pa_interval(&tlv)?,
            },
            CommandSubtype::RemoveSource => Command::RemoveSource {
                source_id: tlv.require(TlvTag::SourceId, "source id")?.as_u8()?,
                num_subgroups: bis_sync(&tlv)?.len().min(u8::MAX as usize) as u8,
            },
            CommandSubtype::BigBroadcastCode => Command::SetBroadcastCode {
                source_id: tlv.require(TlvTag::SourceId, "source id")?.as_u8()?,
                code: tlv.require(TlvTag::BroadcastCode, "broadcast code")?.as_key()?,
            },
            CommandSubtype::SetVolume => Command::SetVolume {
                address: address(&tlv)?,
                volume: tlv.require(TlvTag::Volume, "volume")?.as_u8()?,
            },
            CommandSubtype::Mute => Command::Mute { address: address(&tlv)? },
            CommandSubtype::Unmute => Command::Unmute { address: address(&tlv)? },
            CommandSubtype::Reset => Command::Reset,
            CommandSubtype::Heartbeat => Command::Heartbeat,
        };
        Ok(command)
    }

    /// Encode into a command frame
    pub fn to_message(&self, seq: u8) -> Result<Message> {
        let mut tlv = TlvCodec::new();
        match self {
            Command::StartSourceScan { pa_sync_attempts: Some(n) } => {
                tlv.add_entry(TlvEntry::pa_sync_attempt(*n));
            }
            Command::StartCsisScan { sirk, set_size } => {
                tlv.add_entry(TlvEntry::sirk(sirk));
                tlv.add_entry(TlvEntry::set_size(*set_size));
            }
            Command::ConnectSink { address }
            | Command::DisconnectSink { address }
            | Command::Mute { address }
            | Command::Unmute { address } => tlv.add_entry(TlvEntry::address(address)),
            Command::AddSource(req) => {
                tlv.add_entry(TlvEntry::address(&req.address));
                tlv.add_entry(TlvEntry::sid(req.sid));
                tlv.add_entry(TlvEntry::pa_interval(req.pa_interval.0));
                tlv.add_entry(TlvEntry::broadcast_id24(req.broadcast_id));
                if !req.bis_sync.is_empty() {
                    tlv.add_entry(TlvEntry::bis_sync(&req.bis_sync)?);
                }
            }
            Command::PaSync { address, sid, pa_interval } => {
                tlv.add_entry(TlvEntry::address(address));
                tlv.add_entry(TlvEntry::sid(*sid));
                tlv.add_entry(TlvEntry::pa_interval(pa_interval.0));
            }
            Command::RemoveSource { source_id, num_subgroups } => {
                tlv.add_entry(TlvEntry::source_id(*source_id));
                if *num_subgroups > 0 {
                    tlv.add_entry(TlvEntry::bis_sync(&vec![0; *num_subgroups as usize])?);
                }
            }
            Command::SetBroadcastCode { source_id, code } => {
                tlv.add_entry(TlvEntry::source_id(*source_id));
                tlv.add_entry(TlvEntry::broadcast_code(code));
            }
            Command::SetVolume { address, volume } => {
                tlv.add_entry(TlvEntry::address(address));
                tlv.add_entry(TlvEntry::volume(*volume));
            }
            Command::StartSinkScan
            | Command::StartSourceScan { pa_sync_attempts: None }
            | Command::StartScanAll
            | Command::StopScan
            | Command::Reset
            | Command::Heartbeat => {}
        }
        Ok(Message::command(self.subtype(), seq, tlv.encode()))
    }
}

fn address(tlv: &TlvCodec) -> Result<Address> {
    tlv.find_address().ok_or(ProtocolError::MissingField("address"))?.as_address()
}

fn pa_interval(tlv: &TlvCodec) -> Result<PaInterval> {
    Ok(tlv
        .find(TlvTag::PaInterval)
        .map(TlvEntry::as_u16)
        .transpose()?
        .map_or(PaInterval::UNKNOWN, PaInterval))
}

fn bis_sync(tlv: &TlvCodec) -> Result<Vec<u32>> {
    Ok(tlv.find(TlvTag::BisSync).map(TlvEntry::as_bis_sync).transpose()?.unwrap_or_default())
}
