//! Typed events sent to the controller

use serde::{Deserialize, Serialize};

use crate::advertising::DeviceName;
use crate::errors::{ProtocolError, Result};
use crate::protocol::message::{EventSubtype, Message};
use crate::protocol::tlv::{TlvCodec, TlvEntry, TlvTag};
use crate::receive_state::{EncryptionState, PaSyncState};
use crate::types::{Address, AdvertisingSid, BigInfo, BroadcastId, PaInterval, Sirk, SourceId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SourceFound {
        /// Advertising data exactly as received
        advertising_data: Vec<u8>,
        rssi: i8,
        address: Address,
        name: Option<DeviceName>,
        sid: AdvertisingSid,
        pa_interval: PaInterval,
        broadcast_id: BroadcastId,
    },
    SinkFound {
        advertising_data: Vec<u8>,
        rssi: i8,
        address: Address,
        name: Option<DeviceName>,
    },
    SetMemberFound {
        advertising_data: Vec<u8>,
        address: Address,
    },
    SinkConnected { address: Address, rc: i32 },
    SinkDisconnected { address: Address, rc: i32 },
    SourceAdded { address: Address, broadcast_id: BroadcastId, rc: i32 },
    SourceRemoved { rc: i32 },
    PaState {
        state: PaSyncState,
        address: Address,
        broadcast_id: BroadcastId,
        source_id: SourceId,
    },
    BisSync {
        synced: bool,
        address: Address,
        broadcast_id: BroadcastId,
        source_id: SourceId,
    },
    Encryption { state: EncryptionState, address: Address, source_id: SourceId },
    IdentityResolved { rpa: Address, identity: Address },
    /// `base` is the raw periodic advertising data the BASE was found in
    BaseFound { base: Vec<u8>, address: Address },
    BigInfo { address: Address, info: BigInfo },
    VolumeState { address: Address, volume: u8, mute: u8, rc: i32 },
    VolumeControlFound { address: Address },
    SetIdentifierFound { address: Address, rank: u8, set_size: u8, sirk: Sirk },
    ScanStopped { rc: i32 },
    Heartbeat { counter: u8 },
}

impl Event {
    pub fn subtype(&self) -> Result<EventSubtype> {
        let subtype = match self {
            Event::SourceFound { .. } => EventSubtype::SourceFound,
            Event::SinkFound { .. } => EventSubtype::SinkFound,
            Event::SetMemberFound { .. } => EventSubtype::SetMemberFound,
            Event::SinkConnected { .. } => EventSubtype::SinkConnected,
            Event::SinkDisconnected { .. } => EventSubtype::SinkDisconnected,
            Event::SourceAdded { .. } => EventSubtype::SourceAdded,
            Event::SourceRemoved { .. } => EventSubtype::SourceRemoved,
            Event::PaState { state, .. } => match state {
                PaSyncState::NotSynced => EventSubtype::PaNotSynced,
                PaSyncState::InfoRequested => EventSubtype::PaInfoRequested,
                PaSyncState::Synced => EventSubtype::PaSynced,
                PaSyncState::Failed => EventSubtype::PaFailed,
                PaSyncState::NoPast => EventSubtype::PaNoPast,
                PaSyncState::Unknown(v) => return Err(unreportable("pa sync state", *v)),
            },
            Event::BisSync { synced: true, .. } => EventSubtype::BisSynced,
            Event::BisSync { synced: false, .. } => EventSubtype::BisNotSynced,
            Event::Encryption { state, .. } => match state {
                EncryptionState::NotEncrypted => EventSubtype::EncNotEncrypted,
                EncryptionState::BroadcastCodeRequired => EventSubtype::EncBroadcastCodeRequired,
                EncryptionState::Decrypting => EventSubtype::EncDecrypting,
                EncryptionState::BadCode => EventSubtype::EncBadCode,
                EncryptionState::Unknown(v) => return Err(unreportable("encryption state", *v)),
            },
            Event::IdentityResolved { .. } => EventSubtype::IdentityResolved,
            Event::BaseFound { .. } => EventSubtype::SourceBaseFound,
            Event::BigInfo { .. } => EventSubtype::SourceBigInfo,
            Event::VolumeState { .. } => EventSubtype::VolumeState,
            Event::VolumeControlFound { .. } => EventSubtype::VolumeControlFound,
            Event::SetIdentifierFound { .. } => EventSubtype::SetIdentifierFound,
            Event::ScanStopped { .. } => EventSubtype::ScanStopped,
            Event::Heartbeat { .. } => EventSubtype::Heartbeat,
        };
        Ok(subtype)
    }

    /// Encode into an event frame
    pub fn to_message(&self) -> Result<Message> {
        let subtype = self.subtype()?;
        let mut payload = Vec::new();
        let mut tlv = TlvCodec::new();

        match self {
            Event::SourceFound {
                advertising_data,
                rssi,
                address,
                name,
                sid,
                pa_interval,
                broadcast_id,
            } => {
                payload.extend_from_slice(advertising_data);
                tlv.add_entry(TlvEntry::rssi(*rssi));
                tlv.add_entry(TlvEntry::address(address));
                if let Some(name) = name {
                    tlv.add_entry(TlvEntry::name(name.complete, &name.name)?);
                }
                tlv.add_entry(TlvEntry::sid(*sid));
                tlv.add_entry(TlvEntry::pa_interval(pa_interval.0));
                tlv.add_entry(TlvEntry::broadcast_id32(*broadcast_id));
            }
            Event::SinkFound { advertising_data, rssi, address, name } => {
                payload.extend_from_slice(advertising_data);
                tlv.add_entry(TlvEntry::rssi(*rssi));
                tlv.add_entry(TlvEntry::address(address));
                if let Some(name) = name {
                    tlv.add_entry(TlvEntry::name(name.complete, &name.name)?);
                }
            }
            Event::SetMemberFound { advertising_data, address } => {
                payload.extend_from_slice(advertising_data);
                tlv.add_entry(TlvEntry::address(address));
            }
            Event::SinkConnected { address, rc } | Event::SinkDisconnected { address, rc } => {
                tlv.add_entry(TlvEntry::address(address));
                tlv.add_entry(TlvEntry::error_code(*rc));
            }
            Event::SourceAdded { address, broadcast_id, rc } => {
                tlv.add_entry(TlvEntry::address(address));
                tlv.add_entry(TlvEntry::broadcast_id32(*broadcast_id));
                tlv.add_entry(TlvEntry::error_code(*rc));
            }
            Event::SourceRemoved { rc } | Event::ScanStopped { rc } => {
                tlv.add_entry(TlvEntry::error_code(*rc));
            }
            Event::PaState { address, broadcast_id, source_id, .. }
            | Event::BisSync { address, broadcast_id, source_id, .. } => {
                tlv.add_entry(TlvEntry::address(address));
                tlv.add_entry(TlvEntry::broadcast_id32(*broadcast_id));
                tlv.add_entry(TlvEntry::source_id(*source_id));
            }
            Event::Encryption { address, source_id, .. } => {
                tlv.add_entry(TlvEntry::address(address));
                tlv.add_entry(TlvEntry::source_id(*source_id));
            }
            Event::IdentityResolved { rpa, identity } => {
                tlv.add_entry(TlvEntry::address_as(TlvTag::Rpa, rpa));
                tlv.add_entry(TlvEntry::address_as(TlvTag::Identity, identity));
            }
            Event::BaseFound { base, address } => {
                tlv.add_entry(TlvEntry::base(base)?);
                tlv.add_entry(TlvEntry::address(address));
            }
            Event::BigInfo { address, info } => {
                tlv.add_entry(TlvEntry::address(address));
                tlv.add_entry(TlvEntry::big_info(info));
            }
            Event::VolumeState { address, volume, mute, rc } => {
                tlv.add_entry(TlvEntry::address(address));
                tlv.add_entry(TlvEntry::volume(*volume));
                tlv.add_entry(TlvEntry::mute(*mute));
                tlv.add_entry(TlvEntry::error_code(*rc));
            }
            Event::VolumeControlFound { address } => {
                tlv.add_entry(TlvEntry::address(address));
            }
            Event::SetIdentifierFound { address, rank, set_size, sirk } => {
                tlv.add_entry(TlvEntry::address(address));
                tlv.add_entry(TlvEntry::set_rank(*rank));
                tlv.add_entry(TlvEntry::set_size(*set_size));
                tlv.add_entry(TlvEntry::sirk(sirk));
            }
            Event::Heartbeat { counter } => {
                let mut msg = Message::event(subtype, Vec::new());
                msg.seq = *counter;
                return Ok(msg);
            }
        }

        payload.extend_from_slice(&tlv.encode());
        Ok(Message::event(subtype, payload))
    }
}

fn unreportable(field: &'static str, value: u8) -> ProtocolError {
    ProtocolError::InvalidField { field, reason: format!("unknown value {value:#04x}") }
}
