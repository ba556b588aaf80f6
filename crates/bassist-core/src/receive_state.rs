//! Receive state reported by a remote scan delegator

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::types::{Address, AdvertisingSid, BroadcastId, BroadcastCode, SourceId};

/// BIS sync value meaning "failed to sync" in a receive state and "no
/// preference" in an add-source request
pub const BIS_SYNC_FAILED: u32 = 0xFFFF_FFFF;

/// Alias of [`BIS_SYNC_FAILED`] used when building add-source requests
pub const BIS_SYNC_NO_PREFERENCE: u32 = BIS_SYNC_FAILED;

/// Periodic advertising sync state of the delegator for one source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaSyncState {
    NotSynced,
    InfoRequested,
    Synced,
    Failed,
    NoPast,
    /// A value outside the defined range
    Unknown(u8),
}

impl From<u8> for PaSyncState {
    fn from(value: u8) -> Self {
        match value {
            0x00 => PaSyncState::NotSynced,
            0x01 => PaSyncState::InfoRequested,
            0x02 => PaSyncState::Synced,
            0x03 => PaSyncState::Failed,
            0x04 => PaSyncState::NoPast,
            other => PaSyncState::Unknown(other),
        }
    }
}

impl From<PaSyncState> for u8 {
    fn from(state: PaSyncState) -> Self {
        match state {
            PaSyncState::NotSynced => 0x00,
            PaSyncState::InfoRequested => 0x01,
            PaSyncState::Synced => 0x02,
            PaSyncState::Failed => 0x03,
            PaSyncState::NoPast => 0x04,
            PaSyncState::Unknown(v) => v,
        }
    }
}

/// BIG encryption state of the delegator for one source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionState {
    NotEncrypted,
    BroadcastCodeRequired,
    Decrypting,
    BadCode,
    Unknown(u8),
}

impl From<u8> for EncryptionState {
    fn from(value: u8) -> Self {
        match value {
            0x00 => EncryptionState::NotEncrypted,
            0x01 => EncryptionState::BroadcastCodeRequired,
            0x02 => EncryptionState::Decrypting,
            0x03 => EncryptionState::BadCode,
            other => EncryptionState::Unknown(other),
        }
    }
}

impl From<EncryptionState> for u8 {
    fn from(state: EncryptionState) -> Self {
        match state {
            EncryptionState::NotEncrypted => 0x00,
            EncryptionState::BroadcastCodeRequired => 0x01,
            EncryptionState::Decrypting => 0x02,
            EncryptionState::BadCode => 0x03,
            EncryptionState::Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgroupState {
    pub bis_sync: u32,
    pub metadata: Vec<u8>,
}

impl SubgroupState {
    pub fn with_bis_sync(bis_sync: u32) -> Self {
        Self { bis_sync, metadata: Vec::new() }
    }
}

/// One receive state characteristic value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveState {
    pub source_id: SourceId,
    pub address: Address,
    pub sid: AdvertisingSid,
    pub broadcast_id: BroadcastId,
    pub pa_sync_state: PaSyncState,
    pub encryption: EncryptionState,
    /// Code the delegator rejected, present with [`EncryptionState::BadCode`]
    pub bad_code: Option<BroadcastCode>,
    pub subgroups: SmallVec<[SubgroupState; 4]>,
}

impl Default for ReceiveState {
    /// The all-zero state a connection starts from
    fn default() -> Self {
        Self {
            source_id: 0,
            address: Address::public([0; 6]),
            sid: 0,
            broadcast_id: BroadcastId::default(),
            pa_sync_state: PaSyncState::NotSynced,
            encryption: EncryptionState::NotEncrypted,
            bad_code: None,
            subgroups: SmallVec::new(),
        }
    }
}

impl ReceiveState {
    pub fn bis_sync(&self, index: usize) -> u32 {
        self.subgroups.get(index).map_or(0, |s| s.bis_sync)
    }
}
