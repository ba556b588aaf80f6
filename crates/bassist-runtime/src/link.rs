//! The link-layer collaborator
//!
//! The engine never talks to a radio directly. It issues calls through
//! [`LinkLayer`] and receives everything the stack reports back as
//! [`LinkEvent`]s on a channel owned by the dispatch task. Calls only start a
//! procedure; its completion always arrives later as an event.

use async_trait::async_trait;
use bassist_core::{
    Address, AdvertisingSid, BigInfo, BroadcastCode, BroadcastId, ConnHandle, PaInterval,
    ReceiveState, SetInfo, SourceId, SyncTimeout,
};

use crate::error::LinkError;

pub type LinkResult<T> = std::result::Result<T, LinkError>;

// ----------------------------------------------------------------------------
// Call Parameters
// ----------------------------------------------------------------------------

/// Parameters of a periodic advertising sync create call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaSyncParams {
    pub address: Address,
    pub sid: AdvertisingSid,
    pub skip: u16,
    pub timeout: SyncTimeout,
    pub filter_duplicates: bool,
}

/// Parameters of a remote add-source procedure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddSourceParams {
    pub address: Address,
    pub sid: AdvertisingSid,
    pub pa_interval: PaInterval,
    pub broadcast_id: BroadcastId,
    pub pa_sync: bool,
    /// BIS sync request, one bitmap per subgroup
    pub bis_sync: Vec<u32>,
}

/// Parameters of a remote modify-source procedure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifySourceParams {
    pub source_id: SourceId,
    pub pa_sync: bool,
    pub pa_interval: PaInterval,
    pub bis_sync: Vec<u32>,
}

// ----------------------------------------------------------------------------
// Reports
// ----------------------------------------------------------------------------

/// One received advertisement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub address: Address,
    pub rssi: i8,
    pub sid: AdvertisingSid,
    pub connectable: bool,
    /// Periodic advertising interval, zero when the advertiser has no train
    pub interval: PaInterval,
    /// Advertising data exactly as received
    pub data: Vec<u8>,
}

impl ScanReport {
    pub fn is_periodic(&self) -> bool {
        self.interval.0 != 0
    }
}

/// Notifications delivered by the link layer
///
/// `status` fields follow the collaborator's convention: zero is success,
/// anything else is its error code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    ScanReport(ScanReport),
    /// The radio stopped scanning on its own
    ScanTimeout,

    /// The active periodic sync is established
    PaSynced,
    /// The active periodic sync was lost or terminated by the controller
    PaTerminated { reason: u8 },
    /// Periodic advertising data received on the active sync
    PaData { address: Address, data: Vec<u8> },
    BigInfo { address: Address, info: BigInfo },

    Connected { conn: ConnHandle, address: Address, status: i32 },
    Disconnected { conn: ConnHandle, reason: u8 },
    SecurityChanged { conn: ConnHandle, status: i32 },
    IdentityResolved { conn: ConnHandle, rpa: Address, identity: Address },

    BassDiscovered { conn: ConnHandle, status: i32, receive_states: u8 },
    VcpDiscovered { conn: ConnHandle, status: i32 },
    CsipDiscovered { conn: ConnHandle, status: i32, sets: Vec<SetInfo> },
    VolumeState { conn: ConnHandle, status: i32, volume: u8, mute: u8 },

    ReceiveState { conn: ConnHandle, status: i32, state: ReceiveState },
    ReceiveStateRemoved { conn: ConnHandle, source_id: SourceId },
    SourceAdded { conn: ConnHandle, status: i32 },
    SourceModified { conn: ConnHandle, status: i32 },
    SourceRemoved { conn: ConnHandle, status: i32 },
}

// ----------------------------------------------------------------------------
// Link Layer Trait
// ----------------------------------------------------------------------------

/// Calls the engine makes into the Bluetooth stack
#[async_trait]
pub trait LinkLayer: Send + Sync {
    /// Start passive scanning
    async fn start_scan(&self) -> LinkResult<()>;
    async fn stop_scan(&self) -> LinkResult<()>;

    async fn create_pa_sync(&self, params: &PaSyncParams) -> LinkResult<()>;
    async fn delete_pa_sync(&self) -> LinkResult<()>;
    /// Hand the active periodic sync over to a connected sink
    async fn transfer_pa_sync(&self, conn: ConnHandle) -> LinkResult<()>;

    /// Initiate a connection; the outcome arrives as [`LinkEvent::Connected`]
    async fn connect(&self, address: &Address) -> LinkResult<()>;
    async fn disconnect(&self, conn: ConnHandle) -> LinkResult<()>;
    /// Remove the bond with `address`, or every bond when `None`
    async fn unpair(&self, address: Option<&Address>) -> LinkResult<()>;
    /// Request an encrypted, authenticated link
    async fn set_security(&self, conn: ConnHandle) -> LinkResult<()>;

    async fn discover_bass(&self, conn: ConnHandle) -> LinkResult<()>;
    async fn discover_vcp(&self, conn: ConnHandle) -> LinkResult<()>;
    async fn discover_csip(&self, conn: ConnHandle) -> LinkResult<()>;

    /// Both this controller and the peer support periodic sync transfer
    fn supports_past(&self, conn: ConnHandle) -> bool;

    async fn add_source(&self, conn: ConnHandle, params: &AddSourceParams) -> LinkResult<()>;
    async fn modify_source(&self, conn: ConnHandle, params: &ModifySourceParams) -> LinkResult<()>;
    async fn remove_source(&self, conn: ConnHandle, source_id: SourceId) -> LinkResult<()>;
    async fn set_broadcast_code(
        &self,
        conn: ConnHandle,
        source_id: SourceId,
        code: &BroadcastCode,
    ) -> LinkResult<()>;

    async fn set_volume(&self, conn: ConnHandle, volume: u8) -> LinkResult<()>;
    async fn set_mute(&self, conn: ConnHandle, muted: bool) -> LinkResult<()>;
}
