//! Broadcast Assistant Core
//!
//! Protocol and domain types for an LE Audio broadcast assistant: device
//! addresses and broadcast identifiers, the receive-state model reported by
//! scan delegators, advertising data and BASE parsing, coordinated set
//! identifier resolution, and the framed TLV protocol spoken with the
//! controller. Nothing in this crate talks to a radio.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod advertising;
pub mod base;
pub mod config;
pub mod csis;
pub mod errors;
pub mod protocol;
pub mod receive_state;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use advertising::{AdvertisementSummary, DeviceName};
pub use base::Base;
pub use config::{AssistantConfig, BisSyncFailurePolicy};
pub use errors::{codes, ConfigError, ProtocolError, Result};
pub use protocol::{AddSourceRequest, Command, Event, Message, MessageType};
pub use receive_state::{EncryptionState, PaSyncState, ReceiveState, SubgroupState};
pub use types::{
    Address, AddressType, AdvertisingSid, BigInfo, BroadcastCode, BroadcastId, ConnHandle,
    PaInterval, SetInfo, Sirk, SourceId, SyncTimeout,
};
