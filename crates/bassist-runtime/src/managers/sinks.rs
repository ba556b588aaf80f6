//! Connected sinks
//!
//! One entry per live connection to a scan delegator. The entry carries the
//! receive-state tracker, per-service discovery progress, and which procedure
//! gates this connection currently holds.

use std::collections::HashMap;

use bassist_core::{Address, BisSyncFailurePolicy, BroadcastId, ConnHandle, SetInfo, SourceId};
use tracing::debug;

use crate::managers::receive_state::ReceiveStateTracker;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiscoveryState {
    #[default]
    NotStarted,
    Pending,
    Found,
    Failed,
}

impl DiscoveryState {
    /// Move to `Pending` unless discovery already ran or is running
    pub fn start(&mut self) -> bool {
        if *self != DiscoveryState::NotStarted {
            return false;
        }
        *self = DiscoveryState::Pending;
        true
    }

    pub fn finish(&mut self, ok: bool) {
        *self = if ok { DiscoveryState::Found } else { DiscoveryState::Failed };
    }

    pub fn is_found(self) -> bool {
        self == DiscoveryState::Found
    }
}

/// Services discovered on every sink after pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Bass,
    VolumeControl,
    CoordinatedSet,
}

/// Progress of a remove-source procedure on one sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveStep {
    /// Waiting for the modify that drops PA and BIS sync
    Modifying { source_id: SourceId },
    /// Waiting for the remove itself
    Removing { source_id: SourceId },
}

#[derive(Debug, Clone)]
pub struct SinkConnection {
    pub handle: ConnHandle,
    pub address: Address,
    pub tracker: ReceiveStateTracker,
    pub bass: DiscoveryState,
    pub vcp: DiscoveryState,
    pub csip: DiscoveryState,
    pub set_info: Option<SetInfo>,
    pub holds_add_gate: bool,
    pub holds_remove_gate: bool,
    /// Broadcast id of an add-source in flight
    pub pending_add: Option<BroadcastId>,
    pub pending_remove: Option<RemoveStep>,
}

impl SinkConnection {
    pub fn new(handle: ConnHandle, address: Address, policy: BisSyncFailurePolicy) -> Self {
        Self {
            handle,
            address,
            tracker: ReceiveStateTracker::new(policy),
            bass: DiscoveryState::default(),
            vcp: DiscoveryState::default(),
            csip: DiscoveryState::default(),
            set_info: None,
            holds_add_gate: false,
            holds_remove_gate: false,
            pending_add: None,
            pending_remove: None,
        }
    }

    pub fn discovery(&self, service: Service) -> DiscoveryState {
        match service {
            Service::Bass => self.bass,
            Service::VolumeControl => self.vcp,
            Service::CoordinatedSet => self.csip,
        }
    }

    pub fn discovery_mut(&mut self, service: Service) -> &mut DiscoveryState {
        match service {
            Service::Bass => &mut self.bass,
            Service::VolumeControl => &mut self.vcp,
            Service::CoordinatedSet => &mut self.csip,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SinkTable {
    sinks: HashMap<ConnHandle, SinkConnection>,
}

impl SinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new connection, replacing any stale entry with the same handle
    pub fn insert(&mut self, sink: SinkConnection) {
        debug!("Tracking {} ({})", sink.handle, sink.address);
        self.sinks.insert(sink.handle, sink);
    }

    pub fn remove(&mut self, handle: ConnHandle) -> Option<SinkConnection> {
        self.sinks.remove(&handle)
    }

    pub fn get(&self, handle: ConnHandle) -> Option<&SinkConnection> {
        self.sinks.get(&handle)
    }

    pub fn get_mut(&mut self, handle: ConnHandle) -> Option<&mut SinkConnection> {
        self.sinks.get_mut(&handle)
    }

    pub fn by_address(&self, address: &Address) -> Option<&SinkConnection> {
        self.sinks.values().find(|sink| &sink.address == address)
    }

    /// Connection handles in ascending order
    pub fn handles(&self) -> Vec<ConnHandle> {
        let mut handles: Vec<_> = self.sinks.keys().copied().collect();
        handles.sort();
        handles
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.handles()
            .into_iter()
            .filter_map(|handle| self.sinks.get(&handle).map(|sink| sink.address))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SinkConnection> {
        self.sinks.values()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}
