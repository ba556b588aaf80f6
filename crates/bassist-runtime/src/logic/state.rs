//! Assistant state
//!
//! Everything the engine mutates lives in one [`AssistantState`] behind a
//! single lock. Handlers take the lock, decide, release it, and only then
//! call into the link layer.

use bassist_core::{AssistantConfig, BroadcastId};
use tokio::sync::mpsc;

use crate::heartbeat::Heartbeat;
use crate::managers::{
    CoordinatedSetContext, PaSyncManager, PaWatchdogExpired, ScanMask, SinkTable, SourceRegistry,
};

// ----------------------------------------------------------------------------
// Assistant State
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub struct AssistantState {
    /// Active scan targets
    pub scan_mask: ScanMask,
    /// Sources seen during the current source scan
    pub registry: SourceRegistry,
    pub set_context: CoordinatedSetContext,
    pub pa: PaSyncManager,
    pub sinks: SinkTable,
    pub heartbeat: Heartbeat,
    /// Broadcast id of the most recent add-source request
    pub last_broadcast_id: Option<BroadcastId>,
    pub stats: AssistantStats,
}

impl AssistantState {
    pub fn new(config: &AssistantConfig, watchdog_tx: mpsc::UnboundedSender<PaWatchdogExpired>) -> Self {
        let mut registry = SourceRegistry::new(config.source_capacity);
        registry.reset(config.default_pa_sync_attempts);

        Self {
            scan_mask: ScanMask::IDLE,
            registry,
            set_context: CoordinatedSetContext::new(),
            pa: PaSyncManager::new(watchdog_tx),
            sinks: SinkTable::new(),
            heartbeat: Heartbeat::new(config.heartbeat_interval()),
            last_broadcast_id: None,
            stats: AssistantStats::default(),
        }
    }
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssistantStats {
    pub commands: u64,
    pub link_events: u64,
    pub sources_found: u64,
    pub sinks_found: u64,
    pub set_members_found: u64,
    pub bases_found: u64,
}
