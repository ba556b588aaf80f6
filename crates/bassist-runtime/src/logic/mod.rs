//! Assistant logic
//!
//! - `state`: everything the engine mutates, behind one lock
//! - `commands`: controller commands, run by the command worker
//! - `callbacks`: link-layer notifications, run by the dispatch task
//! - `task`: the two tasks that drive an [`Assistant`]
//!
//! Commands and notifications run on separate tasks. Commands may block on a
//! procedure gate or a PA sync outcome; notification handlers never block on
//! anything but link-layer calls, so the completions a command waits for
//! always get through.

pub mod callbacks;
pub mod commands;
pub mod state;
pub mod task;

pub use state::{AssistantState, AssistantStats};
pub use task::{CommandWorker, DispatchTask};

use std::sync::Arc;

use bassist_core::{Address, AdvertisingSid, AssistantConfig, ConnHandle, PaInterval};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::emitter::EventEmitter;
use crate::error::{AssistantError, Result};
use crate::gate::{GateStats, ProcedureGate};
use crate::link::LinkLayer;
use crate::managers::{
    BroadcastSource, CreateAck, DeleteTicket, PaSyncOutcome, PaSyncPhase, PaSyncSession, PaWatchdogExpired,
    ScanMask, SinkConnection,
};

// ----------------------------------------------------------------------------
// Assistant
// ----------------------------------------------------------------------------

/// The broadcast assistant engine
pub struct Assistant {
    config: AssistantConfig,
    link: Arc<dyn LinkLayer>,
    state: Mutex<AssistantState>,
    emitter: EventEmitter,
    add_gate: ProcedureGate,
    remove_gate: ProcedureGate,
}

impl Assistant {
    /// Create an assistant. The returned receiver carries PA watchdog
    /// expiries and must be fed back through [`Assistant::handle_watchdog`],
    /// which the dispatch task does.
    pub fn new(
        config: AssistantConfig,
        link: Arc<dyn LinkLayer>,
        emitter: EventEmitter,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PaWatchdogExpired>) {
        let (watchdog_tx, watchdog_rx) = mpsc::unbounded_channel();
        let state = AssistantState::new(&config, watchdog_tx);

        let assistant = Arc::new(Self {
            add_gate: ProcedureGate::new("add-source", config.gate_wait()),
            remove_gate: ProcedureGate::new("remove-source", config.gate_wait()),
            config,
            link,
            state: Mutex::new(state),
            emitter,
        });
        (assistant, watchdog_rx)
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    pub fn scan_mask(&self) -> ScanMask {
        self.state.lock().scan_mask
    }

    pub fn pa_phase(&self) -> PaSyncPhase {
        self.state.lock().pa.phase()
    }

    pub fn pa_session(&self) -> Option<PaSyncSession> {
        self.state.lock().pa.session().cloned()
    }

    pub fn source(&self, address: &Address) -> Option<BroadcastSource> {
        self.state.lock().registry.get(address).cloned()
    }

    pub fn registry_len(&self) -> usize {
        self.state.lock().registry.len()
    }

    pub fn set_members(&self) -> Vec<Address> {
        self.state.lock().set_context.members().to_vec()
    }

    pub fn connection(&self, conn: ConnHandle) -> Option<SinkConnection> {
        self.state.lock().sinks.get(conn).cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().sinks.len()
    }

    pub fn heartbeat_running(&self) -> bool {
        self.state.lock().heartbeat.is_running()
    }

    pub fn add_gate_stats(&self) -> GateStats {
        self.add_gate.stats()
    }

    pub fn remove_gate_stats(&self) -> GateStats {
        self.remove_gate.stats()
    }

    pub fn stats(&self) -> AssistantStats {
        self.state.lock().stats
    }

    pub(crate) fn stop_heartbeat(&self) {
        self.state.lock().heartbeat.stop();
    }

    // ------------------------------------------------------------------------
    // PA sync helpers
    // ------------------------------------------------------------------------

    /// Create a periodic sync. The receiver resolves when the session ends up
    /// synced or goes away.
    pub(crate) async fn create_pa_sync(
        &self,
        address: Address,
        sid: AdvertisingSid,
        interval: PaInterval,
        transfer: bool,
    ) -> Result<oneshot::Receiver<PaSyncOutcome>> {
        let (params, generation, outcome) = {
            let mut state = self.state.lock();
            let (params, generation) = state
                .pa
                .begin_create(address, sid, interval, transfer, &self.config)
                .ok_or(AssistantError::Busy)?;
            (params, generation, state.pa.subscribe())
        };

        if let Err(e) = self.link.create_pa_sync(&params).await {
            warn!("Could not create PA sync to {}: {}", address, e);
            self.state.lock().pa.create_failed(generation);
            return Err(e.into());
        }

        let ack = self.state.lock().pa.create_succeeded(generation);
        if ack == CreateAck::DeleteRequested {
            self.delete_pa_sync().await;
        }
        Ok(outcome)
    }

    /// Delete the active periodic sync, if any. Returns whether a sync was
    /// deleted.
    pub(crate) async fn delete_pa_sync(&self) -> bool {
        let ticket = self.state.lock().pa.begin_delete();
        match ticket {
            Some(ticket) => self.run_pa_delete(ticket).await,
            None => false,
        }
    }

    pub(crate) async fn run_pa_delete(&self, ticket: DeleteTicket) -> bool {
        let result = self.link.delete_pa_sync().await;
        if let Err(e) = &result {
            warn!("Failed to delete PA sync: {}", e);
        }
        self.state.lock().pa.finish_delete(ticket, result.is_ok());
        result.is_ok()
    }

    /// Hand the active sync to a sink; keep it only while a transfer is
    /// still expected to complete
    pub(crate) async fn transfer_pa_sync(&self, conn: ConnHandle) {
        info!("Transferring PA sync to {}", conn);
        if let Err(e) = self.link.transfer_pa_sync(conn).await {
            warn!("PA sync transfer to {} failed: {}", conn, e);
        }

        let pending = self.state.lock().pa.transfer_pending();
        if !pending {
            self.delete_pa_sync().await;
        }
    }

    /// Resume scanning after a connection attempt paused it
    pub(crate) async fn restart_scanning_if_needed(&self) {
        let mask = self.scan_mask();
        if mask.is_idle() {
            return;
        }
        debug!("Restarting scan ({})", mask);
        if let Err(e) = self.link.start_scan().await {
            warn!("Failed to restart scanning: {}", e);
            self.state.lock().scan_mask = ScanMask::IDLE;
        }
    }

    /// Release whatever gates `sink` holds
    pub(crate) fn release_gates(&self, sink: &SinkConnection) {
        if sink.holds_add_gate {
            self.add_gate.release();
        }
        if sink.holds_remove_gate {
            self.remove_gate.release();
        }
    }
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("config", &self.config)
            .field("add_gate", &self.add_gate)
            .field("remove_gate", &self.remove_gate)
            .finish_non_exhaustive()
    }
}
