//! Controller commands
//!
//! Every command frame gets exactly one RESPONSE. Commands run one at a time
//! on the command worker and may wait on a procedure gate or a PA sync; they
//! never hold the state lock across a link-layer call.

use bassist_core::receive_state::BIS_SYNC_NO_PREFERENCE;
use bassist_core::{
    codes, AddSourceRequest, Address, AdvertisingSid, BroadcastCode, Command, ConnHandle, Event,
    Message, MessageType, PaInterval, ProtocolError, Sirk, SourceId,
};
use tracing::{debug, error, info, warn};

use super::Assistant;
use crate::error::{AssistantError, LinkError, Result};
use crate::link::{AddSourceParams, ModifySourceParams};
use crate::managers::{PaSyncOutcome, RemoveStep, ScanMask};

/// What a start-scan command targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTarget {
    Sink,
    Source { pa_sync_attempts: Option<u8> },
    SetMember { sirk: Sirk, set_size: u8 },
}

impl ScanTarget {
    pub fn mask(&self) -> ScanMask {
        match self {
            ScanTarget::Sink => ScanMask::SINK,
            ScanTarget::Source { .. } => ScanMask::SOURCE,
            ScanTarget::SetMember { .. } => ScanMask::SET_MEMBER,
        }
    }
}

/// Result of one procedure fanned out over every sink
#[derive(Debug, Default)]
struct FanOut {
    first_error: Option<LinkError>,
    gate_timed_out: bool,
}

impl FanOut {
    fn record(&mut self, error: LinkError) {
        self.first_error.get_or_insert(error);
    }

    fn into_result(self, gate: &'static str) -> Result<()> {
        match (self.first_error, self.gate_timed_out) {
            (Some(e), _) => Err(e.into()),
            (None, true) => Err(AssistantError::GateTimeout(gate)),
            (None, false) => Ok(()),
        }
    }
}

impl Assistant {
    /// Parse a command frame, run it, and send its RESPONSE
    pub async fn handle_message(&self, message: &Message) -> Result<()> {
        if message.kind != MessageType::Command {
            warn!("Ignoring {:?} frame from controller", message.kind);
            return Ok(());
        }

        let rc = match Command::from_message(message) {
            Ok(command) => self.execute(command).await,
            Err(ProtocolError::UnknownSubtype(subtype)) => {
                warn!("Unknown command {:#04x}", subtype);
                codes::FAILURE
            }
            Err(e) => {
                warn!("Malformed command {:#04x}: {}", message.subtype, e);
                AssistantError::from(e).code()
            }
        };
        self.emitter.respond(message.subtype, message.seq, rc).await
    }

    /// Run a command and return the code for its RESPONSE
    pub async fn execute(&self, command: Command) -> i32 {
        let subtype = command.subtype();
        self.state.lock().stats.commands += 1;
        debug!("Executing {:?}", subtype);

        let result = match command {
            Command::StartSinkScan => self.start_scan(ScanTarget::Sink).await,
            Command::StartSourceScan { pa_sync_attempts } => {
                self.start_scan(ScanTarget::Source { pa_sync_attempts }).await
            }
            Command::StartCsisScan { sirk, set_size } => {
                self.start_scan(ScanTarget::SetMember { sirk, set_size }).await
            }
            Command::StartScanAll => Err(AssistantError::Unsupported(subtype as u8)),
            Command::StopScan => self.stop_scan().await,
            Command::ConnectSink { address } => self.connect_sink(address).await,
            Command::DisconnectSink { address } => self.disconnect_sink(address).await,
            Command::AddSource(request) => self.add_source(request).await,
            Command::PaSync { address, sid, pa_interval } => {
                self.pa_sync(address, sid, pa_interval).await
            }
            Command::RemoveSource { source_id, num_subgroups } => {
                self.remove_source(source_id, num_subgroups).await
            }
            Command::SetBroadcastCode { source_id, code } => {
                self.set_broadcast_code(source_id, code).await
            }
            Command::SetVolume { address, volume } => self.set_volume(address, volume).await,
            Command::Mute { address } => self.set_mute(address, true).await,
            Command::Unmute { address } => self.set_mute(address, false).await,
            Command::Reset => self.reset().await,
            Command::Heartbeat => {
                self.toggle_heartbeat();
                Ok(())
            }
        };

        match result {
            Ok(()) => codes::OK,
            Err(e) => {
                warn!("{:?} failed: {}", subtype, e);
                e.code()
            }
        }
    }

    // ------------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------------

    pub async fn start_scan(&self, target: ScanTarget) -> Result<()> {
        if self.scan_mask().is_idle() {
            self.link.start_scan().await?;
        }

        let mut state = self.state.lock();
        match target {
            ScanTarget::Sink => {}
            ScanTarget::Source { pa_sync_attempts } => {
                let attempts = pa_sync_attempts.unwrap_or(self.config.default_pa_sync_attempts);
                state.registry.reset(attempts);
            }
            ScanTarget::SetMember { sirk, set_size } => {
                let connected = state.sinks.addresses();
                state.set_context.reset(sirk, set_size);
                state.set_context.seed_from_connections(&connected);
            }
        }
        state.scan_mask.insert(target.mask());
        info!("Scanning started ({})", state.scan_mask);
        Ok(())
    }

    pub async fn stop_scan(&self) -> Result<()> {
        if !self.scan_mask().is_idle() {
            self.link.stop_scan().await?;
            self.state.lock().scan_mask = ScanMask::IDLE;
            info!("Scanning stopped");
        }
        self.delete_pa_sync().await;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------------

    pub async fn connect_sink(&self, address: Address) -> Result<()> {
        info!("Connecting to {}", address);
        if !self.scan_mask().is_idle() {
            self.link.stop_scan().await?;
        }
        self.delete_pa_sync().await;

        let settle = self.config.connect_settle();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        if let Err(e) = self.link.connect(&address).await {
            error!("Failed creating connection to {}: {}", address, e);
            self.restart_scanning_if_needed().await;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn disconnect_sink(&self, address: Address) -> Result<()> {
        info!("Disconnecting {}", address);
        let conn = self.state.lock().sinks.by_address(&address).map(|sink| sink.handle);

        match conn {
            Some(conn) => {
                if let Err(e) = self.link.disconnect(conn).await {
                    warn!("Failed to disconnect {}: {}", address, e);
                    self.emitter.emit(Event::SinkDisconnected { address, rc: e.code });
                }
            }
            None => debug!("{} is not connected", address),
        }

        if let Err(e) = self.link.unpair(Some(&address)).await {
            warn!("Failed to unpair {}: {}", address, e);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Source procedures
    // ------------------------------------------------------------------------

    pub async fn add_source(&self, request: AddSourceRequest) -> Result<()> {
        info!("Adding broadcast source {} ({})", request.broadcast_id, request.address);

        if self.past_available() {
            self.sync_for_transfer(&request).await;
        }

        let mut bis_sync = request.bis_sync.clone();
        bis_sync.truncate(self.config.max_subgroups);
        if bis_sync.is_empty() {
            warn!("No subgroups requested, using one with no BIS preference");
            bis_sync.push(BIS_SYNC_NO_PREFERENCE);
        }
        let params = AddSourceParams {
            address: request.address,
            sid: request.sid,
            pa_interval: request.pa_interval,
            broadcast_id: request.broadcast_id,
            pa_sync: true,
            bis_sync,
        };

        let handles = {
            let mut state = self.state.lock();
            state.last_broadcast_id = Some(request.broadcast_id);
            state.sinks.handles()
        };

        let mut fan_out = FanOut::default();
        for conn in handles {
            let acquired = self.add_gate.acquire().await.is_acquired();
            fan_out.gate_timed_out |= !acquired;

            if !self.mark_add_pending(conn, acquired, &request) {
                continue;
            }

            info!("Adding broadcast source on {}", conn);
            if let Err(e) = self.link.add_source(conn, &params).await {
                error!("Failed to add source on {}: {}", conn, e);
                let mut state = self.state.lock();
                if let Some(sink) = state.sinks.get_mut(conn) {
                    sink.pending_add = None;
                    if acquired {
                        sink.holds_add_gate = false;
                        self.add_gate.release();
                    }
                }
                fan_out.record(e);
            }
        }
        fan_out.into_result(self.add_gate.name())
    }

    /// Prepare `conn` for an add-source call. Returns false when the sink went
    /// away while we waited on the gate.
    fn mark_add_pending(&self, conn: ConnHandle, acquired: bool, request: &AddSourceRequest) -> bool {
        let mut state = self.state.lock();
        match state.sinks.get_mut(conn) {
            Some(sink) => {
                sink.holds_add_gate |= acquired;
                sink.tracker.reset();
                sink.pending_add = Some(request.broadcast_id);
                true
            }
            None => {
                debug!("{} disconnected before add-source", conn);
                if acquired {
                    self.add_gate.release();
                }
                false
            }
        }
    }

    fn past_available(&self) -> bool {
        if !self.config.past_assisted_add {
            return false;
        }
        let handles = self.state.lock().sinks.handles();
        !handles.is_empty() && handles.iter().all(|&conn| self.link.supports_past(conn))
    }

    /// Sync to the source ourselves so the sinks can take the sync over
    async fn sync_for_transfer(&self, request: &AddSourceRequest) {
        info!("PAST available, syncing to {} first", request.address);
        self.delete_pa_sync().await;

        match self.create_pa_sync(request.address, request.sid, request.pa_interval, true).await {
            Ok(outcome) => {
                let outcome = outcome.await.unwrap_or(PaSyncOutcome::Terminated);
                info!("PA sync for transfer: {:?}", outcome);
            }
            Err(e) => warn!("Could not create PA sync for transfer: {}", e),
        }
    }

    pub async fn pa_sync(
        &self,
        address: Address,
        sid: AdvertisingSid,
        pa_interval: PaInterval,
    ) -> Result<()> {
        {
            let state = self.state.lock();
            if state.registry.get(&address).is_none() {
                return Err(AssistantError::UnknownSource(address));
            }
            if !state.pa.is_idle() {
                return Err(AssistantError::Busy);
            }
        }
        self.create_pa_sync(address, sid, pa_interval, false).await.map(|_| ())
    }

    pub async fn remove_source(&self, source_id: SourceId, num_subgroups: u8) -> Result<()> {
        info!("Removing broadcast source {} ({} subgroups)", source_id, num_subgroups);

        let subgroups = usize::from(num_subgroups).min(self.config.max_subgroups).max(1);
        let params = ModifySourceParams {
            source_id,
            pa_sync: false,
            pa_interval: PaInterval::UNKNOWN,
            bis_sync: vec![0; subgroups],
        };

        let handles = self.state.lock().sinks.handles();
        let mut fan_out = FanOut::default();
        for conn in handles {
            let acquired = self.remove_gate.acquire().await.is_acquired();
            fan_out.gate_timed_out |= !acquired;

            {
                let mut state = self.state.lock();
                let Some(sink) = state.sinks.get_mut(conn) else {
                    debug!("{} disconnected before remove-source", conn);
                    if acquired {
                        self.remove_gate.release();
                    }
                    continue;
                };
                sink.holds_remove_gate |= acquired;
                sink.pending_remove = Some(RemoveStep::Modifying { source_id });
            }

            if let Err(e) = self.link.modify_source(conn, &params).await {
                error!("Failed to modify source on {}: {}", conn, e);
                let mut state = self.state.lock();
                if let Some(sink) = state.sinks.get_mut(conn) {
                    sink.pending_remove = None;
                    if acquired {
                        sink.holds_remove_gate = false;
                        self.remove_gate.release();
                    }
                }
                fan_out.record(e);
            }
        }
        fan_out.into_result(self.remove_gate.name())
    }

    pub async fn set_broadcast_code(&self, source_id: SourceId, code: BroadcastCode) -> Result<()> {
        info!("Setting broadcast code for source {}", source_id);
        let handles = self.state.lock().sinks.handles();

        let mut fan_out = FanOut::default();
        for conn in handles {
            if let Err(e) = self.link.set_broadcast_code(conn, source_id, &code).await {
                error!("Failed to set broadcast code on {}: {}", conn, e);
                fan_out.record(e);
            }
        }
        fan_out.into_result("broadcast-code")
    }

    // ------------------------------------------------------------------------
    // Volume
    // ------------------------------------------------------------------------

    fn volume_target(&self, address: &Address) -> Result<ConnHandle> {
        let state = self.state.lock();
        let sink = state.sinks.by_address(address).ok_or(AssistantError::NoConnection(*address))?;
        if !sink.vcp.is_found() {
            return Err(AssistantError::NoVolumeControl(*address));
        }
        Ok(sink.handle)
    }

    pub async fn set_volume(&self, address: Address, volume: u8) -> Result<()> {
        let conn = self.volume_target(&address)?;
        self.link.set_volume(conn, volume).await.map_err(AssistantError::VolumeControl)
    }

    pub async fn set_mute(&self, address: Address, muted: bool) -> Result<()> {
        let conn = self.volume_target(&address)?;
        self.link.set_mute(conn, muted).await.map_err(AssistantError::VolumeControl)
    }

    // ------------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------------

    /// Stop everything and forget every bond
    pub async fn reset(&self) -> Result<()> {
        info!("Resetting");
        if let Err(e) = self.stop_scan().await {
            warn!("Failed to stop scanning during reset: {}", e);
        }

        let handles = self.state.lock().sinks.handles();
        for conn in handles {
            if let Err(e) = self.link.disconnect(conn).await {
                warn!("Failed to disconnect {}: {}", conn, e);
            }
        }
        if let Err(e) = self.link.unpair(None).await {
            error!("Failed to unpair all: {}", e);
        }

        self.state.lock().heartbeat.stop();
        Ok(())
    }

    pub fn toggle_heartbeat(&self) -> bool {
        let mut state = self.state.lock();
        state.heartbeat.toggle(&self.emitter)
    }
}
