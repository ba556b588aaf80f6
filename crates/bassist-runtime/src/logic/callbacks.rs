//! Link-layer notifications
//!
//! Runs on the dispatch task, one notification at a time and in arrival
//! order. Handlers may call into the link layer but never wait on a gate or a
//! sync outcome.

use std::mem;

use bassist_core::{
    AdvertisementSummary, Address, Base, BroadcastId, ConnHandle, Event, PaSyncState,
    ReceiveState, SetInfo, SourceId,
};
use tracing::{debug, error, info, warn};

use super::Assistant;
use crate::link::{LinkEvent, ScanReport};
use crate::managers::{
    classify_sink, classify_source, PaWatchdogExpired, RemoveStep, ScanMask, Service,
    SinkConnection, Transition,
};

/// What a modify-source completion leads to
enum ModifyFollowUp {
    Remove(SourceId),
    Abort,
}

impl Assistant {
    pub async fn handle_link_event(&self, event: LinkEvent) {
        self.state.lock().stats.link_events += 1;

        match event {
            LinkEvent::ScanReport(report) => self.on_scan_report(report).await,
            LinkEvent::ScanTimeout => self.on_scan_timeout(),

            LinkEvent::PaSynced => {
                self.state.lock().pa.on_synced();
            }
            LinkEvent::PaTerminated { reason } => {
                info!("PA terminated (reason {:#04x})", reason);
                self.state.lock().pa.on_terminated();
            }
            LinkEvent::PaData { address, data } => self.on_pa_data(address, data).await,
            LinkEvent::BigInfo { address, info } => {
                info!(
                    "BIGinfo received from {} (num_bis = {}, {})",
                    address,
                    info.num_bis,
                    if info.encrypted { "encrypted" } else { "not encrypted" }
                );
                self.emitter.emit(Event::BigInfo { address, info });
            }

            LinkEvent::Connected { conn, address, status } => {
                self.on_connected(conn, address, status).await
            }
            LinkEvent::Disconnected { conn, reason } => self.on_disconnected(conn, reason),
            LinkEvent::SecurityChanged { conn, status } => {
                self.on_security_changed(conn, status).await
            }
            LinkEvent::IdentityResolved { conn, rpa, identity } => {
                self.on_identity_resolved(conn, rpa, identity)
            }

            LinkEvent::BassDiscovered { conn, status, receive_states } => {
                self.on_bass_discovered(conn, status, receive_states).await
            }
            LinkEvent::VcpDiscovered { conn, status } => self.on_vcp_discovered(conn, status),
            LinkEvent::CsipDiscovered { conn, status, sets } => {
                self.on_csip_discovered(conn, status, &sets)
            }
            LinkEvent::VolumeState { conn, status, volume, mute } => {
                self.on_volume_state(conn, status, volume, mute)
            }

            LinkEvent::ReceiveState { conn, status, state } => {
                self.on_receive_state(conn, status, state).await
            }
            LinkEvent::ReceiveStateRemoved { conn, source_id } => {
                info!("Receive state for source {} removed on {}", source_id, conn);
                self.emitter.emit(Event::SourceRemoved { rc: 0 });
            }
            LinkEvent::SourceAdded { conn, status } => self.on_source_added(conn, status),
            LinkEvent::SourceModified { conn, status } => {
                self.on_source_modified(conn, status).await
            }
            LinkEvent::SourceRemoved { conn, status } => self.on_source_removed(conn, status),
        }
    }

    /// Delete a sync whose watchdog expired before it was established
    pub async fn handle_watchdog(&self, expired: PaWatchdogExpired) {
        let ticket = self.state.lock().pa.on_watchdog(expired);
        if let Some(ticket) = ticket {
            self.run_pa_delete(ticket).await;
        }
    }

    // ------------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------------

    async fn on_scan_report(&self, report: ScanReport) {
        let mask = self.scan_mask();
        if mask.is_idle() {
            return;
        }
        let summary = AdvertisementSummary::parse(&report.data);

        if mask.contains(ScanMask::SOURCE) {
            if let Some(broadcast_id) = classify_source(&report, &summary) {
                self.on_source_found(&report, &summary, broadcast_id).await;
            }
        }

        if mask.contains(ScanMask::SINK) && classify_sink(&report, &summary) {
            debug!("Broadcast sink found ({})", report.address);
            self.state.lock().stats.sinks_found += 1;
            self.emitter.emit(Event::SinkFound {
                advertising_data: report.data.clone(),
                rssi: report.rssi,
                address: report.address,
                name: summary.name.clone(),
            });
        }

        if mask.contains(ScanMask::SET_MEMBER) && report.connectable {
            self.on_set_member_candidate(&report).await;
        }
    }

    async fn on_source_found(
        &self,
        report: &ScanReport,
        summary: &AdvertisementSummary,
        broadcast_id: BroadcastId,
    ) {
        debug!("Broadcast source found ({}, {})", broadcast_id, report.address);

        let try_sync = {
            let mut state = self.state.lock();
            state.stats.sources_found += 1;
            let pa_idle = state.pa.is_idle();
            match state.registry.upsert(report.address, report.sid, report.interval) {
                Some(source) => pa_idle && source.sync_attempts_remaining > 0,
                None => false,
            }
        };

        if try_sync {
            match self.create_pa_sync(report.address, report.sid, report.interval, false).await {
                Ok(_) => {
                    self.state.lock().registry.consume_attempt(&report.address);
                }
                Err(e) => info!("Could not create PA sync to {}: {}", report.address, e),
            }
        }

        self.emitter.emit(Event::SourceFound {
            advertising_data: report.data.clone(),
            rssi: report.rssi,
            address: report.address,
            name: summary.name.clone(),
            sid: report.sid,
            pa_interval: report.interval,
            broadcast_id,
        });
    }

    async fn on_set_member_candidate(&self, report: &ScanReport) {
        let stop_radio = {
            let mut state = self.state.lock();
            if !state.set_context.consider(&report.address, &report.data) {
                return;
            }
            state.stats.set_members_found += 1;
            self.emitter.emit(Event::SetMemberFound {
                advertising_data: report.data.clone(),
                address: report.address,
            });

            if !state.set_context.is_complete() {
                return;
            }
            info!("All set members found");
            state.scan_mask.remove(ScanMask::SET_MEMBER);
            state.scan_mask.is_idle()
        };

        if stop_radio {
            if let Err(e) = self.link.stop_scan().await {
                error!("Failed to stop scanning: {}", e);
                // the radio is still scanning
                self.state.lock().scan_mask.insert(ScanMask::SET_MEMBER);
            }
        }
    }

    fn on_scan_timeout(&self) {
        info!("Scan timeout");
        self.state.lock().scan_mask = ScanMask::IDLE;
        self.emitter.emit(Event::ScanStopped { rc: 0 });
    }

    // ------------------------------------------------------------------------
    // Periodic advertising
    // ------------------------------------------------------------------------

    async fn on_pa_data(&self, address: Address, data: Vec<u8>) {
        let from_active = self.state.lock().pa.session().is_some_and(|s| s.address == address);
        if !from_active {
            debug!("PA data from {} is not from the active sync", address);
            return;
        }
        if Base::from_ad(&data).is_none() {
            return;
        }

        info!("BASE found ({})", address);
        let transfer_pending = {
            let mut state = self.state.lock();
            state.registry.clear_countdown(&address);
            state.stats.bases_found += 1;
            state.pa.transfer_pending()
        };
        self.emitter.emit(Event::BaseFound { base: data, address });

        if !transfer_pending {
            self.delete_pa_sync().await;
        }
    }

    // ------------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------------

    async fn on_connected(&self, conn: ConnHandle, address: Address, status: i32) {
        if status != 0 {
            error!("Connection to {} failed ({})", address, status);
            self.emitter.emit(Event::SinkConnected { address, rc: status });
            self.restart_scanning_if_needed().await;
            return;
        }

        info!("Connected to {} ({})", address, conn);
        self.state
            .lock()
            .sinks
            .insert(SinkConnection::new(conn, address, self.config.bis_sync_failure));

        if let Err(e) = self.link.set_security(conn).await {
            error!("Setting security on {} failed: {}", address, e);
            self.disconnect_quietly(conn).await;
            self.emitter.emit(Event::SinkConnected { address, rc: e.code });
            self.restart_scanning_if_needed().await;
        }
    }

    fn on_disconnected(&self, conn: ConnHandle, reason: u8) {
        let sink = self.state.lock().sinks.remove(conn);
        let Some(sink) = sink else {
            debug!("Disconnected {} was not tracked", conn);
            return;
        };

        info!("Disconnected from {} (reason {:#04x})", sink.address, reason);
        self.release_gates(&sink);
        self.emitter.emit(Event::SinkDisconnected { address: sink.address, rc: 0 });
    }

    async fn on_security_changed(&self, conn: ConnHandle, status: i32) {
        let address = self.state.lock().sinks.get(conn).map(|sink| sink.address);
        let Some(address) = address else {
            warn!("Security changed on untracked {}", conn);
            return;
        };

        if status != 0 {
            error!("Failed to change security on {} ({})", address, status);
            self.disconnect_quietly(conn).await;
            self.restart_scanning_if_needed().await;
            return;
        }

        info!("Security established with {}, discovering services", address);
        self.discover_services(conn).await;
    }

    /// Start every discovery not yet run on `conn`
    async fn discover_services(&self, conn: ConnHandle) {
        let (bass, vcp, csip) = {
            let mut state = self.state.lock();
            let Some(sink) = state.sinks.get_mut(conn) else {
                return;
            };
            (sink.bass.start(), sink.vcp.start(), sink.csip.start())
        };

        if bass {
            if let Err(e) = self.link.discover_bass(conn).await {
                error!("Failed to start BASS discovery on {}: {}", conn, e);
                self.finish_discovery(conn, Service::Bass, false);
                self.disconnect_quietly(conn).await;
                self.restart_scanning_if_needed().await;
                return;
            }
        }
        if vcp {
            if let Err(e) = self.link.discover_vcp(conn).await {
                warn!("Failed to start volume control discovery on {}: {}", conn, e);
                self.finish_discovery(conn, Service::VolumeControl, false);
            }
        }
        if csip {
            if let Err(e) = self.link.discover_csip(conn).await {
                warn!("Failed to start set discovery on {}: {}", conn, e);
                self.finish_discovery(conn, Service::CoordinatedSet, false);
            }
        }
    }

    /// Record a discovery result, returning the sink's address when it is
    /// still connected
    fn finish_discovery(&self, conn: ConnHandle, service: Service, ok: bool) -> Option<Address> {
        let mut state = self.state.lock();
        let sink = state.sinks.get_mut(conn)?;
        sink.discovery_mut(service).finish(ok);
        Some(sink.address)
    }

    async fn on_bass_discovered(&self, conn: ConnHandle, status: i32, receive_states: u8) {
        let Some(address) = self.finish_discovery(conn, Service::Bass, status == 0) else {
            return;
        };

        if status != 0 {
            error!("BASS discovery on {} failed ({})", address, status);
            self.disconnect_quietly(conn).await;
            self.restart_scanning_if_needed().await;
            return;
        }

        info!("BASS discovered on {} ({} receive states)", address, receive_states);
        self.emitter.emit(Event::SinkConnected { address, rc: 0 });
        self.restart_scanning_if_needed().await;
    }

    fn on_vcp_discovered(&self, conn: ConnHandle, status: i32) {
        let Some(address) = self.finish_discovery(conn, Service::VolumeControl, status == 0) else {
            return;
        };
        if status != 0 {
            warn!("Volume control could not be discovered on {} ({})", address, status);
            return;
        }
        info!("Volume control found on {}", address);
        self.emitter.emit(Event::VolumeControlFound { address });
    }

    fn on_csip_discovered(&self, conn: ConnHandle, status: i32, sets: &[SetInfo]) {
        let set = sets.first().copied().filter(|_| status == 0);
        let address = {
            let mut state = self.state.lock();
            let Some(sink) = state.sinks.get_mut(conn) else {
                return;
            };
            sink.csip.finish(set.is_some());
            sink.set_info = set;
            sink.address
        };

        if status != 0 {
            error!("Coordinated set could not be discovered on {} ({})", address, status);
            return;
        }
        let Some(set) = set else {
            warn!("{} has no sets", address);
            return;
        };

        info!("Found {} sets on {} (rank {}, size {})", sets.len(), address, set.rank, set.set_size);
        self.emitter.emit(Event::SetIdentifierFound {
            address,
            rank: set.rank,
            set_size: set.set_size,
            sirk: set.sirk,
        });
    }

    fn on_volume_state(&self, conn: ConnHandle, status: i32, volume: u8, mute: u8) {
        let address = self.state.lock().sinks.get(conn).map(|sink| sink.address);
        let Some(address) = address else {
            return;
        };
        info!("Volume state from {}: volume {}, mute {} ({})", address, volume, mute, status);
        self.emitter.emit(Event::VolumeState { address, volume, mute, rc: status });
    }

    fn on_identity_resolved(&self, conn: ConnHandle, rpa: Address, identity: Address) {
        info!("Identity resolved {} -> {}", rpa, identity);
        if let Some(sink) = self.state.lock().sinks.get_mut(conn) {
            sink.address = identity;
        }
        self.emitter.emit(Event::IdentityResolved { rpa, identity });
    }

    async fn disconnect_quietly(&self, conn: ConnHandle) {
        if let Err(e) = self.link.disconnect(conn).await {
            error!("Failed to disconnect {}: {}", conn, e);
        }
    }

    // ------------------------------------------------------------------------
    // Receive states
    // ------------------------------------------------------------------------

    async fn on_receive_state(&self, conn: ConnHandle, status: i32, state: ReceiveState) {
        if status != 0 {
            warn!("Receive state read on {} failed ({})", conn, status);
            return;
        }

        let (address, update) = {
            let mut guard = self.state.lock();
            let Some(sink) = guard.sinks.get_mut(conn) else {
                debug!("Receive state from untracked {}", conn);
                return;
            };
            (sink.address, sink.tracker.update(&state))
        };
        if let Some(anomaly) = update.anomaly {
            warn!("Dropping rest of receive state update from {}: {:?}", address, anomaly);
        }

        for transition in update.transitions {
            match transition {
                Transition::Encryption(encryption) => {
                    self.emitter.emit(Event::Encryption {
                        state: encryption,
                        address,
                        source_id: state.source_id,
                    });
                }
                Transition::PaSync(pa_state) => {
                    self.on_remote_pa_state(conn, pa_state).await;
                    self.emitter.emit(Event::PaState {
                        state: pa_state,
                        address,
                        broadcast_id: state.broadcast_id,
                        source_id: state.source_id,
                    });
                }
                Transition::BisSync { synced } => {
                    info!("BIS {} on {}", if synced { "synced" } else { "not synced" }, address);
                    self.emitter.emit(Event::BisSync {
                        synced,
                        address,
                        broadcast_id: state.broadcast_id,
                        source_id: state.source_id,
                    });
                }
            }
        }
    }

    /// Move our own sync along with what the sink reports about its sync
    async fn on_remote_pa_state(&self, conn: ConnHandle, pa_state: PaSyncState) {
        match pa_state {
            PaSyncState::InfoRequested => {
                let active = self.state.lock().pa.session().is_some();
                if active {
                    self.transfer_pa_sync(conn).await;
                }
            }
            PaSyncState::Synced | PaSyncState::Failed | PaSyncState::NoPast => {
                let was_pending = self.state.lock().pa.take_transfer_pending();
                if was_pending {
                    debug!("Transfer settled ({:?}), dropping our PA sync", pa_state);
                    self.delete_pa_sync().await;
                }
            }
            PaSyncState::NotSynced | PaSyncState::Unknown(_) => {}
        }
    }

    // ------------------------------------------------------------------------
    // Source procedure completions
    // ------------------------------------------------------------------------

    fn on_source_added(&self, conn: ConnHandle, status: i32) {
        let (address, broadcast_id, held) = {
            let mut state = self.state.lock();
            let fallback = state.last_broadcast_id;
            let Some(sink) = state.sinks.get_mut(conn) else {
                debug!("Add-source completion from untracked {}", conn);
                return;
            };
            let broadcast_id = sink.pending_add.take().or(fallback).unwrap_or_default();
            (sink.address, broadcast_id, mem::take(&mut sink.holds_add_gate))
        };
        if held {
            self.add_gate.release();
        }

        if status != 0 {
            error!("Add source on {} failed ({})", address, status);
        } else {
            info!("Source {} added on {}", broadcast_id, address);
        }
        self.emitter.emit(Event::SourceAdded { address, broadcast_id, rc: status });
    }

    async fn on_source_modified(&self, conn: ConnHandle, status: i32) {
        let follow_up = {
            let mut state = self.state.lock();
            let Some(sink) = state.sinks.get_mut(conn) else {
                return;
            };
            match sink.pending_remove {
                Some(RemoveStep::Modifying { source_id }) if status == 0 => {
                    sink.pending_remove = Some(RemoveStep::Removing { source_id });
                    ModifyFollowUp::Remove(source_id)
                }
                Some(RemoveStep::Modifying { .. }) => ModifyFollowUp::Abort,
                _ => {
                    debug!("Modify-source completion on {} with no removal pending", conn);
                    return;
                }
            }
        };

        match follow_up {
            ModifyFollowUp::Remove(source_id) => {
                info!("Source {} desynced on {}, removing", source_id, conn);
                if let Err(e) = self.link.remove_source(conn, source_id).await {
                    error!("Failed to remove source {} on {}: {}", source_id, conn, e);
                    self.finish_remove(conn);
                    self.emitter.emit(Event::SourceRemoved { rc: e.code });
                }
            }
            ModifyFollowUp::Abort => {
                error!("Modify source on {} failed ({})", conn, status);
                self.finish_remove(conn);
                self.emitter.emit(Event::SourceRemoved { rc: status });
            }
        }
    }

    fn on_source_removed(&self, conn: ConnHandle, status: i32) {
        self.finish_remove(conn);
        if status != 0 {
            error!("Remove source on {} failed ({})", conn, status);
            self.emitter.emit(Event::SourceRemoved { rc: status });
        } else {
            info!("Source removed on {}", conn);
        }
    }

    /// End the remove procedure on `conn` and hand back its gate
    fn finish_remove(&self, conn: ConnHandle) {
        let held = {
            let mut state = self.state.lock();
            match state.sinks.get_mut(conn) {
                Some(sink) => {
                    sink.pending_remove = None;
                    mem::take(&mut sink.holds_remove_gate)
                }
                None => false,
            }
        };
        if held {
            self.remove_gate.release();
        }
    }
}
