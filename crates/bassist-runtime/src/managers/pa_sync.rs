//! Periodic advertising sync manager
//!
//! Owns the single periodic sync session the controller may hold. The session
//! moves through `Idle -> Creating -> Syncing -> Synced` and back to `Idle`
//! through `Deleting`, remote termination, or a failed create. While the
//! session is `Syncing` a watchdog runs; if the sync is not established in
//! time the watchdog reports expiry and the session is deleted.
//!
//! The manager itself never calls the link layer. Callers take the returned
//! parameters or tickets, make the call without holding the state lock, and
//! report the result back.

use bassist_core::{Address, AdvertisingSid, AssistantConfig, PaInterval, SyncTimeout};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::link::PaSyncParams;

/// Watchdog expiry for the session with `generation`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaWatchdogExpired {
    pub generation: u64,
}

/// How a session a caller waited on ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaSyncOutcome {
    Synced,
    Terminated,
    TimedOut,
    Deleted,
    CreateFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaSyncPhase {
    Idle,
    /// Create call in flight
    Creating,
    /// Create accepted, waiting for the sync to establish
    Syncing,
    Synced,
    /// Delete call in flight
    Deleting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaSyncSession {
    pub address: Address,
    pub sid: AdvertisingSid,
    pub timeout: SyncTimeout,
    /// The sync is kept until a sink reports it has taken it over
    pub transfer_pending: bool,
    /// Watchdog deadline while syncing
    pub deadline: Option<Instant>,
    pub generation: u64,
}

/// What the caller of [`PaSyncManager::create_succeeded`] must do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateAck {
    /// Watchdog armed, nothing to do
    Armed,
    /// The sync established before the create call returned
    AlreadySynced,
    /// A delete was requested while creating; call `begin_delete` now
    DeleteRequested,
    /// The session was replaced meanwhile
    Stale,
}

/// Permission to issue one delete call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteTicket {
    generation: u64,
    previous: PaSyncPhase,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaSyncStats {
    pub created: u64,
    pub create_failed: u64,
    pub synced: u64,
    pub timed_out: u64,
    pub terminated: u64,
    pub deleted: u64,
}

#[derive(Debug)]
pub struct PaSyncManager {
    phase: PaSyncPhase,
    session: Option<PaSyncSession>,
    next_generation: u64,
    delete_requested: bool,
    watchdog: Option<JoinHandle<()>>,
    waiter: Option<oneshot::Sender<PaSyncOutcome>>,
    expiry_tx: mpsc::UnboundedSender<PaWatchdogExpired>,
    stats: PaSyncStats,
}

impl PaSyncManager {
    pub fn new(expiry_tx: mpsc::UnboundedSender<PaWatchdogExpired>) -> Self {
        Self {
            phase: PaSyncPhase::Idle,
            session: None,
            next_generation: 1,
            delete_requested: false,
            watchdog: None,
            waiter: None,
            expiry_tx,
            stats: PaSyncStats::default(),
        }
    }

    pub fn phase(&self) -> PaSyncPhase {
        self.phase
    }

    pub fn session(&self) -> Option<&PaSyncSession> {
        self.session.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.phase == PaSyncPhase::Idle
    }

    pub fn stats(&self) -> PaSyncStats {
        self.stats
    }

    pub fn transfer_pending(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.transfer_pending)
    }

    /// Clear the transfer mark, returning whether it was set
    pub fn take_transfer_pending(&mut self) -> bool {
        match self.session.as_mut() {
            Some(session) if session.transfer_pending => {
                session.transfer_pending = false;
                true
            }
            _ => false,
        }
    }

    /// Reserve the singleton for a new session. Returns `None` when a session
    /// already exists.
    pub fn begin_create(
        &mut self,
        address: Address,
        sid: AdvertisingSid,
        interval: PaInterval,
        transfer: bool,
        config: &AssistantConfig,
    ) -> Option<(PaSyncParams, u64)> {
        if !self.is_idle() {
            debug!("PA sync already active ({:?})", self.phase);
            return None;
        }

        let timeout = interval.sync_timeout(config.pa_timeout_ratio);
        let generation = self.next_generation;
        self.next_generation += 1;

        info!("PA sync create {} sid {} (timeout {:?})", address, sid, timeout.as_duration());
        self.phase = PaSyncPhase::Creating;
        self.delete_requested = false;
        self.session = Some(PaSyncSession {
            address,
            sid,
            timeout,
            transfer_pending: transfer,
            deadline: None,
            generation,
        });

        let params = PaSyncParams {
            address,
            sid,
            skip: config.pa_sync_skip,
            timeout,
            filter_duplicates: config.pa_sync_filter_duplicates,
        };
        Some((params, generation))
    }

    /// Register interest in how the current session ends. A previous waiter
    /// is dropped.
    pub fn subscribe(&mut self) -> oneshot::Receiver<PaSyncOutcome> {
        let (tx, rx) = oneshot::channel();
        self.waiter = Some(tx);
        rx
    }

    pub fn create_succeeded(&mut self, generation: u64) -> CreateAck {
        if !self.is_current(generation) {
            return CreateAck::Stale;
        }
        self.stats.created += 1;

        match self.phase {
            PaSyncPhase::Creating if self.delete_requested => {
                self.delete_requested = false;
                self.phase = PaSyncPhase::Syncing;
                CreateAck::DeleteRequested
            }
            PaSyncPhase::Creating => {
                self.phase = PaSyncPhase::Syncing;
                self.arm_watchdog(None);
                CreateAck::Armed
            }
            PaSyncPhase::Synced => CreateAck::AlreadySynced,
            _ => CreateAck::Stale,
        }
    }

    pub fn create_failed(&mut self, generation: u64) {
        if !self.is_current(generation) {
            return;
        }
        self.stats.create_failed += 1;
        self.clear();
        self.notify(PaSyncOutcome::CreateFailed);
    }

    pub fn on_synced(&mut self) -> bool {
        match self.phase {
            PaSyncPhase::Creating | PaSyncPhase::Syncing => {
                self.cancel_watchdog();
                self.phase = PaSyncPhase::Synced;
                self.stats.synced += 1;
                info!("PA synced");
                self.notify(PaSyncOutcome::Synced);
                true
            }
            _ => {
                debug!("PA synced in phase {:?}, ignoring", self.phase);
                false
            }
        }
    }

    pub fn on_terminated(&mut self) -> bool {
        if self.is_idle() {
            return false;
        }
        self.stats.terminated += 1;
        self.clear();
        self.notify(PaSyncOutcome::Terminated);
        true
    }

    /// Handle a watchdog expiry. Returns a delete ticket when the expiry is
    /// for the session still trying to sync.
    pub fn on_watchdog(&mut self, expired: PaWatchdogExpired) -> Option<DeleteTicket> {
        if self.phase != PaSyncPhase::Syncing || !self.is_current(expired.generation) {
            debug!("Stale PA watchdog for generation {}", expired.generation);
            return None;
        }
        warn!("PA sync create timeout");
        // expired; a failed delete starts a fresh wait
        self.cancel_watchdog();
        self.stats.timed_out += 1;
        self.notify(PaSyncOutcome::TimedOut);
        self.begin_delete()
    }

    /// Start deleting the session. Returns `None` when there is nothing to
    /// delete yet; a session still being created is deleted as soon as its
    /// create call returns.
    pub fn begin_delete(&mut self) -> Option<DeleteTicket> {
        match self.phase {
            PaSyncPhase::Idle | PaSyncPhase::Deleting => None,
            PaSyncPhase::Creating => {
                self.delete_requested = true;
                None
            }
            PaSyncPhase::Syncing | PaSyncPhase::Synced => {
                // keep the deadline so a failed delete resumes the same wait
                self.abort_watchdog();
                let generation = self.session.as_ref().map_or(0, |s| s.generation);
                let ticket = DeleteTicket { generation, previous: self.phase };
                self.phase = PaSyncPhase::Deleting;
                Some(ticket)
            }
        }
    }

    pub fn finish_delete(&mut self, ticket: DeleteTicket, ok: bool) {
        if self.phase != PaSyncPhase::Deleting || !self.is_current(ticket.generation) {
            return;
        }
        if ok {
            info!("PA sync deleted");
            self.stats.deleted += 1;
            self.clear();
            self.notify(PaSyncOutcome::Deleted);
            return;
        }

        self.phase = ticket.previous;
        if ticket.previous == PaSyncPhase::Syncing {
            let deadline = self.session.as_ref().and_then(|s| s.deadline);
            self.arm_watchdog(deadline);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.generation == generation)
    }

    fn clear(&mut self) {
        self.cancel_watchdog();
        self.phase = PaSyncPhase::Idle;
        self.session = None;
        self.delete_requested = false;
    }

    fn notify(&mut self, outcome: PaSyncOutcome) {
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.send(outcome);
        }
    }

    fn arm_watchdog(&mut self, deadline: Option<Instant>) {
        self.cancel_watchdog();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let deadline = deadline.unwrap_or_else(|| Instant::now() + session.timeout.as_duration());
        session.deadline = Some(deadline);

        let expired = PaWatchdogExpired { generation: session.generation };
        let tx = self.expiry_tx.clone();
        self.watchdog = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(expired);
        }));
    }

    fn abort_watchdog(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
    }

    fn cancel_watchdog(&mut self) {
        self.abort_watchdog();
        if let Some(session) = self.session.as_mut() {
            session.deadline = None;
        }
    }
}

impl Drop for PaSyncManager {
    fn drop(&mut self) {
        self.abort_watchdog();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn source() -> Address {
        Address::random([0x11, 0x22, 0x33, 0x44, 0x55, 0xC6])
    }

    fn manager() -> (PaSyncManager, mpsc::UnboundedReceiver<PaWatchdogExpired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PaSyncManager::new(tx), rx)
    }

    #[tokio::test]
    async fn test_single_session() {
        let (mut pa, _rx) = manager();
        let config = AssistantConfig::default();

        let (params, _) = pa.begin_create(source(), 2, PaInterval(160), false, &config).unwrap();
        assert_eq!(params.timeout, SyncTimeout(400));
        assert_eq!(params.skip, 5);
        assert!(pa.begin_create(source(), 2, PaInterval(160), false, &config).is_none());
        assert_eq!(pa.phase(), PaSyncPhase::Creating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_expiry_requests_delete() {
        let (mut pa, mut rx) = manager();
        let config = AssistantConfig::default();

        let (_, generation) = pa.begin_create(source(), 2, PaInterval(160), false, &config).unwrap();
        let mut outcome = pa.subscribe();
        assert_eq!(pa.create_succeeded(generation), CreateAck::Armed);
        assert!(pa.session().unwrap().deadline.is_some());

        // 160 * 1.25 ms * 20 = 4 s
        let expired = rx.recv().await.unwrap();
        assert_eq!(expired.generation, generation);

        let ticket = pa.on_watchdog(expired).unwrap();
        assert_eq!(outcome.try_recv().unwrap(), PaSyncOutcome::TimedOut);
        assert_eq!(pa.phase(), PaSyncPhase::Deleting);

        pa.finish_delete(ticket, true);
        assert!(pa.is_idle());
        assert!(pa.session().is_none());
        assert_eq!(pa.stats().timed_out, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synced_cancels_watchdog() {
        let (mut pa, mut rx) = manager();
        let config = AssistantConfig::default();

        let (_, generation) = pa.begin_create(source(), 1, PaInterval(8), false, &config).unwrap();
        pa.create_succeeded(generation);
        assert!(pa.on_synced());
        assert!(pa.session().unwrap().deadline.is_none());

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(pa.phase(), PaSyncPhase::Synced);
    }

    #[tokio::test]
    async fn test_sync_before_create_returns() {
        let (mut pa, _rx) = manager();
        let config = AssistantConfig::default();

        let (_, generation) =
            pa.begin_create(source(), 1, PaInterval::UNKNOWN, true, &config).unwrap();
        assert!(pa.on_synced());
        assert_eq!(pa.create_succeeded(generation), CreateAck::AlreadySynced);
        assert!(pa.transfer_pending());
        assert!(pa.take_transfer_pending());
        assert!(!pa.transfer_pending());
    }

    #[tokio::test]
    async fn test_delete_while_creating() {
        let (mut pa, _rx) = manager();
        let config = AssistantConfig::default();

        let (_, generation) = pa.begin_create(source(), 1, PaInterval(8), false, &config).unwrap();
        assert!(pa.begin_delete().is_none());
        assert_eq!(pa.create_succeeded(generation), CreateAck::DeleteRequested);

        let ticket = pa.begin_delete().unwrap();
        pa.finish_delete(ticket, true);
        assert!(pa.is_idle());
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_session() {
        let (mut pa, _rx) = manager();
        let config = AssistantConfig::default();

        let (_, generation) = pa.begin_create(source(), 1, PaInterval(8), false, &config).unwrap();
        pa.create_succeeded(generation);
        pa.on_synced();

        let ticket = pa.begin_delete().unwrap();
        pa.finish_delete(ticket, false);
        assert_eq!(pa.phase(), PaSyncPhase::Synced);
        assert!(pa.session().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delete_resumes_watchdog() {
        let (mut pa, mut rx) = manager();
        let config = AssistantConfig::default();

        let (_, generation) = pa.begin_create(source(), 1, PaInterval(160), false, &config).unwrap();
        pa.create_succeeded(generation);
        let deadline = pa.session().unwrap().deadline.unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let ticket = pa.begin_delete().unwrap();
        pa.finish_delete(ticket, false);
        assert_eq!(pa.phase(), PaSyncPhase::Syncing);
        assert_eq!(pa.session().unwrap().deadline, Some(deadline));

        let expired = rx.recv().await.unwrap();
        assert_eq!(expired.generation, generation);
        assert_eq!(Instant::now(), deadline);
    }

    #[tokio::test]
    async fn test_create_failure_and_termination() {
        let (mut pa, _rx) = manager();
        let config = AssistantConfig::default();

        let (_, generation) = pa.begin_create(source(), 1, PaInterval(8), false, &config).unwrap();
        let mut outcome = pa.subscribe();
        pa.create_failed(generation);
        assert!(pa.is_idle());
        assert_eq!(outcome.try_recv().unwrap(), PaSyncOutcome::CreateFailed);

        let (_, generation) = pa.begin_create(source(), 1, PaInterval(8), false, &config).unwrap();
        pa.create_succeeded(generation);
        let mut outcome = pa.subscribe();
        assert!(pa.on_terminated());
        assert_eq!(outcome.try_recv().unwrap(), PaSyncOutcome::Terminated);
        assert!(!pa.on_terminated());
        assert_eq!(pa.create_succeeded(generation), CreateAck::Stale);
    }
}
