//! A recording link layer for tests
//!
//! [`MockLinkLayer`] succeeds on every call unless told otherwise, records the
//! call, and wakes anyone waiting for it. Completions are never generated;
//! tests inject them as [`LinkEvent`](crate::link::LinkEvent)s.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bassist_core::{Address, BroadcastCode, ConnHandle, SourceId};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::LinkError;
use crate::link::{AddSourceParams, LinkLayer, LinkResult, ModifySourceParams, PaSyncParams};

/// One call made into the link layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    StartScan,
    StopScan,
    CreatePaSync(PaSyncParams),
    DeletePaSync,
    TransferPaSync(ConnHandle),
    Connect(Address),
    Disconnect(ConnHandle),
    Unpair(Option<Address>),
    SetSecurity(ConnHandle),
    DiscoverBass(ConnHandle),
    DiscoverVcp(ConnHandle),
    DiscoverCsip(ConnHandle),
    AddSource(ConnHandle, AddSourceParams),
    ModifySource(ConnHandle, ModifySourceParams),
    RemoveSource(ConnHandle, SourceId),
    SetBroadcastCode(ConnHandle, SourceId, BroadcastCode),
    SetVolume(ConnHandle, u8),
    SetMute(ConnHandle, bool),
}

impl LinkCall {
    /// Operation name, as carried by [`LinkError::op`]
    pub fn op(&self) -> &'static str {
        match self {
            LinkCall::StartScan => "start_scan",
            LinkCall::StopScan => "stop_scan",
            LinkCall::CreatePaSync(_) => "create_pa_sync",
            LinkCall::DeletePaSync => "delete_pa_sync",
            LinkCall::TransferPaSync(_) => "transfer_pa_sync",
            LinkCall::Connect(_) => "connect",
            LinkCall::Disconnect(_) => "disconnect",
            LinkCall::Unpair(_) => "unpair",
            LinkCall::SetSecurity(_) => "set_security",
            LinkCall::DiscoverBass(_) => "discover_bass",
            LinkCall::DiscoverVcp(_) => "discover_vcp",
            LinkCall::DiscoverCsip(_) => "discover_csip",
            LinkCall::AddSource(..) => "add_source",
            LinkCall::ModifySource(..) => "modify_source",
            LinkCall::RemoveSource(..) => "remove_source",
            LinkCall::SetBroadcastCode(..) => "set_broadcast_code",
            LinkCall::SetVolume(..) => "set_volume",
            LinkCall::SetMute(..) => "set_mute",
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<LinkCall>,
    failures: HashMap<&'static str, i32>,
    past: bool,
}

#[derive(Debug, Default)]
pub struct MockLinkLayer {
    state: Mutex<MockState>,
    recorded: Notify,
}

impl MockLinkLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call to `op` fail with `code`
    pub fn fail(&self, op: &'static str, code: i32) {
        self.state.lock().failures.insert(op, code);
    }

    pub fn clear_failure(&self, op: &str) {
        self.state.lock().failures.remove(op);
    }

    /// Report PAST support for every connection
    pub fn set_past_support(&self, supported: bool) {
        self.state.lock().past = supported;
    }

    pub fn calls(&self) -> Vec<LinkCall> {
        self.state.lock().calls.clone()
    }

    /// Calls of one operation, in order
    pub fn calls_to(&self, op: &str) -> Vec<LinkCall> {
        self.state.lock().calls.iter().filter(|c| c.op() == op).cloned().collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| c.op() == op).count()
    }

    pub fn last(&self, op: &str) -> Option<LinkCall> {
        self.state.lock().calls.iter().rev().find(|c| c.op() == op).cloned()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Wait until `op` has been called at least `n` times
    pub async fn wait_for(&self, op: &str, n: usize) {
        loop {
            let notified = self.recorded.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count(op) >= n {
                return;
            }
            notified.await;
        }
    }

    /// [`MockLinkLayer::wait_for`] bounded by `limit`. Returns whether the
    /// calls arrived in time.
    pub async fn wait_for_within(&self, op: &str, n: usize, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.wait_for(op, n)).await.is_ok()
    }

    fn record(&self, call: LinkCall) -> LinkResult<()> {
        let op = call.op();
        let failure = {
            let mut state = self.state.lock();
            state.calls.push(call);
            state.failures.get(op).copied()
        };
        self.recorded.notify_waiters();

        match failure {
            Some(code) => Err(LinkError::new(op, code)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LinkLayer for MockLinkLayer {
    async fn start_scan(&self) -> LinkResult<()> {
        self.record(LinkCall::StartScan)
    }

    async fn stop_scan(&self) -> LinkResult<()> {
        self.record(LinkCall::StopScan)
    }

    async fn create_pa_sync(&self, params: &PaSyncParams) -> LinkResult<()> {
        self.record(LinkCall::CreatePaSync(params.clone()))
    }

    async fn delete_pa_sync(&self) -> LinkResult<()> {
        self.record(LinkCall::DeletePaSync)
    }

    async fn transfer_pa_sync(&self, conn: ConnHandle) -> LinkResult<()> {
        self.record(LinkCall::TransferPaSync(conn))
    }

    async fn connect(&self, address: &Address) -> LinkResult<()> {
        self.record(LinkCall::Connect(*address))
    }

    async fn disconnect(&self, conn: ConnHandle) -> LinkResult<()> {
        self.record(LinkCall::Disconnect(conn))
    }

    async fn unpair(&self, address: Option<&Address>) -> LinkResult<()> {
        self.record(LinkCall::Unpair(address.copied()))
    }

    async fn set_security(&self, conn: ConnHandle) -> LinkResult<()> {
        self.record(LinkCall::SetSecurity(conn))
    }

    async fn discover_bass(&self, conn: ConnHandle) -> LinkResult<()> {
        self.record(LinkCall::DiscoverBass(conn))
    }

    async fn discover_vcp(&self, conn: ConnHandle) -> LinkResult<()> {
        self.record(LinkCall::DiscoverVcp(conn))
    }

    async fn discover_csip(&self, conn: ConnHandle) -> LinkResult<()> {
        self.record(LinkCall::DiscoverCsip(conn))
    }

    fn supports_past(&self, _conn: ConnHandle) -> bool {
        self.state.lock().past
    }

    async fn add_source(&self, conn: ConnHandle, params: &AddSourceParams) -> LinkResult<()> {
        self.record(LinkCall::AddSource(conn, params.clone()))
    }

    async fn modify_source(&self, conn: ConnHandle, params: &ModifySourceParams) -> LinkResult<()> {
        self.record(LinkCall::ModifySource(conn, params.clone()))
    }

    async fn remove_source(&self, conn: ConnHandle, source_id: SourceId) -> LinkResult<()> {
        self.record(LinkCall::RemoveSource(conn, source_id))
    }

    async fn set_broadcast_code(
        &self,
        conn: ConnHandle,
        source_id: SourceId,
        code: &BroadcastCode,
    ) -> LinkResult<()> {
        self.record(LinkCall::SetBroadcastCode(conn, source_id, *code))
    }

    async fn set_volume(&self, conn: ConnHandle, volume: u8) -> LinkResult<()> {
        self.record(LinkCall::SetVolume(conn, volume))
    }

    async fn set_mute(&self, conn: ConnHandle, muted: bool) -> LinkResult<()> {
        self.record(LinkCall::SetMute(conn, muted))
    }
}
