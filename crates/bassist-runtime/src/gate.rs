//! Procedure gates
//!
//! A gate admits one outstanding remote procedure at a time. Acquiring takes
//! the single permit and forgets it, so the permit is the outstanding-operation
//! token; the completion handler puts it back with [`ProcedureGate::release`].
//! Waiting is bounded so a lost completion cannot block the command worker
//! forever.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Result of waiting on a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAcquire {
    /// The caller now owns the permit and must arrange its release
    Acquired,
    /// The wait expired; the caller proceeds without owning the permit
    TimedOut,
}

impl GateAcquire {
    pub fn is_acquired(self) -> bool {
        self == GateAcquire::Acquired
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStats {
    pub acquired: u64,
    pub timed_out: u64,
    pub released: u64,
}

#[derive(Debug)]
pub struct ProcedureGate {
    name: &'static str,
    permit: Semaphore,
    wait: Duration,
    stats: Mutex<GateStats>,
}

impl ProcedureGate {
    pub fn new(name: &'static str, wait: Duration) -> Self {
        Self { name, permit: Semaphore::new(1), wait, stats: Mutex::new(GateStats::default()) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn acquire(&self) -> GateAcquire {
        match tokio::time::timeout(self.wait, self.permit.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                self.stats.lock().acquired += 1;
                debug!("{} gate acquired", self.name);
                GateAcquire::Acquired
            }
            Ok(Err(_)) => {
                warn!("{} gate closed", self.name);
                self.stats.lock().timed_out += 1;
                GateAcquire::TimedOut
            }
            Err(_) => {
                warn!("{} gate wait timed out after {:?}", self.name, self.wait);
                self.stats.lock().timed_out += 1;
                GateAcquire::TimedOut
            }
        }
    }

    /// Return the permit. Does nothing if the gate is already open, so a
    /// duplicate completion can never admit a second procedure.
    pub fn release(&self) -> bool {
        let mut stats = self.stats.lock();
        if self.permit.available_permits() > 0 {
            debug!("{} gate already open", self.name);
            return false;
        }
        self.permit.add_permits(1);
        stats.released += 1;
        debug!("{} gate released", self.name);
        true
    }

    pub fn is_held(&self) -> bool {
        self.permit.available_permits() == 0
    }

    pub fn stats(&self) -> GateStats {
        *self.stats.lock()
    }
}
