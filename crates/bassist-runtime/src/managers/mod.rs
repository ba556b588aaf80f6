//! Stateful managers owned by the assistant
//!
//! Each manager keeps one slice of engine state and never calls the link
//! layer itself; the logic module drives them.

pub mod coordinated_set;
pub mod pa_sync;
pub mod receive_state;
pub mod registry;
pub mod scan;
pub mod sinks;

pub use coordinated_set::CoordinatedSetContext;
pub use pa_sync::{
    CreateAck, DeleteTicket, PaSyncManager, PaSyncOutcome, PaSyncPhase, PaSyncSession, PaSyncStats,
    PaWatchdogExpired,
};
pub use receive_state::{Anomaly, ReceiveStateTracker, TrackerUpdate, Transition};
pub use registry::{BroadcastSource, SourceRegistry};
pub use scan::{classify_sink, classify_source, ScanMask};
pub use sinks::{DiscoveryState, RemoveStep, Service, SinkConnection, SinkTable};
