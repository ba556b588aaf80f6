//! Broadcast Assistant Runtime
//!
//! The orchestration engine of an LE Audio broadcast assistant:
//! - `Assistant`: scan control, PA sync, sink connections, receive-state
//!   tracking and the add/remove-source procedure gates
//! - `CommandWorker` and `DispatchTask`: the two tasks driving it
//! - `LinkLayer`: the Bluetooth stack the engine calls into
//! - `bridge`: controller frames over any byte stream
//!
//! `bassist-core` provides the protocol and domain types; this crate decides
//! what to do with them.

pub mod bridge;
pub mod builder;
pub mod emitter;
pub mod error;
pub mod gate;
pub mod heartbeat;
pub mod link;
pub mod logic;
pub mod managers;
pub mod testing;

pub use builder::{create_test_assistant, AssistantBuilder, AssistantHandle};
pub use emitter::{EmitterStats, EventEmitter};
pub use error::{AssistantError, LinkError, Result};
pub use gate::{GateAcquire, GateStats, ProcedureGate};
pub use link::{
    AddSourceParams, LinkEvent, LinkLayer, LinkResult, ModifySourceParams, PaSyncParams, ScanReport,
};
pub use logic::commands::ScanTarget;
pub use logic::{Assistant, AssistantStats, CommandWorker, DispatchTask};

// Re-export core types for convenience
pub use bassist_core::{AssistantConfig, Command, Event, Message, MessageType};
