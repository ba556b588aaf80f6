//! Tasks driving an assistant
//!
//! The dispatch task owns the link-event and watchdog channels; the command
//! worker owns the controller command channel. Both run until their inputs
//! close.

use std::sync::Arc;

use bassist_core::Message;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::Assistant;
use crate::error::AssistantError;
use crate::link::LinkEvent;
use crate::managers::PaWatchdogExpired;

// ----------------------------------------------------------------------------
// Dispatch Task
// ----------------------------------------------------------------------------

/// Feeds link-layer notifications and watchdog expiries into the assistant
pub struct DispatchTask {
    assistant: Arc<Assistant>,
    link_rx: mpsc::Receiver<LinkEvent>,
    watchdog_rx: mpsc::UnboundedReceiver<PaWatchdogExpired>,
}

impl DispatchTask {
    pub fn new(
        assistant: Arc<Assistant>,
        link_rx: mpsc::Receiver<LinkEvent>,
        watchdog_rx: mpsc::UnboundedReceiver<PaWatchdogExpired>,
    ) -> Self {
        Self { assistant, link_rx, watchdog_rx }
    }

    pub async fn run(mut self) {
        info!("Dispatch task starting");

        loop {
            tokio::select! {
                Some(event) = self.link_rx.recv() => {
                    self.assistant.handle_link_event(event).await;
                }
                Some(expired) = self.watchdog_rx.recv() => {
                    debug!("PA watchdog expired (generation {})", expired.generation);
                    self.assistant.handle_watchdog(expired).await;
                }
                else => {
                    debug!("All dispatch channels closed");
                    break;
                }
            }
        }

        info!("Dispatch task stopped");
    }
}

// ----------------------------------------------------------------------------
// Command Worker
// ----------------------------------------------------------------------------

/// Executes controller commands one at a time, in arrival order
pub struct CommandWorker {
    assistant: Arc<Assistant>,
    command_rx: mpsc::Receiver<Message>,
}

impl CommandWorker {
    pub fn new(assistant: Arc<Assistant>, command_rx: mpsc::Receiver<Message>) -> Self {
        Self { assistant, command_rx }
    }

    pub async fn run(mut self) {
        info!("Command worker starting");

        while let Some(message) = self.command_rx.recv().await {
            match self.assistant.handle_message(&message).await {
                Ok(()) => {}
                Err(AssistantError::ChannelClosed(what)) => {
                    error!("{} channel closed, stopping command worker", what);
                    break;
                }
                Err(e) => error!("Error handling command: {}", e),
            }
        }

        info!("Command worker stopped");
    }
}
