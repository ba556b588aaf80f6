//! Assistant Builder API
//!
//! Wires an [`Assistant`] to its channels and spawns the dispatch task and
//! command worker. Consumers (the byte-stream bridge, tests) get back an
//! [`AssistantHandle`] carrying the command and link-event senders and the
//! outbound frame receiver.

use std::sync::Arc;
use std::time::Duration;

use bassist_core::{AssistantConfig, Message};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::emitter::EventEmitter;
use crate::error::{AssistantError, Result};
use crate::link::{LinkEvent, LinkLayer};
use crate::logic::{Assistant, CommandWorker, DispatchTask};

// ----------------------------------------------------------------------------
// Assistant Builder
// ----------------------------------------------------------------------------

pub struct AssistantBuilder {
    link: Arc<dyn LinkLayer>,
    config: AssistantConfig,
}

impl AssistantBuilder {
    pub fn new(link: Arc<dyn LinkLayer>) -> Self {
        Self { link, config: AssistantConfig::default() }
    }

    pub fn with_config(mut self, config: AssistantConfig) -> Self {
        self.config = config;
        self
    }

    /// Set channel buffer sizes
    pub fn channel_buffer_size(mut self, size: usize) -> Self {
        self.config.channel_buffer_size = size;
        self
    }

    /// Build the assistant and spawn its tasks
    pub async fn build_and_start(self) -> Result<AssistantHandle> {
        self.config.validate()?;
        let buffer = self.config.channel_buffer_size;
        info!("Building broadcast assistant (buffer {})", buffer);

        let (command_sender, command_receiver) = mpsc::channel(buffer);
        let (link_sender, link_receiver) = mpsc::channel(buffer);
        let (emitter, output_receiver) = EventEmitter::channel(buffer);

        let (assistant, watchdog_receiver) = Assistant::new(self.config, self.link, emitter);

        let dispatch = DispatchTask::new(assistant.clone(), link_receiver, watchdog_receiver);
        let worker = CommandWorker::new(assistant.clone(), command_receiver);
        let dispatch_handle = tokio::spawn(dispatch.run());
        let worker_handle = tokio::spawn(worker.run());

        info!("Broadcast assistant started");

        Ok(AssistantHandle {
            assistant,
            command_sender,
            link_sender,
            output_receiver: Some(output_receiver),
            dispatch_handle: Some(dispatch_handle),
            worker_handle: Some(worker_handle),
        })
    }
}

// ----------------------------------------------------------------------------
// Assistant Handle
// ----------------------------------------------------------------------------

/// Handle to a running assistant
pub struct AssistantHandle {
    assistant: Arc<Assistant>,
    command_sender: mpsc::Sender<Message>,
    link_sender: mpsc::Sender<LinkEvent>,
    output_receiver: Option<mpsc::Receiver<Message>>,
    dispatch_handle: Option<JoinHandle<()>>,
    worker_handle: Option<JoinHandle<()>>,
}

impl AssistantHandle {
    pub fn assistant(&self) -> &Arc<Assistant> {
        &self.assistant
    }

    /// Sender for framed controller commands
    pub fn command_sender(&self) -> mpsc::Sender<Message> {
        self.command_sender.clone()
    }

    /// Sender the link layer delivers its notifications on
    pub fn link_sender(&self) -> mpsc::Sender<LinkEvent> {
        self.link_sender.clone()
    }

    /// Take the receiver of outbound RESPONSE and EVENT frames (can only be
    /// called once)
    pub fn take_output_receiver(&mut self) -> Option<mpsc::Receiver<Message>> {
        self.output_receiver.take()
    }

    pub async fn send_command(&self, message: Message) -> Result<()> {
        self.command_sender
            .send(message)
            .await
            .map_err(|_| AssistantError::ChannelClosed("command"))
    }

    pub async fn deliver(&self, event: LinkEvent) -> Result<()> {
        self.link_sender
            .send(event)
            .await
            .map_err(|_| AssistantError::ChannelClosed("link event"))
    }

    pub fn is_running(&self) -> bool {
        let alive = |h: &Option<JoinHandle<()>>| h.as_ref().is_some_and(|h| !h.is_finished());
        alive(&self.dispatch_handle) && alive(&self.worker_handle)
    }

    /// Stop both tasks and the heartbeat
    pub async fn shutdown(&mut self) {
        info!("Shutting down broadcast assistant");
        self.assistant.stop_heartbeat();

        for handle in [self.worker_handle.take(), self.dispatch_handle.take()].into_iter().flatten() {
            handle.abort();
            if tokio::time::timeout(Duration::from_secs(1), handle).await.is_err() {
                warn!("Assistant task did not stop in time");
            }
        }
        info!("Broadcast assistant shut down");
    }
}

impl Drop for AssistantHandle {
    fn drop(&mut self) {
        for handle in [&self.worker_handle, &self.dispatch_handle].into_iter().flatten() {
            handle.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Convenience Functions
// ----------------------------------------------------------------------------

/// Start an assistant with [`AssistantConfig::testing`]
pub async fn create_test_assistant(link: Arc<dyn LinkLayer>) -> Result<AssistantHandle> {
    AssistantBuilder::new(link).with_config(AssistantConfig::testing()).build_and_start().await
}
