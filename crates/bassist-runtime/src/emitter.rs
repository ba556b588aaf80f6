//! Event emitter
//!
//! Turns typed [`Event`]s into frames on the outbound channel. Events are sent
//! without waiting so callback handlers never block on a slow consumer; a full
//! channel drops the event and counts it. Responses are awaited instead, since
//! every command must get exactly one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bassist_core::{Event, Message};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::error::{AssistantError, Result};

#[derive(Debug, Default)]
struct EmitterCounters {
    events: AtomicU64,
    responses: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitterStats {
    pub events: u64,
    pub responses: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: mpsc::Sender<Message>,
    counters: Arc<EmitterCounters>,
}

impl EventEmitter {
    pub fn new(sender: mpsc::Sender<Message>) -> Self {
        Self { sender, counters: Arc::new(EmitterCounters::default()) }
    }

    /// Create an emitter together with the receiving end of its channel
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: Event) {
        let message = match event.to_message() {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping unencodable event {:?}: {}", event, e);
                return;
            }
        };
        debug!("Event {:#04x} ({} bytes)", message.subtype, message.payload.len());

        match self.sender.try_send(message) {
            Ok(()) => {
                self.counters.events.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(message)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Event channel full, dropping event {:#04x}", message.subtype);
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Event channel closed");
            }
        }
    }

    /// Send a RESPONSE for command `subtype`/`seq`
    pub async fn respond(&self, subtype: u8, seq: u8, rc: i32) -> Result<()> {
        self.sender
            .send(Message::response(subtype, seq, rc))
            .await
            .map_err(|_| AssistantError::ChannelClosed("response"))?;
        self.counters.responses.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> EmitterStats {
        EmitterStats {
            events: self.counters.events.load(Ordering::Relaxed),
            responses: self.counters.responses.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}
