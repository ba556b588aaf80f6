//! Periodic heartbeat events

use std::time::Duration;

use bassist_core::Event;
use tokio::task::JoinHandle;
use tracing::info;

use crate::emitter::EventEmitter;

#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Self { interval, task: None }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Start the heartbeat if stopped, stop it if running. Returns whether it
    /// is running afterwards.
    pub fn toggle(&mut self, emitter: &EventEmitter) -> bool {
        if self.is_running() {
            self.stop();
            false
        } else {
            self.start(emitter);
            true
        }
    }

    pub fn start(&mut self, emitter: &EventEmitter) {
        if self.is_running() {
            return;
        }
        info!("Heartbeat started ({:?})", self.interval);

        let emitter = emitter.clone();
        let period = self.interval;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            let mut counter: u8 = 0;
            loop {
                ticker.tick().await;
                emitter.emit(Event::Heartbeat { counter });
                counter = counter.wrapping_add(1);
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Heartbeat stopped");
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bassist_core::protocol::EventSubtype;

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_counts_and_stops() {
        let (emitter, mut rx) = EventEmitter::channel(16);
        let mut heartbeat = Heartbeat::new(Duration::from_secs(1));

        assert!(heartbeat.toggle(&emitter));
        for expected in 0u8..3 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.subtype, EventSubtype::Heartbeat as u8);
            assert_eq!(msg.seq, expected);
            assert!(msg.payload.is_empty());
        }

        assert!(!heartbeat.toggle(&emitter));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }
}
