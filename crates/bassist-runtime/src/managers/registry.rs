//! Source registry
//!
//! Bounded table of broadcast sources seen during the current source scan,
//! keyed by device address. Each source carries a countdown of periodic sync
//! attempts that the scan controller may still spend on it.

use std::collections::HashMap;

use bassist_core::{Address, AdvertisingSid, PaInterval};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastSource {
    pub address: Address,
    pub sid: AdvertisingSid,
    pub pa_interval: PaInterval,
    pub sync_attempts_remaining: u8,
}

#[derive(Debug, Clone)]
pub struct SourceRegistry {
    capacity: usize,
    attempts: u8,
    sources: HashMap<Address, BroadcastSource>,
}

impl SourceRegistry {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, attempts: 0, sources: HashMap::with_capacity(capacity) }
    }

    /// Forget every source and grant `attempts` sync attempts to the sources
    /// of the next session
    pub fn reset(&mut self, attempts: u8) {
        self.sources.clear();
        self.attempts = attempts;
        debug!("Source registry reset ({} sync attempts per source)", attempts);
    }

    /// Look a source up, recording it first if it is new and there is room.
    /// Returns `None` only when the registry is full.
    pub fn upsert(
        &mut self,
        address: Address,
        sid: AdvertisingSid,
        pa_interval: PaInterval,
    ) -> Option<&mut BroadcastSource> {
        if !self.sources.contains_key(&address) {
            if self.sources.len() >= self.capacity {
                debug!("Source registry full, ignoring {}", address);
                return None;
            }
            info!("Source recorded ({}), {} of {}", address, self.sources.len() + 1, self.capacity);
            self.sources.insert(
                address,
                BroadcastSource { address, sid, pa_interval, sync_attempts_remaining: self.attempts },
            );
        }
        self.sources.get_mut(&address)
    }

    pub fn get(&self, address: &Address) -> Option<&BroadcastSource> {
        self.sources.get(address)
    }

    /// Spend one sync attempt. Never goes below zero.
    pub fn consume_attempt(&mut self, address: &Address) -> bool {
        match self.sources.get_mut(address) {
            Some(source) if source.sync_attempts_remaining > 0 => {
                source.sync_attempts_remaining -= 1;
                true
            }
            _ => false,
        }
    }

    /// Stop syncing to a source whose BASE is already known
    pub fn clear_countdown(&mut self, address: &Address) -> bool {
        match self.sources.get_mut(address) {
            Some(source) => {
                source.sync_attempts_remaining = 0;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    pub fn iter(&self) -> impl Iterator<Item = &BroadcastSource> {
        self.sources.values()
    }
}
