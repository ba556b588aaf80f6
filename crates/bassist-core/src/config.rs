//! Assistant configuration
//!
//! All tunables of the orchestration engine in one serde-friendly structure
//! that can be loaded from TOML. Durations are stored in milliseconds.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

// ----------------------------------------------------------------------------
// Policies
// ----------------------------------------------------------------------------

/// How an all-ones BIS sync value in a receive state is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BisSyncFailurePolicy {
    /// Any changed subgroup reporting the failure value makes the whole
    /// update "not synced", whatever the other subgroups say
    #[default]
    WholeGroup,
    /// The failure value only counts as "not synced" for its own subgroup
    PerSubgroup,
}

// ----------------------------------------------------------------------------
// Assistant Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Maximum number of broadcast sources tracked per scan session
    pub source_capacity: usize,
    /// PA sync attempts granted to each source when a source scan starts
    pub default_pa_sync_attempts: u8,
    /// Periodic advertising events the controller may skip once synced
    pub pa_sync_skip: u16,
    /// Ask the controller to filter duplicate periodic advertising reports
    pub pa_sync_filter_duplicates: bool,
    /// Number of PA intervals before a sync attempt is abandoned
    pub pa_timeout_ratio: u32,
    /// Bounded wait on the add/remove-source gates
    pub gate_wait_ms: u64,
    /// Pause between tearing down a PA sync and creating a connection
    pub connect_settle_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Subgroups passed to add/modify-source procedures are capped at this
    pub max_subgroups: usize,
    /// Sync to the source locally and hand it over via PAST before adding it
    pub past_assisted_add: bool,
    pub bis_sync_failure: BisSyncFailurePolicy,
    /// Buffer size of the command, event and link channels
    pub channel_buffer_size: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            source_capacity: 50,
            default_pa_sync_attempts: 0,
            pa_sync_skip: 5,
            pa_sync_filter_duplicates: true,
            pa_timeout_ratio: 20,
            gate_wait_ms: 2000,
            connect_settle_ms: 100,
            heartbeat_interval_ms: 1000,
            max_subgroups: 4,
            past_assisted_add: true,
            bis_sync_failure: BisSyncFailurePolicy::WholeGroup,
            channel_buffer_size: 64,
        }
    }
}

impl AssistantConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Short waits and a small registry for tests
    pub fn testing() -> Self {
        Self {
            source_capacity: 8,
            gate_wait_ms: 200,
            connect_settle_ms: 0,
            heartbeat_interval_ms: 100,
            channel_buffer_size: 32,
            ..Self::default()
        }
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io { path: path.display().to_string(), reason: e.to_string() })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_capacity == 0 {
            return Err(ConfigError::Invalid("source_capacity must be at least 1".into()));
        }
        if self.max_subgroups == 0 {
            return Err(ConfigError::Invalid("max_subgroups must be at least 1".into()));
        }
        if self.pa_timeout_ratio == 0 {
            return Err(ConfigError::Invalid("pa_timeout_ratio must be at least 1".into()));
        }
        if self.channel_buffer_size == 0 {
            return Err(ConfigError::Invalid("channel_buffer_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn gate_wait(&self) -> Duration {
        Duration::from_millis(self.gate_wait_ms)
    }

    pub fn connect_settle(&self) -> Duration {
        Duration::from_millis(self.connect_settle_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn with_source_capacity(mut self, capacity: usize) -> Self {
        self.source_capacity = capacity;
        self
    }

    pub fn with_pa_sync_attempts(mut self, attempts: u8) -> Self {
        self.default_pa_sync_attempts = attempts;
        self
    }

    pub fn with_gate_wait(mut self, wait: Duration) -> Self {
        self.gate_wait_ms = wait.as_millis() as u64;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_past_assisted_add(mut self, enabled: bool) -> Self {
        self.past_assisted_add = enabled;
        self
    }

    pub fn with_bis_sync_failure(mut self, policy: BisSyncFailurePolicy) -> Self {
        self.bis_sync_failure = policy;
        self
    }

    pub fn with_max_subgroups(mut self, max: usize) -> Self {
        self.max_subgroups = max;
        self
    }
}
