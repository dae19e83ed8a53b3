//! Configuration types for the domain watch system
//!
//! This module defines the tunables of the verification and notification
//! engine. Batch sizes and delays are configuration, never constants: the
//! scheduled sweep, the priority sweep and manual rechecks each carry
//! their own [`BatchConfig`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound of the "expiring soon" window (ten years)
pub const MAX_EXPIRING_WINDOW_DAYS: u32 = 3650;

/// Main monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Batching for the routine sweep (available, error, not checked)
    #[serde(default = "default_routine_batch")]
    pub routine: BatchConfig,

    /// Batching for expired domains that are still registered
    #[serde(default = "default_priority_batch")]
    pub priority: BatchConfig,

    /// Batching and cap for manually triggered sweeps
    #[serde(default)]
    pub manual: ManualSweepConfig,

    /// Size of the "expiring soon" reporting window
    #[serde(default = "default_expiring_window_days")]
    pub expiring_window_days: u32,

    /// Reject every mutating operation (demo deployments)
    #[serde(default)]
    pub read_only: bool,

    /// Engine event channel capacity
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl MonitorConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            routine: default_routine_batch(),
            priority: default_priority_batch(),
            manual: ManualSweepConfig::default(),
            expiring_window_days: default_expiring_window_days(),
            read_only: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.routine.validate("routine")?;
        self.priority.validate("priority")?;
        self.manual.batch.validate("manual")?;

        if self.manual.max_domains == 0 {
            return Err(crate::Error::config("Manual sweep cap must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.expiring_window_days == 0 {
            return Err(crate::Error::config("Expiring window must be at least one day"));
        }
        if self.expiring_window_days > MAX_EXPIRING_WINDOW_DAYS {
            return Err(crate::Error::config(format!(
                "Expiring window must be at most {} days",
                MAX_EXPIRING_WINDOW_DAYS
            )));
        }

        Ok(())
    }

    /// The expiring window as a chrono duration
    pub fn expiring_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.expiring_window_days))
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Chunking and spacing of provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of lookups in flight at once
    pub batch_size: usize,

    /// Pause between consecutive chunks (in milliseconds)
    #[serde(default)]
    pub delay_between_batches_ms: u64,
}

impl BatchConfig {
    /// Create a batch configuration
    pub fn new(batch_size: usize, delay_between_batches_ms: u64) -> Self {
        Self {
            batch_size,
            delay_between_batches_ms,
        }
    }

    /// Inter-chunk delay
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_between_batches_ms)
    }

    fn validate(&self, label: &str) -> Result<(), crate::Error> {
        if self.batch_size == 0 {
            return Err(crate::Error::config(format!(
                "{} batch size must be > 0",
                label
            )));
        }
        Ok(())
    }
}

/// Manual sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualSweepConfig {
    /// Batching for manual sweeps
    #[serde(default = "default_routine_batch")]
    pub batch: BatchConfig,

    /// Upper bound on routine domains processed per manual call
    #[serde(default = "default_manual_max_domains")]
    pub max_domains: usize,
}

impl Default for ManualSweepConfig {
    fn default() -> Self {
        Self {
            batch: default_routine_batch(),
            max_domains: default_manual_max_domains(),
        }
    }
}

fn default_routine_batch() -> BatchConfig {
    BatchConfig::new(5, 1000)
}

fn default_priority_batch() -> BatchConfig {
    BatchConfig::new(3, 2000)
}

fn default_manual_max_domains() -> usize {
    20
}

fn default_expiring_window_days() -> u32 {
    30
}

fn default_event_channel_capacity() -> usize {
    100
}
