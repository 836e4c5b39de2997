//! Endpoint configuration.
//!
//! Both configurations deserialize from partial documents, missing knobs
//! taking their default value.

use crate::ConfigError;
use core::{num, time::Duration};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SAMPLE_RATE: num::NonZeroU32 = num::NonZeroU32::new(44100).unwrap();
pub const DEFAULT_TRANSMIT_AHEAD: f64 = 0.3;
pub const DEFAULT_IMMEDIATE_CUTOFF: f64 = 0.1;
pub const DEFAULT_SYNC_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Ring capacity, in seconds of audio, when none is given.
const DEFAULT_CAPACITY_SECS: usize = 2;

/// Push messages per second of audio, at least.
const DEFAULT_CHUNKS_PER_SEC: u32 = 4;

fn check_duration(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0. {
        Ok(())
    } else {
        Err(ConfigError::InvalidDuration { name, value })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub sample_rate: num::NonZeroU32,
    /// Ring capacity in samples, two seconds of audio if `None`.
    pub capacity: Option<num::NonZeroUsize>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl ReceiverConfig {
    #[inline(always)]
    pub const fn new(sample_rate: num::NonZeroU32) -> Self {
        Self {
            sample_rate,
            capacity: None,
        }
    }

    #[inline(always)]
    pub const fn with_capacity(mut self, capacity: num::NonZeroUsize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Returns the effective ring capacity.
    #[inline]
    pub fn capacity(&self) -> num::NonZeroUsize {
        self.capacity.unwrap_or_else(|| {
            let samples = (self.sample_rate.get() as usize).saturating_mul(DEFAULT_CAPACITY_SECS);
            num::NonZeroUsize::new(samples).unwrap_or(num::NonZeroUsize::MIN)
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacity = self.capacity().get();

        // one slot always stays free between the newest write and the read head
        if capacity < 2 {
            return Err(ConfigError::CapacityTooSmall(capacity));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmitterConfig {
    pub sample_rate: num::NonZeroU32,
    /// Seconds by which messages are scheduled ahead of their stream time.
    pub transmit_ahead: f64,
    /// Messages due sooner than this many seconds from now are sent for
    /// immediate delivery.
    pub immediate_cutoff: f64,
    /// Maximum samples per push message, a quarter second of audio if `None`.
    pub max_chunk: Option<num::NonZeroUsize>,
    pub sync_poll_interval: Duration,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl TransmitterConfig {
    #[inline(always)]
    pub const fn new(sample_rate: num::NonZeroU32) -> Self {
        Self {
            sample_rate,
            transmit_ahead: DEFAULT_TRANSMIT_AHEAD,
            immediate_cutoff: DEFAULT_IMMEDIATE_CUTOFF,
            max_chunk: None,
            sync_poll_interval: DEFAULT_SYNC_POLL_INTERVAL,
        }
    }

    #[inline(always)]
    pub const fn with_transmit_ahead(mut self, secs: f64) -> Self {
        self.transmit_ahead = secs;
        self
    }

    #[inline(always)]
    pub const fn with_immediate_cutoff(mut self, secs: f64) -> Self {
        self.immediate_cutoff = secs;
        self
    }

    #[inline(always)]
    pub const fn with_max_chunk(mut self, max_chunk: num::NonZeroUsize) -> Self {
        self.max_chunk = Some(max_chunk);
        self
    }

    #[inline(always)]
    pub const fn with_sync_poll_interval(mut self, interval: Duration) -> Self {
        self.sync_poll_interval = interval;
        self
    }

    /// Returns the effective per-message sample cap.
    #[inline]
    pub fn max_chunk(&self) -> num::NonZeroUsize {
        self.max_chunk.unwrap_or_else(|| {
            let samples = self.sample_rate.get() / DEFAULT_CHUNKS_PER_SEC;
            num::NonZeroUsize::new(samples as usize).unwrap_or(num::NonZeroUsize::MIN)
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_duration("transmit_ahead", self.transmit_ahead)?;
        check_duration("immediate_cutoff", self.immediate_cutoff)?;

        if self.sync_poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }

        Ok(())
    }
}
