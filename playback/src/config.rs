//! Tunables for a peer session.

use std::num::NonZeroUsize;

use codec::DejitterConfig;
use wire::PacketLimits;

use crate::error::{PlaybackError, PlaybackResult};

/// Playback delay bounds for the [`ClockEstimator`](crate::ClockEstimator).
///
/// Delays are in remote ticks behind the newest tick received. Typical
/// deployments buffer 2 to 8 ticks at a 20 to 50 Hz tick rate; a wider band
/// absorbs more jitter at the cost of latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClockConfig {
    /// Ticks between snapshots sent by the host.
    pub remote_send_rate: u32,
    pub delay_min: u32,
    pub delay_max: u32,
}

impl ClockConfig {
    pub const fn new(remote_send_rate: u32, delay_min: u32, delay_max: u32) -> PlaybackResult<Self> {
        if remote_send_rate == 0 {
            return Err(PlaybackError::ZeroSendRate);
        }
        if delay_min > delay_max {
            return Err(PlaybackError::InvalidDelayBounds {
                min: delay_min,
                max: delay_max,
            });
        }
        Ok(Self {
            remote_send_rate,
            delay_min,
            delay_max,
        })
    }

    /// Target delay after a hard reset: the midpoint of the bounds.
    #[must_use]
    pub const fn delay_desired(&self) -> u32 {
        self.delay_min + (self.delay_max - self.delay_min) / 2
    }

    /// Checks a config that may have been deserialized.
    pub fn validate(&self) -> PlaybackResult<()> {
        Self::new(self.remote_send_rate, self.delay_min, self.delay_max).map(|_| ())
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            remote_send_rate: 1,
            delay_min: 2,
            delay_max: 6,
        }
    }
}

/// Smoothing of uncontrolled objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SmoothingConfig {
    /// Sampling never extrapolates further than this past the newest record.
    pub max_extrapolation_ticks: u32,
}

impl SmoothingConfig {
    pub const fn new(max_extrapolation_ticks: u32) -> Self {
        Self {
            max_extrapolation_ticks,
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Prediction of locally controlled objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PredictionConfig {
    /// Ticks the prediction runs ahead of the newest remote tick.
    pub lead_ticks: u32,
    /// Local commands retained for replay.
    pub command_capacity: NonZeroUsize,
}

impl PredictionConfig {
    pub const fn new(lead_ticks: u32, command_capacity: NonZeroUsize) -> Self {
        Self {
            lead_ticks,
            command_capacity,
        }
    }

    /// The command buffer and predicted history must span the lead.
    pub fn validate(&self) -> PlaybackResult<()> {
        if self.lead_ticks as usize >= self.command_capacity.get() {
            return Err(PlaybackError::LeadExceedsCapacity {
                lead: self.lead_ticks,
                capacity: self.command_capacity.get(),
            });
        }
        Ok(())
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            lead_ticks: 2,
            command_capacity: NonZeroUsize::MIN.saturating_add(63),
        }
    }
}

/// Everything a [`PeerSession`](crate::PeerSession) is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SyncConfig {
    pub clock: ClockConfig,
    pub dejitter: DejitterConfig,
    pub smoothing: SmoothingConfig,
    pub prediction: PredictionConfig,
    pub limits: PacketLimits,
}

impl SyncConfig {
    pub const fn new(
        clock: ClockConfig,
        dejitter: DejitterConfig,
        smoothing: SmoothingConfig,
        prediction: PredictionConfig,
        limits: PacketLimits,
    ) -> Self {
        Self {
            clock,
            dejitter,
            smoothing,
            prediction,
            limits,
        }
    }

    pub fn validate(&self) -> PlaybackResult<()> {
        self.clock.validate()?;
        self.prediction.validate()
    }
}
