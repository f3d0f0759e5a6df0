// ABOUTME: Animation durations and table configuration passed into the card machines and actor.
// ABOUTME: Durations are explicit values so tests and demos can shorten or scale them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of cards in a hand.
pub const DEFAULT_HAND_SIZE: usize = 6;

/// Errors raised when a timing or table configuration is inconsistent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimingsError {
    #[error("shuffle midpoint ({midpoint:?}) must come before shuffle end ({end:?})")]
    MidpointNotBeforeEnd { midpoint: Duration, end: Duration },

    #[error("hand size must be at least 1")]
    EmptyHand,
}

/// Fixed durations for every timed transition in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timings {
    /// Fan slot to centred overlay; the first flip runs in parallel.
    pub flight: Duration,
    /// Identity face to detail face flip.
    pub detail_flip: Duration,
    /// Overlay back to the fan.
    pub return_flight: Duration,
    /// Offset into the shuffle animation at which the hand is swapped.
    pub shuffle_midpoint: Duration,
    /// Offset at which the shuffle animation is over and the hand unlocks.
    pub shuffle_end: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            flight: Duration::from_millis(600),
            detail_flip: Duration::from_millis(900),
            return_flight: Duration::from_millis(1500),
            shuffle_midpoint: Duration::from_millis(1000),
            shuffle_end: Duration::from_millis(2050),
        }
    }
}

impl Timings {
    /// Check the ordering constraints between durations.
    pub fn validate(&self) -> Result<(), TimingsError> {
        if self.shuffle_midpoint >= self.shuffle_end {
            return Err(TimingsError::MidpointNotBeforeEnd {
                midpoint: self.shuffle_midpoint,
                end: self.shuffle_end,
            });
        }
        Ok(())
    }

    /// Multiply every duration by `factor`. Non-positive or non-finite
    /// factors, and factors that would overflow a `Duration`, leave the
    /// timings unchanged.
    pub fn scaled(self, factor: f64) -> Self {
        if !factor.is_finite() || factor <= 0.0 {
            return self;
        }
        self.try_scaled(factor).unwrap_or(self)
    }

    fn try_scaled(&self, factor: f64) -> Option<Self> {
        let scale = |d: Duration| Duration::try_from_secs_f64(d.as_secs_f64() * factor).ok();
        Some(Self {
            flight: scale(self.flight)?,
            detail_flip: scale(self.detail_flip)?,
            return_flight: scale(self.return_flight)?,
            shuffle_midpoint: scale(self.shuffle_midpoint)?,
            shuffle_end: scale(self.shuffle_end)?,
        })
    }
}

/// Everything the table actor needs besides the catalog and the stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub hand_size: usize,
    pub timings: Timings,
    /// Fixed RNG seed for reproducible deals. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            hand_size: DEFAULT_HAND_SIZE,
            timings: Timings::default(),
            seed: None,
        }
    }
}

impl TableConfig {
    pub fn validate(&self) -> Result<(), TimingsError> {
        if self.hand_size == 0 {
            return Err(TimingsError::EmptyHand);
        }
        self.timings.validate()
    }
}
