// ABOUTME: Configuration loading and validation for the tarotfan binary.
// ABOUTME: Reads TAROTFAN_* environment variables; CLI flags are layered on top in main.

use std::path::PathBuf;
use std::str::FromStr;

use tarotfan_core::timing::DEFAULT_HAND_SIZE;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var} is not a valid number: {value}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("TAROTFAN_SHARE must be one of none, text, files; got {0}")]
    InvalidShareMode(String),

    #[error("time scale must be positive, got {0}")]
    NonPositiveTimeScale(f64),

    #[error("time scale must be at most 1000, got {0}")]
    TimeScaleTooLarge(f64),

    #[error("hand size must be at least 1")]
    EmptyHand,
}

/// Largest accepted animation slowdown.
pub const MAX_TIME_SCALE: f64 = 1000.0;

/// What the simulated share sheet supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShareMode {
    /// No native share, like a desktop browser.
    #[default]
    None,
    /// Text share only; files are refused.
    Text,
    Files,
}

impl FromStr for ShareMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(ShareMode::None),
            "text" => Ok(ShareMode::Text),
            "files" | "file" => Ok(ShareMode::Files),
            other => Err(ConfigError::InvalidShareMode(other.to_string())),
        }
    }
}

/// Binary configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub hand_size: usize,
    pub seed: Option<u64>,
    pub time_scale: f64,
    pub output_dir: PathBuf,
    pub catalog: Option<PathBuf>,
    pub share: ShareMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hand_size: DEFAULT_HAND_SIZE,
            seed: None,
            time_scale: 1.0,
            output_dir: PathBuf::from("."),
            catalog: None,
            share: ShareMode::None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - TAROTFAN_HAND_SIZE: cards per hand (default: 6)
    /// - TAROTFAN_SEED: RNG seed for reproducible deals (optional)
    /// - TAROTFAN_TIME_SCALE: multiplier on every animation duration (default: 1.0)
    /// - TAROTFAN_OUTPUT_DIR: where downloaded images land (default: .)
    /// - TAROTFAN_CATALOG: JSON catalog replacing the built-in deck (optional)
    /// - TAROTFAN_SHARE: none, text, or files (default: none)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let hand_size = match get("TAROTFAN_HAND_SIZE") {
            Some(v) => parse_number("TAROTFAN_HAND_SIZE", &v)?,
            None => defaults.hand_size,
        };
        let seed = get("TAROTFAN_SEED")
            .map(|v| parse_number("TAROTFAN_SEED", &v))
            .transpose()?;
        let time_scale = match get("TAROTFAN_TIME_SCALE") {
            Some(v) => parse_number("TAROTFAN_TIME_SCALE", &v)?,
            None => defaults.time_scale,
        };
        let output_dir = get("TAROTFAN_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir);
        let catalog = get("TAROTFAN_CATALOG").map(PathBuf::from);
        let share = match get("TAROTFAN_SHARE") {
            Some(v) => v.parse()?,
            None => defaults.share,
        };

        let config = Self {
            hand_size,
            seed,
            time_scale,
            output_dir,
            catalog,
            share,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hand_size == 0 {
            return Err(ConfigError::EmptyHand);
        }
        if self.time_scale <= 0.0 || !self.time_scale.is_finite() {
            return Err(ConfigError::NonPositiveTimeScale(self.time_scale));
        }
        if self.time_scale > MAX_TIME_SCALE {
            return Err(ConfigError::TimeScaleTooLarge(self.time_scale));
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: value.to_string(),
    })
}
