//! Runtime configuration
//!
//! Configuration is an explicit value handed to the components that need it.
//! Nothing here is global: the tracker receives a [`TrackerConfig`] and
//! whatever renders the UI receives a [`Theme`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GhostError;

/// Default minimum movement between delivered fixes (meters)
pub const DEFAULT_DISTANCE_FILTER_METERS: f64 = 5.0;

/// Default elapsed-timer resolution (milliseconds)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Default bound on a single remote round-trip (milliseconds)
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 10_000;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostConfig {
    pub tracker: TrackerConfig,
    pub theme: Theme,
}

impl GhostConfig {
    /// Parse configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, GhostError> {
        let config: GhostConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, GhostError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, GhostError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), GhostError> {
        self.tracker.validate()
    }
}

/// Session tracking parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Fixes closer than this to the last delivered fix are dropped (meters)
    pub distance_filter_meters: f64,
    /// Elapsed-time timer resolution (milliseconds)
    pub tick_interval_ms: u64,
    /// Bound on each remote read or write (milliseconds)
    pub remote_timeout_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            distance_filter_meters: DEFAULT_DISTANCE_FILTER_METERS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            remote_timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
        }
    }
}

impl TrackerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), GhostError> {
        if !self.distance_filter_meters.is_finite() || self.distance_filter_meters < 0.0 {
            return Err(GhostError::InvalidConfig(format!(
                "distance_filter_meters must be a non-negative number, got {}",
                self.distance_filter_meters
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(GhostError::InvalidConfig(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        if self.remote_timeout_ms == 0 {
            return Err(GhostError::InvalidConfig(
                "remote_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// User-selected appearance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub accent: AccentColor,
}

/// Accent color, written as a name (`"green"`) or `#RRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AccentColor {
    Green,
    Blue,
    Red,
    Orange,
    Purple,
    Pink,
    Rgb(u8, u8, u8),
}

impl Default for AccentColor {
    fn default() -> Self {
        AccentColor::Green
    }
}

impl AccentColor {
    /// Resolve to an RGB triple
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            AccentColor::Green => (52, 199, 89),
            AccentColor::Blue => (0, 122, 255),
            AccentColor::Red => (255, 59, 48),
            AccentColor::Orange => (255, 149, 0),
            AccentColor::Purple => (175, 82, 222),
            AccentColor::Pink => (255, 45, 85),
            AccentColor::Rgb(r, g, b) => (*r, *g, *b),
        }
    }
}

impl fmt::Display for AccentColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccentColor::Green => f.write_str("green"),
            AccentColor::Blue => f.write_str("blue"),
            AccentColor::Red => f.write_str("red"),
            AccentColor::Orange => f.write_str("orange"),
            AccentColor::Purple => f.write_str("purple"),
            AccentColor::Pink => f.write_str("pink"),
            AccentColor::Rgb(r, g, b) => write!(f, "#{r:02x}{g:02x}{b:02x}"),
        }
    }
}

impl FromStr for AccentColor {
    type Err = GhostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            let channel = |range: std::ops::Range<usize>| {
                hex.get(range)
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| GhostError::InvalidConfig(format!("invalid color: {s}")))
            };
            if hex.len() != 6 {
                return Err(GhostError::InvalidConfig(format!("invalid color: {s}")));
            }
            return Ok(AccentColor::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?));
        }

        match s.to_ascii_lowercase().as_str() {
            "green" => Ok(AccentColor::Green),
            "blue" => Ok(AccentColor::Blue),
            "red" => Ok(AccentColor::Red),
            "orange" => Ok(AccentColor::Orange),
            "purple" => Ok(AccentColor::Purple),
            "pink" => Ok(AccentColor::Pink),
            _ => Err(GhostError::InvalidConfig(format!("unknown color: {s}"))),
        }
    }
}

impl TryFrom<String> for AccentColor {
    type Error = GhostError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccentColor> for String {
    fn from(color: AccentColor) -> Self {
        color.to_string()
    }
}
