//! Engine configuration.
//!
//! Layering order (lowest precedence first):
//!   1) Built-in defaults
//!   2) Optional config file (TOML/YAML/JSON by extension)
//!   3) Environment variables, prefix `LAUNCHPAD`, nested by `__`
//!
//! Durations use humantime notation: `"1h"`, `"30days"`, `"72h"`.

use std::path::Path;
use std::time::Duration;

use config as cfg;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timelock::DEFAULT_DELAY_SECS;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Shortest accepted contribution window.
    #[serde(with = "humantime_serde")]
    pub min_round_duration: Duration,
    /// Longest accepted contribution window.
    #[serde(with = "humantime_serde")]
    pub max_round_duration: Duration,
    /// Cap on distinct participants per round.
    pub max_participants: u32,
    /// Delay between scheduling and applying any time-locked change.
    #[serde(with = "humantime_serde")]
    pub upgrade_delay: Duration,
    /// Broadcast buffer for the event stream.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_round_duration: Duration::from_secs(60 * 60),
            max_round_duration: Duration::from_secs(90 * 24 * 60 * 60),
            max_participants: 1_000,
            upgrade_delay: Duration::from_secs(DEFAULT_DELAY_SECS),
            event_capacity: 1024,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(#[from] cfg::ConfigError),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

impl EngineConfig {
    /// Load: defaults → `explicit_file` (if any) → environment.
    ///
    /// Examples:
    ///   LAUNCHPAD__MAX_PARTICIPANTS=250
    ///   LAUNCHPAD__MIN_ROUND_DURATION=2h
    pub fn load(explicit_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = cfg::Config::builder()
            .add_source(cfg::Config::try_from(&EngineConfig::default())?);

        if let Some(path) = explicit_file {
            builder = builder.add_source(cfg::File::from(path));
        }

        builder = builder.add_source(
            cfg::Environment::with_prefix("LAUNCHPAD")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: EngineConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_round_duration.is_zero() {
            return Err(ConfigError::Invalid { field: "min_round_duration", reason: "must be > 0" });
        }
        if self.min_round_duration > self.max_round_duration {
            return Err(ConfigError::Invalid {
                field: "max_round_duration",
                reason: "must be >= min_round_duration",
            });
        }
        if self.max_participants == 0 {
            return Err(ConfigError::Invalid { field: "max_participants", reason: "must be > 0" });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid { field: "event_capacity", reason: "must be > 0" });
        }
        Ok(())
    }

    pub(crate) fn duration_bounds(&self) -> (u64, u64) {
        (self.min_round_duration.as_secs(), self.max_round_duration.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let c = EngineConfig::default();
        c.validate().unwrap();
        assert_eq!(c.upgrade_delay.as_secs(), 259_200);
        assert_eq!(c.duration_bounds(), (3_600, 7_776_000));
    }

    #[test]
    fn validate_rejects_inverted_window_and_zero_caps() {
        let mut c = EngineConfig::default();
        c.min_round_duration = Duration::from_secs(10);
        c.max_round_duration = Duration::from_secs(5);
        assert!(matches!(c.validate(), Err(ConfigError::Invalid { field: "max_round_duration", .. })));

        let c = EngineConfig { max_participants: 0, ..EngineConfig::default() };
        assert!(c.validate().is_err());
        let c = EngineConfig { event_capacity: 0, ..EngineConfig::default() };
        assert!(c.validate().is_err());
        let c = EngineConfig { min_round_duration: Duration::ZERO, ..EngineConfig::default() };
        assert!(c.validate().is_err());
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("launchpad-cfg-{}.toml", std::process::id()));
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "max_participants = 7").unwrap();
            writeln!(f, "min_round_duration = \"5s\"").unwrap();
        }
        let c = EngineConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(c.max_participants, 7);
        assert_eq!(c.min_round_duration, Duration::from_secs(5));
        assert_eq!(c.max_round_duration, EngineConfig::default().max_round_duration);
    }

    #[test]
    fn humantime_round_trip() {
        let json = serde_json::to_string(&EngineConfig::default()).unwrap();
        assert!(json.contains("\"upgrade_delay\":\"3days\""));
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EngineConfig::default());
    }
}
