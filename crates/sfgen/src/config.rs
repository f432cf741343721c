use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::{default_behavior_map, Behavior};
use crate::error::EngineError;

/// Newest configuration schema this build understands.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Generation session settings. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenConfig {
    /// Schema version for forward/backward compatibility.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Wall-clock budget in milliseconds.
    pub time_limit_ms: u64,
    /// Maximum number of candidates that pass the size check.
    pub input_limit: u64,
    /// Maximum number of outputs sent to the sink.
    pub output_limit: u64,
    /// Maximum statements per sequence.
    pub max_size: usize,
    /// Probability of passing null to a non-receiver reference input.
    pub null_ratio: f64,
    /// Probability of reusing a value already in the candidate.
    pub alias_ratio: f64,
    /// Never pass null.
    pub forbid_null: bool,
    pub seed: u64,
    /// Prefer short, rarely selected components.
    pub favor_shorter: bool,
    /// Pool size at which generated components are dropped.
    pub clear_threshold: usize,
    /// Per-call deadline; enables isolated execution.
    pub call_timeout_ms: Option<u64>,
    pub progress_interval_ms: u64,
    /// Abort or report when nothing changes for this long (0 = never).
    pub stall_window_ms: u64,
    /// Keep the candidate history used in flaky reports.
    pub diagnostics: bool,
    /// Thrown-kind to behavior table; kinds not listed are Expected.
    pub behavior: BTreeMap<String, Behavior>,
}

fn default_schema_version() -> u32 {
    CONFIG_SCHEMA_VERSION
}

impl Default for GenConfig {
    fn default() -> Self {
        GenConfig {
            schema_version: CONFIG_SCHEMA_VERSION,
            time_limit_ms: 100_000,
            input_limit: 100_000_000,
            output_limit: 100_000_000,
            max_size: 100,
            null_ratio: 0.05,
            alias_ratio: 0.0,
            forbid_null: false,
            seed: 0,
            favor_shorter: false,
            clear_threshold: 100_000_000,
            call_timeout_ms: None,
            progress_interval_ms: 5_000,
            stall_window_ms: 0,
            diagnostics: false,
            behavior: default_behavior_map(),
        }
    }
}

impl GenConfig {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: GenConfig = serde_json::from_str(json)?;
        if config.schema_version > CONFIG_SCHEMA_VERSION {
            return Err(EngineError::Config(format!(
                "unsupported config schema version {}: max supported is {}",
                config.schema_version, CONFIG_SCHEMA_VERSION
            )));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let json = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, ratio) in [("null_ratio", self.null_ratio), ("alias_ratio", self.alias_ratio)] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(EngineError::Config(format!("{name} must be in [0, 1], got {ratio}")));
            }
        }
        let positive = [
            ("time_limit_ms", self.time_limit_ms),
            ("input_limit", self.input_limit),
            ("output_limit", self.output_limit),
            ("max_size", self.max_size as u64),
            ("clear_threshold", self.clear_threshold as u64),
            ("progress_interval_ms", self.progress_interval_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(EngineError::Config(format!("{name} must be positive")));
            }
        }
        if self.call_timeout_ms == Some(0) {
            return Err(EngineError::Config("call_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_millis(self.time_limit_ms)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = GenConfig::from_json(r#"{"seed": 9, "max_size": 3}"#).unwrap();
        assert_eq!(config.seed, 9);
        assert_eq!(config.max_size, 3);
        assert_eq!(config.null_ratio, 0.05);
        assert_eq!(config.schema_version, CONFIG_SCHEMA_VERSION);
        assert_eq!(config.behavior.get("panic"), Some(&Behavior::Error));
    }

    #[test]
    fn test_newer_schema_rejected() {
        let err = GenConfig::from_json(r#"{"schema_version": 2}"#).unwrap_err();
        assert!(err.to_string().contains("unsupported config schema version 2"));
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = GenConfig::default();
        assert!(config.validate().is_ok());
        config.null_ratio = 1.5;
        assert!(config.validate().is_err());
        config.null_ratio = 0.0;
        config.max_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_trip_through_json() {
        let mut config = GenConfig::default();
        config.call_timeout_ms = Some(250);
        let back = GenConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(config, back);
    }
}
