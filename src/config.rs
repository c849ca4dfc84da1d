// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::errors::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default tolerance between the document timestamp and the reference time
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

/// Register that a single expected measurement is compared against.  On
/// Nitro, PCR2 measures the application code.
pub const DEFAULT_MEASUREMENT_INDEX: u16 = 2;

/// Tunables of the policy checker
#[serde_with::serde_as]
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Maximum distance, in either direction, between the document timestamp
    /// and the reference time
    #[serde(rename = "max-age-secs")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub max_age: Duration,

    /// Register a single (unindexed) expected measurement refers to
    #[serde(rename = "default-measurement-index")]
    pub default_measurement_index: u16,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            default_measurement_index: DEFAULT_MEASUREMENT_INDEX,
        }
    }
}

impl PolicyConfig {
    /// Parse a policy configuration from JSON.  Missing keys take their
    /// default value.
    pub fn load_json(j: &str) -> Result<Self, Error> {
        serde_json::from_str(j).map_err(|e| Error::MalformedInput(e.to_string()))
    }
}

/// Verbosity of the engine's log output
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LoggingLevel> for log::LevelFilter {
    fn from(l: LoggingLevel) -> Self {
        match l {
            LoggingLevel::Off => log::LevelFilter::Off,
            LoggingLevel::Error => log::LevelFilter::Error,
            LoggingLevel::Warn => log::LevelFilter::Warn,
            LoggingLevel::Info => log::LevelFilter::Info,
            LoggingLevel::Debug => log::LevelFilter::Debug,
            LoggingLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Options accepted by [`crate::api::initialize`]
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct InitOptions {
    #[serde(rename = "logging-level")]
    pub logging_level: LoggingLevel,

    /// Number of worker threads.  `None` sizes the pool to the available
    /// parallelism; `Some(0)` runs every verification on the caller's thread.
    #[serde(rename = "hardware-concurrency")]
    pub hardware_concurrency: Option<usize>,

    pub policy: PolicyConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defaults() {
        let p = PolicyConfig::default();

        assert_eq!(p.max_age, Duration::from_secs(300));
        assert_eq!(p.default_measurement_index, 2);
    }

    #[test]
    fn policy_load_json_ok() {
        let p = PolicyConfig::load_json(
            r#"{ "max-age-secs": 60, "default-measurement-index": 4 }"#,
        )
        .unwrap();

        assert_eq!(p.max_age, Duration::from_secs(60));
        assert_eq!(p.default_measurement_index, 4);
    }

    #[test]
    fn policy_load_json_partial() {
        let p = PolicyConfig::load_json(r#"{ "max-age-secs": 30 }"#).unwrap();

        assert_eq!(p.max_age, Duration::from_secs(30));
        assert_eq!(p.default_measurement_index, DEFAULT_MEASUREMENT_INDEX);
    }

    #[test]
    fn policy_load_json_bad() {
        assert!(matches!(
            PolicyConfig::load_json(r#"{ "max-age-secs": "soon" }"#),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn init_options_json() {
        let o: InitOptions = serde_json::from_str(
            r#"{ "logging-level": "debug", "hardware-concurrency": 4 }"#,
        )
        .unwrap();

        assert_eq!(o.logging_level, LoggingLevel::Debug);
        assert_eq!(o.hardware_concurrency, Some(4));
        assert_eq!(o.policy, PolicyConfig::default());
    }

    #[test]
    fn logging_level_filter() {
        assert_eq!(
            log::LevelFilter::from(LoggingLevel::default()),
            log::LevelFilter::Info
        );
        assert_eq!(
            log::LevelFilter::from(LoggingLevel::Trace),
            log::LevelFilter::Trace
        );
    }
}
