//! Strongly-typed configuration for the test utilities.
//!
//! Configuration values can be constructed from defaults, loaded from
//! environment variables (with optional `.env` support), or merged with
//! explicit overrides for ergonomic programmatic updates.

use std::env;
use std::fmt;
use std::num::ParseIntError;

use dotenvy::dotenv;
use serde::de::{Deserialize, Deserializer, Error as DeError};
use serde::ser::{Serialize, Serializer};
use serde::{Deserialize as DeriveDeserialize, Serialize as DeriveSerialize};
use thiserror::Error;

use crate::logging::{LogCallback, TestUtilLogger};
use crate::waiter::{DEFAULT_INTERVAL_MS, DEFAULT_TIMEOUT_MS, WaitOptions};

/// Path prefix under which the test runner serves project files.
pub const DEFAULT_ROOT_PREFIX: &str = "/base/";

/// Verbosity level for test utility logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Minimal,
    Medium,
    Detailed,
}

impl Verbosity {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Medium
    }
}

impl Serialize for Verbosity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Verbosity::from_u8(value).ok_or_else(|| {
            DeError::custom(format!(
                "invalid verbosity value {value}; expected 0, 1, or 2"
            ))
        })
    }
}

/// Configuration shared by the waiter, the stack locator and the logger.
#[derive(DeriveSerialize, DeriveDeserialize, Clone)]
#[serde(default)]
pub struct TestUtilConfig {
    pub verbose: Verbosity,
    #[serde(alias = "waitTimeoutMs")]
    pub wait_timeout_ms: u64,
    #[serde(alias = "waitIntervalMs")]
    pub wait_interval_ms: u64,
    #[serde(alias = "rootPrefix")]
    pub root_prefix: String,
    #[serde(skip_serializing, skip_deserializing)]
    pub logger: Option<LogCallback>,
}

impl Default for TestUtilConfig {
    fn default() -> Self {
        TestUtilConfig {
            verbose: Verbosity::default(),
            wait_timeout_ms: DEFAULT_TIMEOUT_MS,
            wait_interval_ms: DEFAULT_INTERVAL_MS,
            root_prefix: DEFAULT_ROOT_PREFIX.to_string(),
            logger: None,
        }
    }
}

impl TestUtilConfig {
    /// Construct a configuration by reading relevant environment variables, after
    /// loading a `.env` file if present.
    pub fn from_env() -> Result<Self, TestUtilConfigError> {
        let _ = dotenv();
        let mut config = TestUtilConfig::default();

        if let Some(value) = env_var("TESTUTIL_VERBOSE") {
            let parsed = parse_u8("TESTUTIL_VERBOSE", &value)?;
            config.verbose = Verbosity::from_u8(parsed).ok_or_else(|| {
                TestUtilConfigError::InvalidEnumVariant {
                    field: "TESTUTIL_VERBOSE",
                    value: parsed.to_string(),
                }
            })?;
        }

        if let Some(value) = env_var("TESTUTIL_WAIT_TIMEOUT_MS") {
            config.wait_timeout_ms = parse_duration_ms("TESTUTIL_WAIT_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("TESTUTIL_WAIT_INTERVAL_MS") {
            config.wait_interval_ms = parse_duration_ms("TESTUTIL_WAIT_INTERVAL_MS", &value)?;
        }

        if let Some(value) = env_var("TESTUTIL_ROOT_PREFIX") {
            config.root_prefix = normalise_root_prefix(&value);
        }

        Ok(config)
    }

    /// Create a new configuration with explicit field overrides applied.
    pub fn with_overrides(&self, overrides: TestUtilConfigOverrides) -> TestUtilConfig {
        let mut next = self.clone();

        if let Some(value) = overrides.verbose {
            next.verbose = value;
        }
        if let Some(value) = overrides.wait_timeout_ms {
            next.wait_timeout_ms = value;
        }
        if let Some(value) = overrides.wait_interval_ms {
            next.wait_interval_ms = value;
        }
        if let Some(value) = overrides.root_prefix {
            next.root_prefix = normalise_root_prefix(&value);
        }
        if let Some(value) = overrides.logger {
            next.logger = value;
        }

        next
    }

    /// Default options applied to waits that do not pass their own.
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::new(self.wait_timeout_ms, self.wait_interval_ms)
    }

    /// Logger at the configured verbosity, writing to the configured sink if
    /// there is one.
    pub fn build_logger(&self) -> TestUtilLogger {
        let logger = TestUtilLogger::new(self.verbose);
        match &self.logger {
            Some(sink) => logger.with_sink(sink.clone()),
            None => logger,
        }
    }
}

/// Field-level overrides for [`TestUtilConfig::with_overrides`].
#[derive(Default, Clone)]
pub struct TestUtilConfigOverrides {
    pub verbose: Option<Verbosity>,
    pub wait_timeout_ms: Option<u64>,
    pub wait_interval_ms: Option<u64>,
    pub root_prefix: Option<String>,
    pub logger: Option<Option<LogCallback>>,
}

impl TestUtilConfigOverrides {
    pub fn verbose(mut self, verbose: Verbosity) -> Self {
        self.verbose = Some(verbose);
        self
    }

    pub fn wait_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.wait_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn wait_interval_ms(mut self, interval_ms: u64) -> Self {
        self.wait_interval_ms = Some(interval_ms);
        self
    }

    pub fn root_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.root_prefix = Some(prefix.into());
        self
    }

    pub fn logger(mut self, logger: LogCallback) -> Self {
        self.logger = Some(Some(logger));
        self
    }
}

impl fmt::Debug for TestUtilConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestUtilConfig")
            .field("verbose", &self.verbose)
            .field("wait_timeout_ms", &self.wait_timeout_ms)
            .field("wait_interval_ms", &self.wait_interval_ms)
            .field("root_prefix", &self.root_prefix)
            .field("logger_present", &self.logger.is_some())
            .finish()
    }
}

impl fmt::Debug for TestUtilConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestUtilConfigOverrides")
            .field("verbose", &self.verbose)
            .field("wait_timeout_ms", &self.wait_timeout_ms)
            .field("wait_interval_ms", &self.wait_interval_ms)
            .field("root_prefix", &self.root_prefix)
            .field("logger", &self.logger.as_ref().map(|inner| inner.is_some()))
            .finish()
    }
}

/// Errors that can arise while constructing a [`TestUtilConfig`].
#[derive(Debug, Error)]
pub enum TestUtilConfigError {
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, TestUtilConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| TestUtilConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_duration_ms(field: &'static str, value: &str) -> Result<u64, TestUtilConfigError> {
    let parsed = value
        .trim()
        .parse::<u64>()
        .map_err(|source| TestUtilConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })?;
    if parsed == 0 {
        return Err(TestUtilConfigError::ZeroDuration { field });
    }
    Ok(parsed)
}

/// Root prefixes always start and end with `/` so they can be stripped from
/// URL paths verbatim.
pub(crate) fn normalise_root_prefix(value: &str) -> String {
    let trimmed = value.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}
