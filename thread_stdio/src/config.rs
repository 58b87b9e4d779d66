//! Channel configuration
//!
//! Defaults match a 4 KiB buffer per direction and a 120 second stall
//! detector. Values can be loaded from JSON and overridden from the
//! environment:
//!
//! - `THREAD_STDIO_CAPACITY`
//! - `THREAD_STDIO_HUNG_TASK_TIMEOUT_SECS`
//! - `THREAD_STDIO_WAIT_SLICE_MS`

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Nominal capacity of each direction of a channel
pub const STDIO_REDIRECT_BUFSIZE: usize = 4096;

pub const DEFAULT_HUNG_TASK_TIMEOUT_SECS: u64 = 120;

const ENV_CAPACITY: &str = "THREAD_STDIO_CAPACITY";
const ENV_HUNG_TASK_TIMEOUT: &str = "THREAD_STDIO_HUNG_TASK_TIMEOUT_SECS";
const ENV_WAIT_SLICE: &str = "THREAD_STDIO_WAIT_SLICE_MS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StdioConfig {
    /// Nominal capacity of each buffer, in bytes
    pub capacity: usize,
    /// Period of the external stall detector; 0 disables it
    pub hung_task_timeout_secs: u64,
    /// Explicit length of one bounded wait, overrides the derived value
    pub wait_slice_ms: Option<u64>,
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            capacity: STDIO_REDIRECT_BUFSIZE,
            hung_task_timeout_secs: DEFAULT_HUNG_TASK_TIMEOUT_SECS,
            wait_slice_ms: None,
        }
    }
}

impl StdioConfig {
    /// Parse a JSON config. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the result fails `validate`.
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Defaults with environment overrides applied.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides looked up by variable name.
    ///
    /// # Errors
    ///
    /// Returns an error if a present value cannot be parsed or the result is invalid.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(capacity) = parse_var(&lookup, ENV_CAPACITY)? {
            self.capacity = capacity;
        }
        if let Some(secs) = parse_var(&lookup, ENV_HUNG_TASK_TIMEOUT)? {
            self.hung_task_timeout_secs = secs;
        }
        if let Some(ms) = parse_var(&lookup, ENV_WAIT_SLICE)? {
            self.wait_slice_ms = Some(ms);
        }
        self.validate()?;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a zero capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("capacity must be non-zero"));
        }
        Ok(())
    }

    /// Length of one bounded wait before the condition is re-checked.
    ///
    /// Half the stall detector period, so a waiter never looks stuck.
    #[must_use]
    pub fn wait_slice(&self) -> Duration {
        if let Some(ms) = self.wait_slice_ms {
            return Duration::from_millis(ms.max(1));
        }
        if self.hung_task_timeout_secs == 0 {
            return Duration::from_secs(1);
        }
        Duration::from_secs(self.hung_task_timeout_secs) / 2
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(ConfigError::Env { var, value }),
        },
    }
}
