// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector configuration.
//!
//! [`Settings`] is the plain, loadable form: built from defaults, from the
//! environment, or deserialized from a host's own configuration file.
//! [`Config`] is the live record a collector reads on every event. Each of its
//! fields is stored independently so a reader never sees a torn value, but
//! there is no snapshot consistency across fields.
//!
//! # Environment
//!
//! | variable                      | field             |
//! |-------------------------------|-------------------|
//! | `LOGMETRICS_BATCHING_MODE`    | `batching_mode`   |
//! | `LOGMETRICS_INTERVAL`         | `interval`        |
//! | `LOGMETRICS_MAX_BUFFER_SIZE`  | `max_buffer_size` |
//! | `LOGMETRICS_OVERFLOW_POLICY`  | `overflow_policy` |
//! | `LOGMETRICS_MAX_LINE_LENGTH`  | `max_line_length` |
//! | `LOGMETRICS_SOURCE`           | `source`          |
//! | `SILENT_METRICS` (`1`/`true`) | `silent`          |
//! | `LOGMETRICS_ENV=test`         | `silent`          |

use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::errors::{ConfigError, ParseError};
use crate::formatter::DEFAULT_MAX_LINE_LENGTH;

pub const DEFAULT_INTERVAL_SECS: f64 = 5.0;
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 10_000;

/// How delivered events reach the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchingMode {
    /// Every event is formatted and emitted as it arrives.
    #[default]
    Immediate,
    /// Events accumulate in the bucket until a time or size trigger flushes it.
    Interval,
}

impl FromStr for BatchingMode {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "immediate" => Ok(BatchingMode::Immediate),
            "interval" => Ok(BatchingMode::Interval),
            _ => Err(ParseError::UnsupportedMode(value.to_string())),
        }
    }
}

impl fmt::Display for BatchingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchingMode::Immediate => f.write_str("immediate"),
            BatchingMode::Interval => f.write_str("interval"),
        }
    }
}

/// What to do when the bucket reaches `max_buffer_size` entries.
///
/// Every policy currently flushes the bucket early; none of them discards data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Accepted under its historical name. Flushes early like [`OverflowPolicy::Flush`].
    #[default]
    DropNewest,
    Flush,
}

impl FromStr for OverflowPolicy {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "drop_newest" => Ok(OverflowPolicy::DropNewest),
            "flush" => Ok(OverflowPolicy::Flush),
            _ => Err(ParseError::UnsupportedPolicy(value.to_string())),
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::DropNewest => f.write_str("drop_newest"),
            OverflowPolicy::Flush => f.write_str("flush"),
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase().replace('-', "_")
}

/// Lenient: an unknown label falls back to the default instead of failing the
/// whole document.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = ParseError> + Default,
{
    let value = String::deserialize(deserializer)?;
    Ok(value.parse().unwrap_or_else(|e| {
        debug!("{e}, using default");
        T::default()
    }))
}

impl<'de> Deserialize<'de> for BatchingMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        lenient(deserializer)
    }
}

impl<'de> Deserialize<'de> for OverflowPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        lenient(deserializer)
    }
}

/// Plain collector settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub batching_mode: BatchingMode,
    /// Seconds between time-triggered flushes in interval mode. `0` disables
    /// the time trigger.
    pub interval: f64,
    /// Entries that trigger an early flush in interval mode. `0` disables the
    /// size trigger.
    pub max_buffer_size: usize,
    pub overflow_policy: OverflowPolicy,
    /// Byte limit of one emitted line.
    pub max_line_length: usize,
    /// Suppresses collection entirely, not just output.
    pub silent: bool,
    /// Tag prepended to every emitted line as `source=<id>`.
    pub source: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batching_mode: BatchingMode::Immediate,
            interval: DEFAULT_INTERVAL_SECS,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            overflow_policy: OverflowPolicy::DropNewest,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            silent: false,
            source: None,
        }
    }
}

fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            debug!("Ignoring unparseable {name}={raw}, using default");
            None
        }
    }
}

impl Settings {
    /// Create settings from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let silent = env::var("SILENT_METRICS")
            .map(|val| matches!(val.trim().to_lowercase().as_str(), "1" | "true"))
            .unwrap_or(false)
            || env::var("LOGMETRICS_ENV").is_ok_and(|val| val.trim() == "test");

        let settings = Self {
            batching_mode: env_parsed("LOGMETRICS_BATCHING_MODE")
                .unwrap_or(defaults.batching_mode),
            interval: env_parsed("LOGMETRICS_INTERVAL").unwrap_or(defaults.interval),
            max_buffer_size: env_parsed("LOGMETRICS_MAX_BUFFER_SIZE")
                .unwrap_or(defaults.max_buffer_size),
            overflow_policy: env_parsed("LOGMETRICS_OVERFLOW_POLICY")
                .unwrap_or(defaults.overflow_policy),
            max_line_length: env_parsed("LOGMETRICS_MAX_LINE_LENGTH")
                .unwrap_or(defaults.max_line_length),
            silent,
            source: env::var("LOGMETRICS_SOURCE")
                .ok()
                .map(|val| val.trim().to_string())
                .filter(|val| !val.is_empty()),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.interval.is_finite() || self.interval < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "interval must be a finite, non-negative number of seconds, got {}",
                self.interval
            )));
        }

        if Duration::try_from_secs_f64(self.interval).is_err() {
            return Err(ConfigError::Invalid(format!(
                "interval of {} seconds is too long",
                self.interval
            )));
        }

        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid(
                "max_line_length must be greater than 0".to_string(),
            ));
        }

        if let Some(source) = &self.source {
            if source.contains(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!(
                    "source '{source}' cannot contain whitespace"
                )));
            }
        }

        Ok(())
    }
}

/// Live configuration shared between a collector and whoever tunes it.
#[derive(Debug)]
pub struct Config {
    batching_mode: AtomicU8,
    interval_bits: AtomicU64,
    max_buffer_size: AtomicUsize,
    overflow_policy: AtomicU8,
    max_line_length: AtomicUsize,
    silent: AtomicBool,
    source: RwLock<Option<Arc<str>>>,
}

impl Default for Config {
    fn default() -> Self {
        Config::from(Settings::default())
    }
}

impl From<Settings> for Config {
    fn from(settings: Settings) -> Self {
        let config = Config {
            batching_mode: AtomicU8::new(0),
            interval_bits: AtomicU64::new(0),
            max_buffer_size: AtomicUsize::new(0),
            overflow_policy: AtomicU8::new(0),
            max_line_length: AtomicUsize::new(0),
            silent: AtomicBool::new(false),
            source: RwLock::new(None),
        };
        config.apply(&settings);
        config
    }
}

impl Config {
    /// Writes every field from `settings`, one at a time.
    pub fn apply(&self, settings: &Settings) {
        self.set_batching_mode(settings.batching_mode);
        self.set_interval(settings.interval);
        self.set_max_buffer_size(settings.max_buffer_size);
        self.set_overflow_policy(settings.overflow_policy);
        self.set_max_line_length(settings.max_line_length);
        self.set_silent(settings.silent);
        self.set_source(settings.source.as_deref());
    }

    pub fn snapshot(&self) -> Settings {
        Settings {
            batching_mode: self.batching_mode(),
            interval: self.interval(),
            max_buffer_size: self.max_buffer_size(),
            overflow_policy: self.overflow_policy(),
            max_line_length: self.max_line_length(),
            silent: self.silent(),
            source: self.source().map(|s| s.to_string()),
        }
    }

    pub fn batching_mode(&self) -> BatchingMode {
        match self.batching_mode.load(Ordering::Acquire) {
            0 => BatchingMode::Immediate,
            _ => BatchingMode::Interval,
        }
    }

    pub fn set_batching_mode(&self, mode: BatchingMode) {
        let raw = match mode {
            BatchingMode::Immediate => 0,
            BatchingMode::Interval => 1,
        };
        self.batching_mode.store(raw, Ordering::Release);
    }

    /// Seconds between time-triggered flushes.
    pub fn interval(&self) -> f64 {
        f64::from_bits(self.interval_bits.load(Ordering::Acquire))
    }

    /// The time trigger as a duration, or `None` when it is disabled.
    ///
    /// Intervals too long for a [`Duration`] saturate to [`Duration::MAX`].
    pub fn interval_duration(&self) -> Option<Duration> {
        let secs = self.interval();
        (secs.is_finite() && secs > 0.0)
            .then(|| Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }

    pub fn set_interval(&self, secs: f64) {
        self.interval_bits.store(secs.to_bits(), Ordering::Release);
    }

    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size.load(Ordering::Acquire)
    }

    pub fn set_max_buffer_size(&self, entries: usize) {
        self.max_buffer_size.store(entries, Ordering::Release);
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        match self.overflow_policy.load(Ordering::Acquire) {
            0 => OverflowPolicy::DropNewest,
            _ => OverflowPolicy::Flush,
        }
    }

    pub fn set_overflow_policy(&self, policy: OverflowPolicy) {
        let raw = match policy {
            OverflowPolicy::DropNewest => 0,
            OverflowPolicy::Flush => 1,
        };
        self.overflow_policy.store(raw, Ordering::Release);
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length.load(Ordering::Acquire)
    }

    pub fn set_max_line_length(&self, bytes: usize) {
        self.max_line_length.store(bytes, Ordering::Release);
    }

    pub fn silent(&self) -> bool {
        self.silent.load(Ordering::Acquire)
    }

    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::Release);
    }

    pub fn source(&self) -> Option<Arc<str>> {
        self.source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whitespace inside `source` would split the tag from the first token,
    /// so each run of it is replaced by `_`. A blank source clears the tag.
    pub fn set_source(&self, source: Option<&str>) {
        let source = source
            .map(|s| s.split_whitespace().collect::<Vec<_>>().join("_"))
            .filter(|s| !s.is_empty());
        if let Some(sanitized) = &source {
            debug!("Using metrics source {sanitized}");
        }
        *self.source.write().unwrap_or_else(PoisonError::into_inner) = source.map(Arc::from);
    }
}
