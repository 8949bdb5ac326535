//! Runtime tuning knobs for the multiplexer.
//!
//! Every field has a sensible default, so a plain [`MuxConfig::default`] (or
//! an empty TOML document) yields a working configuration.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse TOML.
    #[error("failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A field holds a value the multiplexer cannot run with.
    #[error("invalid configuration value for '{key}': {message}")]
    ValidationError { key: String, message: String },
}

impl ConfigError {
    /// Create a validation error.
    pub fn validation<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::ValidationError {
            key: key.into(),
            message: message.into(),
        }
    }
}

// Default configuration constants
pub const DEFAULT_QUEUE_CAPACITY: usize = 8192;
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_OBSERVER_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 16;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 10;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 1000;

/// Configuration for a [`SerialMux`](crate::SerialMux) instance.
#[derive(Debug, Clone, Deserialize)]
pub struct MuxConfig {
    /// Maximum number of pending outbound frames per port; a full queue
    /// suspends `send` callers until the writer drains it.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum bytes pulled from a transport per read.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Maximum chunks buffered per observer before fan-out starts dropping
    /// for that observer.
    #[serde(default = "default_observer_queue_capacity")]
    pub observer_queue_capacity: usize,

    /// Blocking-read timeout handed to the transport; bounds how long a
    /// reader task sleeps between shutdown checks on an idle line.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Consecutive read or write failures tolerated before a port task is
    /// marked faulted and stops.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// First retry delay after a failure; doubles on each consecutive
    /// failure.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on the retry delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_observer_queue_capacity() -> usize {
    DEFAULT_OBSERVER_QUEUE_CAPACITY
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_max_consecutive_errors() -> u32 {
    DEFAULT_MAX_CONSECUTIVE_ERRORS
}

fn default_initial_backoff_ms() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MS
}

fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            read_buffer_size: default_read_buffer_size(),
            observer_queue_capacity: default_observer_queue_capacity(),
            read_timeout_ms: default_read_timeout_ms(),
            max_consecutive_errors: default_max_consecutive_errors(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl MuxConfig {
    /// Parse a configuration from a TOML document; missing keys fall back to
    /// their defaults. Rejects values the multiplexer cannot run with.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every field holds a runnable value.
    ///
    /// Zero-sized queues and buffers are rejected: the bounded channels
    /// assert a positive capacity, and a zero read buffer could never make
    /// progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::validation("queue_capacity", "must be at least 1"));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::validation("read_buffer_size", "must be at least 1"));
        }
        if self.observer_queue_capacity == 0 {
            return Err(ConfigError::validation(
                "observer_queue_capacity",
                "must be at least 1",
            ));
        }
        if self.max_consecutive_errors == 0 {
            return Err(ConfigError::validation(
                "max_consecutive_errors",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Clamp any zero capacity up to 1 so directly constructed configs can
    /// never panic a queue constructor.
    pub(crate) fn sanitized(mut self) -> Self {
        if self.validate().is_ok() {
            return self;
        }
        warn!("zero-sized capacities in config clamped to 1");
        self.queue_capacity = self.queue_capacity.max(1);
        self.read_buffer_size = self.read_buffer_size.max(1);
        self.observer_queue_capacity = self.observer_queue_capacity.max(1);
        self.max_consecutive_errors = self.max_consecutive_errors.max(1);
        self
    }

    /// The blocking-read timeout as a `Duration`.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub(crate) fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub(crate) fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}
