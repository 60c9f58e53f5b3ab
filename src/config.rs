//! Construction-time configuration of a stream element.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_TAG, DEFAULT_TASK_STACK_SIZE, DEFAULT_TIMEOUT, MAX_TIMEOUT, MIN_TASK_STACK_SIZE,
};
use crate::element::Role;

/// Errors raised while loading or validating a [`StreamConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document is not valid JSON for this type.
    #[error("invalid stream configuration: {source}")]
    Parse {
        /// The underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },

    /// A field holds a value outside its accepted range.
    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value, rendered for the message.
        value: String,
        /// Human-readable accepted range.
        expected: &'static str,
    },
}

/// How an element is built: role, bounds and worker sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Whether the element downloads (reader) or uploads (writer).
    pub role: Role,
    /// Bound for every blocking transport call, in seconds.
    pub timeout_secs: u64,
    /// Stack size of the worker thread that drives the element.
    pub task_stack_size: usize,
    /// Tag attached to the element's log lines.
    pub tag: String,
    /// User-Agent override; the crate default is used when unset.
    pub user_agent: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            role: Role::Reader,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            task_stack_size: DEFAULT_TASK_STACK_SIZE,
            tag: DEFAULT_TAG.to_string(),
            user_agent: None,
        }
    }
}

impl StreamConfig {
    /// Default configuration for a downloading element.
    #[must_use]
    pub fn reader() -> Self {
        Self::default()
    }

    /// Default configuration for an uploading element.
    #[must_use]
    pub fn writer() -> Self {
        Self {
            role: Role::Writer,
            ..Self::default()
        }
    }

    /// Parses a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the document is malformed or a value is out of range.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides the per-call bound.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Overrides the log tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Bound for every blocking transport call.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Checks every field against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_TIMEOUT.as_secs()).contains(&self.timeout_secs) {
            return Err(ConfigError::OutOfRange {
                field: "timeout_secs",
                value: self.timeout_secs.to_string(),
                expected: "1..=3600",
            });
        }
        if self.task_stack_size < MIN_TASK_STACK_SIZE {
            return Err(ConfigError::OutOfRange {
                field: "task_stack_size",
                value: self.task_stack_size.to_string(),
                expected: "at least 65536",
            });
        }
        if self.tag.trim().is_empty() {
            return Err(ConfigError::OutOfRange {
                field: "tag",
                value: format!("{:?}", self.tag),
                expected: "a non-empty string",
            });
        }
        if self
            .user_agent
            .as_deref()
            .is_some_and(|ua| ua.trim().is_empty())
        {
            return Err(ConfigError::OutOfRange {
                field: "user_agent",
                value: "\"\"".to_string(),
                expected: "a non-empty string when set",
            });
        }
        Ok(())
    }
}
