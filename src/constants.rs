//! Constants for the stream element (timeouts, worker sizing, log tag).

use std::time::Duration;

/// Default bound for every blocking transport call (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound accepted for a configured timeout (1 hour).
pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default stack size for the worker thread that drives one element.
pub const DEFAULT_TASK_STACK_SIZE: usize = 1024 * 1024;

/// Smallest worker stack that still fits the async runtime and TLS stack.
pub const MIN_TASK_STACK_SIZE: usize = 64 * 1024;

/// Default tag attached to every log line emitted by an element.
pub const DEFAULT_TAG: &str = "http";

/// Number of body chunks that may be queued ahead of the upload connection.
pub(crate) const BODY_CHANNEL_CAPACITY: usize = 8;
