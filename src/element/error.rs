//! Error types for the stream element.

use std::io;

use thiserror::Error;

use super::Role;
use crate::config::ConfigError;
use crate::hook::HookKind;
use crate::transport::TransportError;

/// Errors returned by the element's lifecycle and I/O entry points.
#[derive(Debug, Error)]
pub enum StreamError {
    /// `open` was called before the pipeline assigned a URI.
    #[error("need a URI to open the stream")]
    MissingUri,

    /// `open` was called on an element that is already open.
    #[error("stream for {uri} is already open")]
    AlreadyOpen {
        /// The URI of the open stream.
        uri: String,
    },

    /// An I/O entry point was called while the element is closed.
    #[error("stream is not open")]
    NotOpen,

    /// The operation does not exist for this element's role.
    #[error("{operation} is not supported by a {role} element")]
    UnsupportedRole {
        /// The element's role.
        role: Role,
        /// The rejected operation.
        operation: &'static str,
    },

    /// The element configuration was rejected.
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    /// The HTTP client backing the element could not be set up.
    #[error("HTTP client unavailable: {source}")]
    ClientBuild {
        /// The underlying transport error.
        #[source]
        source: TransportError,
    },

    /// The transport reported a failure.
    #[error("transport failure on {uri}: {source}")]
    Transport {
        /// The URI of the stream.
        uri: String,
        /// The underlying transport error.
        #[source]
        source: TransportError,
    },

    /// The hook asked to abort the operation.
    #[error("{kind} hook aborted the operation: {reason}")]
    HookAbort {
        /// The extension point whose hook failed.
        kind: HookKind,
        /// The reason given by the hook.
        reason: String,
    },

    /// The pipeline's buffer bridge failed.
    #[error("pipeline buffer error: {source}")]
    Host {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl StreamError {
    /// Creates an already-open error.
    pub fn already_open(uri: impl Into<String>) -> Self {
        Self::AlreadyOpen { uri: uri.into() }
    }

    /// Creates a transport error.
    pub fn transport(uri: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            uri: uri.into(),
            source,
        }
    }

    /// Creates a hook-abort error.
    pub fn hook_abort(kind: HookKind, reason: impl Into<String>) -> Self {
        Self::HookAbort {
            kind,
            reason: reason.into(),
        }
    }

    /// Creates a pipeline buffer error.
    pub fn host(source: io::Error) -> Self {
        Self::Host { source }
    }

    /// Whether the call was rejected before any state changed.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingUri
                | Self::AlreadyOpen { .. }
                | Self::NotOpen
                | Self::UnsupportedRole { .. }
                | Self::InvalidConfig(_)
        )
    }

    /// Whether reopening the stream later could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}
