//! Error types for the transport layer.

use thiserror::Error;

/// Errors reported by a [`Transport`](super::Transport) session.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request target is not a valid absolute URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The rejected URL string.
        url: String,
    },

    /// A header name or value could not be encoded.
    #[error("invalid header {name}")]
    InvalidHeader {
        /// The header name that was rejected.
        name: String,
    },

    /// Connection, TLS or protocol failure.
    #[error("network error on {url}: {source}")]
    Network {
        /// The URL of the failed request.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The configured bound elapsed before the call completed.
    #[error("timeout on {url}")]
    Timeout {
        /// The URL of the request that timed out.
        url: String,
    },

    /// The request body can no longer accept bytes.
    #[error("request to {url} already finished")]
    Closed {
        /// The URL of the finished request.
        url: String,
    },

    /// The operation needs an open session.
    #[error("session for {url} is not open")]
    NotOpen {
        /// The URL of the session.
        url: String,
    },

    /// `open` was called twice on the same session.
    #[error("session for {url} is already open")]
    AlreadyOpen {
        /// The URL of the session.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// The background request task stopped without producing a response.
    #[error("request to {url} was aborted")]
    Aborted {
        /// The URL of the aborted request.
        url: String,
    },
}

impl TransportError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid header error.
    pub fn invalid_header(name: impl Into<String>) -> Self {
        Self::InvalidHeader { name: name.into() }
    }

    /// Creates a network error, promoting client timeouts to [`Self::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a closed-body error.
    pub fn closed(url: impl Into<String>) -> Self {
        Self::Closed { url: url.into() }
    }

    /// Creates a not-open error.
    pub fn not_open(url: impl Into<String>) -> Self {
        Self::NotOpen { url: url.into() }
    }

    /// Creates an already-open error.
    pub fn already_open(url: impl Into<String>) -> Self {
        Self::AlreadyOpen { url: url.into() }
    }

    /// Creates an aborted-request error.
    pub fn aborted(url: impl Into<String>) -> Self {
        Self::Aborted { url: url.into() }
    }

    /// Whether retrying the transfer later could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::Closed { .. } | Self::Aborted { .. }
        )
    }
}
