//! Request/response session abstraction used by the stream element.
//!
//! A [`Connector`] creates one [`Transport`] per `open()` attempt. The
//! element drives it through a fixed sequence:
//!
//! ```text
//! connect -> set_header* -> open(len) -> write* -> fetch_headers -> read* -> close
//! ```
//!
//! Releasing a session is dropping it. [`http`] provides the reqwest-backed
//! implementation; tests substitute a scripted one.

mod error;
pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;

use crate::constants::DEFAULT_TIMEOUT;

pub use error::TransportError;

/// Everything needed to prepare one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    /// Absolute URL of the resource.
    pub uri: String,
    /// Bound applied to every blocking call on the session.
    pub timeout: Duration,
}

impl RequestConfig {
    /// Creates a request configuration with the default 30 second bound.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the per-call bound.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Receives response headers as the transport parses them.
pub trait HeaderObserver: Send {
    /// Called once per header, in arrival order.
    fn on_header(&mut self, name: &str, value: &str);
}

/// Observer that discards every header.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreHeaders;

impl HeaderObserver for IgnoreHeaders {
    fn on_header(&mut self, _name: &str, _value: &str) {}
}

/// Creates transport sessions.
pub trait Connector: Send + Sync {
    /// Prepares a session for `config`. Nothing is sent on the wire yet.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] when the target cannot be parsed.
    fn connect(&self, config: RequestConfig) -> Result<Box<dyn Transport>, TransportError>;
}

/// One request/response exchange.
#[async_trait]
pub trait Transport: Send {
    /// The URL this session targets.
    fn uri(&self) -> &str;

    /// Sets or replaces a request header. Only effective before [`open`](Self::open).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidHeader`] for unencodable names or values.
    fn set_header(&mut self, name: &str, value: &str) -> Result<(), TransportError>;

    /// Overrides the request method chosen by [`open`](Self::open).
    fn set_method(&mut self, method: Method);

    /// Stores a request body for the element to send after opening.
    fn set_request_body(&mut self, body: Bytes);

    /// The body stored with [`set_request_body`](Self::set_request_body), if any.
    fn pending_request_body(&self) -> Option<Bytes>;

    /// Starts the request.
    ///
    /// `Some(n)` declares an `n` byte body (`Some(0)` for none), `None` a
    /// streamed body of unknown length.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the session is already open or the
    /// request cannot be started.
    async fn open(&mut self, content_length: Option<u64>) -> Result<(), TransportError>;

    /// Sends request body bytes and returns how many were accepted.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the body is closed or the send times out.
    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError>;

    /// Queues request body bytes without waiting.
    ///
    /// Lets a hook, which runs synchronously, send bytes itself. Returns how
    /// many bytes were accepted; `Ok(0)` when the upload is momentarily
    /// backed up.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the session is not open or the body
    /// is closed.
    fn try_write(&mut self, buf: &[u8]) -> Result<usize, TransportError>;

    /// Copies response bytes that already arrived, without waiting.
    ///
    /// Returns `Ok(0)` when nothing is buffered right now.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on network failure or before headers were fetched.
    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Reads response body bytes; `Ok(0)` once the body is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on network failure or before headers were fetched.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Finishes the request body and waits for the response head.
    ///
    /// Every header is reported to `observer` the first time this runs.
    /// Returns the response `Content-Length`, when present.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the request fails or times out.
    async fn fetch_headers(
        &mut self,
        observer: &mut dyn HeaderObserver,
    ) -> Result<Option<u64>, TransportError>;

    /// Status code of the response, once headers were fetched.
    fn status_code(&self) -> Option<u16>;

    /// Stops any in-flight exchange. The session cannot be reopened.
    async fn close(&mut self);
}
