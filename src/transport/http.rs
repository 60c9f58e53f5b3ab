//! reqwest-backed [`Transport`] implementation.
//!
//! The request is started on a background task as soon as the session is
//! opened. Body bytes written by the element travel through a bounded
//! channel that feeds the request body stream, so uploads of unknown length
//! go out chunked while the caller keeps writing. Opening a session with a
//! body waits until the client starts pulling that body, which happens once
//! the connection is up, so unreachable hosts fail `open` itself.
//! `fetch_headers` closes the channel and waits for the response head.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{FutureExt, stream};
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Body, Client, ClientBuilder, Method, Response, StatusCode};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, trace};
use url::Url;

use super::{Connector, HeaderObserver, RequestConfig, Transport, TransportError};
use crate::constants::{BODY_CHANNEL_CAPACITY, DEFAULT_TIMEOUT};
use crate::user_agent;

type BodyChunk = Result<Bytes, io::Error>;
type RequestOutcome = Result<Result<Response, reqwest::Error>, JoinError>;

/// Creates [`HttpTransport`] sessions that share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    /// Creates a connector whose connect and read phases are bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        Self::with_user_agent(timeout, &user_agent::default_stream_user_agent())
    }

    /// Creates a connector that identifies itself with `user_agent`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] if the TLS backend cannot be initialized.
    pub fn with_user_agent(timeout: Duration, user_agent: &str) -> Result<Self, TransportError> {
        let client = base_client_builder(timeout, user_agent)
            .build()
            .map_err(|source| TransportError::ClientBuild { source })?;
        Ok(Self { client })
    }
}

impl Connector for HttpConnector {
    fn connect(&self, config: RequestConfig) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(HttpTransport::new(self.client.clone(), config)?))
    }
}

fn base_client_builder(timeout: Duration, user_agent: &str) -> ClientBuilder {
    // Offsets are counted on the wire representation, so responses must not
    // be decompressed behind the element's back.
    Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .user_agent(user_agent)
}

/// A single HTTP exchange driven by the stream element.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    url: Url,
    uri: String,
    timeout: Duration,
    method: Option<Method>,
    headers: HeaderMap,
    request_body: Option<Bytes>,
    body_tx: Option<mpsc::Sender<BodyChunk>>,
    in_flight: Option<JoinHandle<Result<Response, reqwest::Error>>>,
    early_response: Option<Response>,
    response: Option<Response>,
    headers_fetched: bool,
    content_length: Option<u64>,
    status: Option<StatusCode>,
    remainder: Bytes,
    opened: bool,
}

impl HttpTransport {
    /// Prepares a session on `client` without touching the network.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] when `config.uri` is not an absolute URL.
    pub fn new(client: Client, config: RequestConfig) -> Result<Self, TransportError> {
        let url = Url::parse(&config.uri).map_err(|_| TransportError::invalid_url(&config.uri))?;
        let timeout = if config.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            config.timeout
        };
        Ok(Self {
            client,
            url,
            uri: config.uri,
            timeout,
            method: None,
            headers: HeaderMap::new(),
            request_body: None,
            body_tx: None,
            in_flight: None,
            early_response: None,
            response: None,
            headers_fetched: false,
            content_length: None,
            status: None,
            remainder: Bytes::new(),
            opened: false,
        })
    }

    fn body_unavailable(&self) -> TransportError {
        if self.opened {
            TransportError::closed(&self.uri)
        } else {
            TransportError::not_open(&self.uri)
        }
    }

    /// Records how a request ended before its body was complete.
    ///
    /// A server may answer without reading the whole body; that response is
    /// kept for `fetch_headers`.
    fn settle(&mut self, outcome: RequestOutcome) -> Result<(), TransportError> {
        match outcome {
            Ok(Ok(response)) => {
                debug!(status = %response.status(), "response arrived before the request body");
                self.early_response = Some(response);
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::network(&self.uri, e)),
            Err(_) => Err(TransportError::aborted(&self.uri)),
        }
    }

    /// Waits until the client pulls the request body, or the request ends.
    async fn await_connection(&mut self, pulled: oneshot::Receiver<()>) -> Result<(), TransportError> {
        let Some(mut in_flight) = self.in_flight.take() else {
            return Err(TransportError::not_open(&self.uri));
        };
        let outcome = tokio::select! {
            pulled = pulled => match pulled {
                Ok(()) => {
                    self.in_flight = Some(in_flight);
                    return Ok(());
                }
                // Body dropped without being polled: the request already ended.
                Err(_) => (&mut in_flight).await,
            },
            outcome = &mut in_flight => outcome,
            () = tokio::time::sleep(self.timeout) => {
                in_flight.abort();
                return Err(TransportError::timeout(&self.uri));
            }
        };
        self.settle(outcome)
    }

    /// Explains why the request body stopped accepting bytes.
    async fn body_closed_error(&mut self) -> TransportError {
        let Some(mut in_flight) = self.in_flight.take() else {
            return TransportError::closed(&self.uri);
        };
        let outcome = match tokio::time::timeout(self.timeout, &mut in_flight).await {
            Ok(outcome) => outcome,
            Err(_) => {
                in_flight.abort();
                return TransportError::timeout(&self.uri);
            }
        };
        match self.settle(outcome) {
            Ok(()) => TransportError::closed(&self.uri),
            Err(e) => e,
        }
    }

    fn drain_remainder(&mut self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.remainder.len());
        buf[..count].copy_from_slice(&self.remainder[..count]);
        let _ = self.remainder.split_to(count);
        count
    }
}

/// GET for body-less requests, POST whenever a body will follow.
fn default_method(content_length: Option<u64>) -> Method {
    match content_length {
        Some(0) => Method::GET,
        _ => Method::POST,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn set_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| TransportError::invalid_header(name))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| TransportError::invalid_header(name))?;
        if self.opened {
            debug!(header = %name, "header set after open is ignored");
        }
        self.headers.insert(header_name, header_value);
        Ok(())
    }

    fn set_method(&mut self, method: Method) {
        self.method = Some(method);
    }

    fn set_request_body(&mut self, body: Bytes) {
        self.request_body = Some(body);
    }

    fn pending_request_body(&self) -> Option<Bytes> {
        self.request_body.clone()
    }

    async fn open(&mut self, content_length: Option<u64>) -> Result<(), TransportError> {
        if self.opened {
            return Err(TransportError::already_open(&self.uri));
        }

        let method = self
            .method
            .clone()
            .unwrap_or_else(|| default_method(content_length));
        let mut request = self
            .client
            .request(method.clone(), self.url.clone())
            .headers(self.headers.clone());

        let mut pulled = None;
        if content_length != Some(0) {
            let (tx, rx) = mpsc::channel::<BodyChunk>(BODY_CHANNEL_CAPACITY);
            let (pulled_tx, pulled_rx) = oneshot::channel::<()>();
            let chunks = stream::unfold((rx, Some(pulled_tx)), |(mut rx, mut pulled)| async move {
                if let Some(pulled) = pulled.take() {
                    let _ = pulled.send(());
                }
                rx.recv().await.map(|chunk| (chunk, (rx, pulled)))
            });
            request = request.body(Body::wrap_stream(chunks));
            if let Some(length) = content_length {
                request = request.header(CONTENT_LENGTH, length.to_string());
            }
            self.body_tx = Some(tx);
            pulled = Some(pulled_rx);
        }

        debug!(%method, ?content_length, url = %self.url, "starting request");
        self.in_flight = Some(tokio::spawn(request.send()));
        if let Some(pulled) = pulled {
            if let Err(e) = self.await_connection(pulled).await {
                self.body_tx = None;
                return Err(e);
            }
        }
        self.opened = true;
        Ok(())
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        let Some(tx) = self.body_tx.as_ref() else {
            return Err(self.body_unavailable());
        };
        if buf.is_empty() {
            return Ok(0);
        }

        let chunk = Bytes::copy_from_slice(buf);
        match tokio::time::timeout(self.timeout, tx.send(Ok(chunk))).await {
            Ok(Ok(())) => {
                trace!(len = buf.len(), "queued body chunk");
                Ok(buf.len())
            }
            Ok(Err(_)) => {
                self.body_tx = None;
                Err(self.body_closed_error().await)
            }
            Err(_) => Err(TransportError::timeout(&self.uri)),
        }
    }

    fn try_write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        let Some(tx) = self.body_tx.as_ref() else {
            return Err(self.body_unavailable());
        };
        if buf.is_empty() {
            return Ok(0);
        }

        match tx.try_send(Ok(Bytes::copy_from_slice(buf))) {
            Ok(()) => {
                trace!(len = buf.len(), "queued body chunk without waiting");
                Ok(buf.len())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Ok(0),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.body_tx = None;
                Err(TransportError::closed(&self.uri))
            }
        }
    }

    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.remainder.is_empty() {
            let Some(response) = self.response.as_mut() else {
                return Err(TransportError::not_open(&self.uri));
            };
            match response.chunk().now_or_never() {
                Some(Ok(Some(chunk))) => self.remainder = chunk,
                Some(Ok(None)) | None => return Ok(0),
                Some(Err(e)) => return Err(TransportError::network(&self.uri, e)),
            }
        }
        Ok(self.drain_remainder(buf))
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.remainder.is_empty() {
            let Some(response) = self.response.as_mut() else {
                return Err(TransportError::not_open(&self.uri));
            };
            match response
                .chunk()
                .await
                .map_err(|e| TransportError::network(&self.uri, e))?
            {
                Some(chunk) => self.remainder = chunk,
                None => return Ok(0),
            }
        }

        Ok(self.drain_remainder(buf))
    }

    async fn fetch_headers(
        &mut self,
        observer: &mut dyn HeaderObserver,
    ) -> Result<Option<u64>, TransportError> {
        if self.headers_fetched {
            return Ok(self.content_length);
        }
        // Dropping the sender ends the request body.
        self.body_tx = None;

        let response = if let Some(response) = self.early_response.take() {
            response
        } else {
            let Some(mut in_flight) = self.in_flight.take() else {
                return Err(self.body_unavailable());
            };
            match tokio::time::timeout(self.timeout, &mut in_flight).await {
                Ok(Ok(Ok(response))) => response,
                Ok(Ok(Err(e))) => return Err(TransportError::network(&self.uri, e)),
                Ok(Err(_)) => return Err(TransportError::aborted(&self.uri)),
                Err(_) => {
                    in_flight.abort();
                    return Err(TransportError::timeout(&self.uri));
                }
            }
        };

        for (name, value) in response.headers() {
            match value.to_str() {
                Ok(value) => observer.on_header(name.as_str(), value),
                Err(_) => trace!(header = %name, "skipping non-ASCII header value"),
            }
        }

        self.status = Some(response.status());
        self.content_length = response.content_length();
        self.headers_fetched = true;
        self.response = Some(response);
        debug!(status = ?self.status, content_length = ?self.content_length, "response head received");
        Ok(self.content_length)
    }

    fn status_code(&self) -> Option<u16> {
        self.status.map(|status| status.as_u16())
    }

    async fn close(&mut self) {
        self.body_tx = None;
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.abort();
        }
        self.early_response = None;
        self.response = None;
        self.remainder = Bytes::new();
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn connector() -> HttpConnector {
        HttpConnector::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_connect_rejects_invalid_url() {
        let result = connector().connect(RequestConfig::new("not a url"));
        assert!(matches!(result, Err(TransportError::InvalidUrl { .. })));
    }

    #[test]
    fn test_default_method_depends_on_body() {
        assert_eq!(default_method(Some(0)), Method::GET);
        assert_eq!(default_method(Some(12)), Method::POST);
        assert_eq!(default_method(None), Method::POST);
    }

    #[tokio::test]
    async fn test_set_header_rejects_invalid_name() {
        let mut transport = connector()
            .connect(RequestConfig::new("http://127.0.0.1/a"))
            .unwrap();
        let result = transport.set_header("bad header", "x");
        assert!(matches!(result, Err(TransportError::InvalidHeader { .. })));
    }

    #[tokio::test]
    async fn test_read_before_headers_is_not_open() {
        let mut transport = connector()
            .connect(RequestConfig::new("http://127.0.0.1/a"))
            .unwrap();
        let mut buf = [0_u8; 8];
        let result = transport.read(&mut buf).await;
        assert!(matches!(result, Err(TransportError::NotOpen { .. })));
        assert!(matches!(
            transport.try_read(&mut buf),
            Err(TransportError::NotOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_try_write_before_open_is_not_open() {
        let mut transport = connector()
            .connect(RequestConfig::new("http://127.0.0.1/a"))
            .unwrap();
        let result = transport.try_write(b"early");
        assert!(matches!(result, Err(TransportError::NotOpen { .. })));
    }
}
