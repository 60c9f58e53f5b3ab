//! In-memory transport that replays a scripted response and journals calls.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;

use crate::transport::{Connector, HeaderObserver, RequestConfig, Transport, TransportError};

#[derive(Debug, Clone)]
pub(crate) struct Script {
    pub(crate) status: u16,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) content_length: Option<u64>,
    pub(crate) body: Vec<u8>,
    pub(crate) request_body: Option<Bytes>,
    pub(crate) fail_open: bool,
    pub(crate) fail_fetch: bool,
    pub(crate) fail_write: bool,
    pub(crate) short_write: bool,
    pub(crate) fail_read: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            content_length: None,
            body: Vec::new(),
            request_body: None,
            fail_open: false,
            fail_fetch: false,
            fail_write: false,
            short_write: false,
            fail_read: false,
        }
    }
}

impl Script {
    pub(crate) fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub(crate) fn with_body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self.content_length = Some(body.len() as u64);
        self
    }

    pub(crate) fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub(crate) fn with_request_body(mut self, body: &[u8]) -> Self {
        self.request_body = Some(Bytes::copy_from_slice(body));
        self
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Journal {
    pub(crate) connects: Vec<RequestConfig>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) methods: Vec<Method>,
    pub(crate) opens: Vec<Option<u64>>,
    pub(crate) writes: Vec<Vec<u8>>,
    pub(crate) pushes: Vec<Vec<u8>>,
    pub(crate) reads: usize,
    pub(crate) fetches: usize,
    pub(crate) closes: usize,
    pub(crate) releases: usize,
}

impl Journal {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedConnector {
    script: Script,
    followups: Arc<Mutex<VecDeque<Script>>>,
    journal: Arc<Mutex<Journal>>,
}

impl ScriptedConnector {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            followups: Arc::default(),
            journal: Arc::default(),
        }
    }

    /// Answers the next session with `script`; sessions after the queued
    /// ones fall back to the first script.
    #[allow(clippy::unwrap_used)]
    pub(crate) fn then(self, script: Script) -> Self {
        self.followups.lock().unwrap().push_back(script);
        self
    }

    #[allow(clippy::unwrap_used)]
    pub(crate) fn journal(&self) -> Journal {
        self.journal.lock().unwrap().clone()
    }
}

impl Connector for ScriptedConnector {
    #[allow(clippy::unwrap_used)]
    fn connect(&self, config: RequestConfig) -> Result<Box<dyn Transport>, TransportError> {
        self.journal.lock().unwrap().connects.push(config.clone());
        let script = if self.journal.lock().unwrap().connects.len() == 1 {
            self.script.clone()
        } else {
            self.followups
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.script.clone())
        };
        Ok(Box::new(ScriptedTransport {
            uri: config.uri,
            script,
            journal: Arc::clone(&self.journal),
            position: 0,
            fetched: false,
        }))
    }
}

#[derive(Debug)]
pub(crate) struct ScriptedTransport {
    uri: String,
    script: Script,
    journal: Arc<Mutex<Journal>>,
    position: usize,
    fetched: bool,
}

#[allow(clippy::unwrap_used)]
impl ScriptedTransport {
    fn record(&self, update: impl FnOnce(&mut Journal)) {
        update(&mut self.journal.lock().unwrap());
    }

    fn take_body(&mut self, buf: &mut [u8]) -> usize {
        let rest = &self.script.body[self.position..];
        let count = rest.len().min(buf.len());
        buf[..count].copy_from_slice(&rest[..count]);
        self.position += count;
        count
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn set_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        self.record(|journal| journal.headers.push((name.to_string(), value.to_string())));
        Ok(())
    }

    fn set_method(&mut self, method: Method) {
        self.record(|journal| journal.methods.push(method));
    }

    fn set_request_body(&mut self, body: Bytes) {
        self.script.request_body = Some(body);
    }

    fn pending_request_body(&self) -> Option<Bytes> {
        self.script.request_body.clone()
    }

    async fn open(&mut self, content_length: Option<u64>) -> Result<(), TransportError> {
        self.record(|journal| journal.opens.push(content_length));
        if self.script.fail_open {
            return Err(TransportError::timeout(&self.uri));
        }
        Ok(())
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        if self.script.fail_write {
            return Err(TransportError::closed(&self.uri));
        }
        self.record(|journal| journal.writes.push(buf.to_vec()));
        if self.script.short_write {
            return Ok(0);
        }
        Ok(buf.len())
    }

    fn try_write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        if self.script.fail_write {
            return Err(TransportError::closed(&self.uri));
        }
        self.record(|journal| journal.pushes.push(buf.to_vec()));
        Ok(buf.len())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.record(|journal| journal.reads += 1);
        if self.script.fail_read {
            return Err(TransportError::aborted(&self.uri));
        }
        Ok(self.take_body(buf))
    }

    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.script.fail_read {
            return Err(TransportError::aborted(&self.uri));
        }
        Ok(self.take_body(buf))
    }

    async fn fetch_headers(
        &mut self,
        observer: &mut dyn HeaderObserver,
    ) -> Result<Option<u64>, TransportError> {
        self.record(|journal| journal.fetches += 1);
        if self.script.fail_fetch {
            return Err(TransportError::timeout(&self.uri));
        }
        if !self.fetched {
            for (name, value) in &self.script.headers {
                observer.on_header(name, value);
            }
            self.fetched = true;
        }
        Ok(self.script.content_length)
    }

    fn status_code(&self) -> Option<u16> {
        self.fetched.then_some(self.script.status)
    }

    async fn close(&mut self) {
        self.record(|journal| journal.closes += 1);
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.releases += 1;
        }
    }
}
