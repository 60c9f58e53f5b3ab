//! HTTP stream element: a pipeline stage backed by one HTTP resource.
//!
//! A reader element downloads the resource and feeds the pipeline; a writer
//! element uploads whatever the pipeline hands it. Each `open()` creates a
//! fresh transport session that lives until the matching `close()`. A
//! reader resumes from [`StreamInfo::byte_pos`] with a range request, so a
//! paused pipeline continues where it stopped.
//!
//! # Example
//!
//! ```no_run
//! use http_stream::{StreamConfig, StreamElement};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let element = StreamElement::http(StreamConfig::reader())?;
//! assert!(!element.is_open());
//! # Ok(())
//! # }
//! ```

mod error;
mod io;
mod lifecycle;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::StreamConfig;
use crate::hook::{HookContext, HookDispatcher, StreamHook};
use crate::info::StreamInfo;
use crate::pipeline::{Element, ElementHost};
use crate::transport::http::HttpConnector;
use crate::transport::{Connector, Transport};
use crate::user_agent;

pub use error::StreamError;

/// Direction of the transfer, fixed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Downloads the resource into the pipeline.
    #[default]
    Reader,
    /// Uploads pipeline data to the resource.
    Writer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reader => f.write_str("reader"),
            Self::Writer => f.write_str("writer"),
        }
    }
}

/// One HTTP stage of a pipeline.
pub struct StreamElement {
    config: StreamConfig,
    connector: Arc<dyn Connector>,
    hooks: HookDispatcher,
    transport: Option<Box<dyn Transport>>,
    is_open: bool,
    info: StreamInfo,
}

impl StreamElement {
    /// Creates an element that opens its sessions through `connector`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidConfig`] when `config` fails validation.
    pub fn new(config: StreamConfig, connector: Arc<dyn Connector>) -> Result<Self, StreamError> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            hooks: HookDispatcher::default(),
            transport: None,
            is_open: false,
            info: StreamInfo::default(),
        })
    }

    /// Creates an element backed by a reqwest [`HttpConnector`].
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] when `config` is invalid or the HTTP client
    /// cannot be built.
    pub fn http(config: StreamConfig) -> Result<Self, StreamError> {
        config.validate()?;
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(user_agent::default_stream_user_agent);
        let connector = HttpConnector::with_user_agent(config.timeout(), &user_agent)
            .map_err(|source| StreamError::ClientBuild { source })?;
        Self::new(config, Arc::new(connector))
    }

    /// Registers the hook called at every extension point.
    #[must_use]
    pub fn with_hook(mut self, hook: impl StreamHook + 'static) -> Self {
        self.hooks.set_hook(Box::new(hook));
        self
    }

    /// Registers the opaque value passed to the hook with every event.
    #[must_use]
    pub fn with_context(mut self, context: HookContext) -> Self {
        self.hooks.set_context(context);
        self
    }

    /// Transfer direction.
    #[must_use]
    pub fn role(&self) -> Role {
        self.config.role
    }

    /// Configuration the element was built with.
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Whether a session is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Current stream metadata.
    #[must_use]
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Sets the offset the next `open()` resumes from.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::AlreadyOpen`] while a session is open.
    pub fn seek_to(&mut self, byte_pos: u64) -> Result<(), StreamError> {
        if self.is_open {
            let uri = self
                .transport
                .as_ref()
                .map(|transport| transport.uri().to_string())
                .unwrap_or_default();
            return Err(StreamError::already_open(uri));
        }
        self.info.byte_pos = byte_pos;
        Ok(())
    }

    fn ensure_role(&self, role: Role, operation: &'static str) -> Result<(), StreamError> {
        if self.config.role == role {
            Ok(())
        } else {
            Err(StreamError::UnsupportedRole {
                role: self.config.role,
                operation,
            })
        }
    }
}

impl fmt::Debug for StreamElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamElement")
            .field("role", &self.config.role)
            .field("tag", &self.config.tag)
            .field("is_open", &self.is_open)
            .field("info", &self.info)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Element for StreamElement {
    async fn open(&mut self, host: &mut dyn ElementHost) -> Result<(), StreamError> {
        StreamElement::open(self, host).await
    }

    async fn read(
        &mut self,
        host: &mut dyn ElementHost,
        buf: &mut [u8],
    ) -> Result<usize, StreamError> {
        StreamElement::read(self, host, buf).await
    }

    async fn write(
        &mut self,
        _host: &mut dyn ElementHost,
        buf: &[u8],
    ) -> Result<usize, StreamError> {
        StreamElement::write(self, buf).await
    }

    async fn process(
        &mut self,
        host: &mut dyn ElementHost,
        buf: &mut [u8],
    ) -> Result<usize, StreamError> {
        StreamElement::process(self, host, buf).await
    }

    async fn close(&mut self, host: &mut dyn ElementHost) {
        StreamElement::close(self, host).await;
    }

    fn destroy(self: Box<Self>) {
        StreamElement::destroy(*self);
    }
}
