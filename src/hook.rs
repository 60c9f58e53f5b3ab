//! User hooks at the element's protocol extension points.
//!
//! A hook sees every step of the exchange and may take it over. Its answer
//! is a [`HookOutcome`]:
//!
//! - [`HookOutcome::Deferred`]: the element performs its default action.
//! - [`HookOutcome::Handled`]: the hook already moved that many bytes, for
//!   example through [`Transport::try_write`] or [`Transport::try_read`].
//! - [`HookOutcome::Failed`]: the current operation is aborted.
//!
//! When no hook is registered the dispatcher answers `Deferred`, so call
//! sites never have to special-case a missing hook.
//!
//! # Example
//!
//! ```
//! use http_stream::hook::{HookEvent, HookKind, HookOutcome};
//!
//! let hook = |event: &mut HookEvent<'_>| {
//!     if event.kind == HookKind::PreRequest
//!         && event.transport.set_header("Authorization", "Bearer token").is_err()
//!     {
//!         return HookOutcome::fail("cannot set credentials");
//!     }
//!     HookOutcome::Deferred
//! };
//! # let _ = hook;
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::transport::Transport;

/// Extension points at which the hook is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Request prepared, nothing sent yet. Headers and body may be adjusted.
    PreRequest,
    /// Request body is about to be sent (open of a reader, every writer write).
    OnRequest,
    /// Response bytes are wanted (every reader read).
    OnResponse,
    /// Request body fully sent, response head not read yet.
    PostRequest,
    /// Writer finished and its response head was read.
    FinishRequest,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PreRequest => "pre-request",
            Self::OnRequest => "on-request",
            Self::OnResponse => "on-response",
            Self::PostRequest => "post-request",
            Self::FinishRequest => "finish-request",
        };
        f.write_str(name)
    }
}

/// Bytes offered to the hook with an event.
#[derive(Debug)]
pub enum HookBuffer<'a> {
    /// No payload accompanies the event.
    Empty,
    /// Bytes the element is about to send.
    Outgoing(&'a [u8]),
    /// Space the hook may fill with response bytes.
    Incoming(&'a mut [u8]),
}

impl HookBuffer<'_> {
    /// Length of the offered buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Outgoing(bytes) => bytes.len(),
            Self::Incoming(bytes) => bytes.len(),
        }
    }

    /// Whether the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One hook invocation. Lives only for the duration of the call.
pub struct HookEvent<'a> {
    /// Which extension point fired.
    pub kind: HookKind,
    /// The session of the current open cycle.
    pub transport: &'a mut dyn Transport,
    /// Opaque value registered with the hook, passed through unchanged.
    pub context: Option<&'a (dyn Any + Send + Sync)>,
    /// Payload offered with the event.
    pub buffer: HookBuffer<'a>,
}

impl HookEvent<'_> {
    /// Length of the offered buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the event carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Downcasts the registered context.
    #[must_use]
    pub fn context_as<T: Any>(&self) -> Option<&T> {
        self.context.and_then(|context| context.downcast_ref::<T>())
    }
}

impl fmt::Debug for HookEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookEvent")
            .field("kind", &self.kind)
            .field("uri", &self.transport.uri())
            .field("has_context", &self.context.is_some())
            .field("len", &self.len())
            .finish()
    }
}

/// What the hook did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// Nothing; the element performs its default action.
    Deferred,
    /// The hook moved this many bytes itself.
    Handled(usize),
    /// Abort the current operation.
    Failed(String),
}

impl HookOutcome {
    /// Creates a failure outcome.
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Callback invoked at every extension point.
///
/// Runs inline on the element's worker and must return promptly.
pub trait StreamHook: Send {
    /// Handles one event.
    fn on_event(&mut self, event: &mut HookEvent<'_>) -> HookOutcome;
}

impl<F> StreamHook for F
where
    F: FnMut(&mut HookEvent<'_>) -> HookOutcome + Send,
{
    fn on_event(&mut self, event: &mut HookEvent<'_>) -> HookOutcome {
        self(event)
    }
}

/// Opaque value handed to the hook with every event.
pub type HookContext = Arc<dyn Any + Send + Sync>;

/// Holds the optional hook and its context, and builds events for it.
#[derive(Default)]
pub struct HookDispatcher {
    hook: Option<Box<dyn StreamHook>>,
    context: Option<HookContext>,
}

impl HookDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(hook: Option<Box<dyn StreamHook>>, context: Option<HookContext>) -> Self {
        Self { hook, context }
    }

    /// Registers or replaces the hook.
    pub fn set_hook(&mut self, hook: Box<dyn StreamHook>) {
        self.hook = Some(hook);
    }

    /// Registers or replaces the context.
    pub fn set_context(&mut self, context: HookContext) {
        self.context = Some(context);
    }

    /// Invokes the hook for `kind`, or answers [`HookOutcome::Deferred`] without one.
    pub fn dispatch(
        &mut self,
        kind: HookKind,
        transport: &mut dyn Transport,
        buffer: HookBuffer<'_>,
    ) -> HookOutcome {
        let Some(hook) = self.hook.as_mut() else {
            return HookOutcome::Deferred;
        };
        let mut event = HookEvent {
            kind,
            transport,
            context: self.context.as_deref(),
            buffer,
        };
        let outcome = hook.on_event(&mut event);
        trace!(%kind, len = event.len(), ?outcome, "hook dispatched");
        outcome
    }
}

impl fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookDispatcher")
            .field("registered", &self.hook.is_some())
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::test_support::scripted::{Script, ScriptedConnector};
    use crate::transport::{Connector, RequestConfig};

    fn transport() -> Box<dyn Transport> {
        ScriptedConnector::new(Script::default())
            .connect(RequestConfig::new("http://radio.test/live"))
            .unwrap()
    }

    #[test]
    fn test_dispatch_without_hook_defers() {
        let mut dispatcher = HookDispatcher::default();
        let mut transport = transport();
        let outcome = dispatcher.dispatch(
            HookKind::PreRequest,
            transport.as_mut(),
            HookBuffer::Empty,
        );
        assert_eq!(outcome, HookOutcome::Deferred);
    }

    #[test]
    fn test_dispatch_passes_kind_length_and_context() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        let hook = move |event: &mut HookEvent<'_>| {
            let tag = event.context_as::<&'static str>().copied();
            record.lock().unwrap().push((event.kind, event.len(), tag));
            HookOutcome::Handled(event.len())
        };
        let mut dispatcher =
            HookDispatcher::new(Some(Box::new(hook)), Some(Arc::new("station-7")));
        let mut transport = transport();

        let outcome = dispatcher.dispatch(
            HookKind::OnRequest,
            transport.as_mut(),
            HookBuffer::Outgoing(b"abcd"),
        );

        assert_eq!(outcome, HookOutcome::Handled(4));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(HookKind::OnRequest, 4, Some("station-7"))]
        );
    }

    #[test]
    fn test_hook_can_fill_incoming_buffer() {
        let hook = |event: &mut HookEvent<'_>| match &mut event.buffer {
            HookBuffer::Incoming(buf) => {
                buf[..3].copy_from_slice(b"ID3");
                HookOutcome::Handled(3)
            }
            _ => HookOutcome::Deferred,
        };
        let mut dispatcher = HookDispatcher::new(Some(Box::new(hook)), None);
        let mut transport = transport();
        let mut buf = [0_u8; 8];

        let outcome = dispatcher.dispatch(
            HookKind::OnResponse,
            transport.as_mut(),
            HookBuffer::Incoming(&mut buf),
        );

        assert_eq!(outcome, HookOutcome::Handled(3));
        assert_eq!(&buf[..3], b"ID3");
    }

    #[test]
    fn test_hook_failure_is_reported() {
        let hook = |_: &mut HookEvent<'_>| HookOutcome::fail("denied");
        let mut dispatcher = HookDispatcher::new(Some(Box::new(hook)), None);
        let mut transport = transport();
        let outcome = dispatcher.dispatch(
            HookKind::PostRequest,
            transport.as_mut(),
            HookBuffer::Empty,
        );
        assert_eq!(outcome, HookOutcome::Failed("denied".to_string()));
    }

    #[test]
    fn test_hook_kind_display() {
        assert_eq!(HookKind::PreRequest.to_string(), "pre-request");
        assert_eq!(HookKind::FinishRequest.to_string(), "finish-request");
    }
}
