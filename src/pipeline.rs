//! Contract between the stream element and the pipeline that schedules it.
//!
//! The pipeline owns the URI, the element's run state and the byte buffers
//! linking neighbouring elements; it reaches the element only through the
//! [`Element`] entry points. The element reaches back only through
//! [`ElementHost`].

use std::fmt;
use std::io;

use async_trait::async_trait;

use crate::element::StreamError;
use crate::info::StreamInfo;
use crate::sniff::CodecFormat;

/// Run state of an element as seen by the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ElementState {
    /// Constructed, never run.
    #[default]
    Init,
    /// Moving data.
    Running,
    /// Suspended; the next open continues where this one stopped.
    Paused,
    /// Stopped by the pipeline.
    Stopped,
    /// Reached the end of its input.
    Finished,
    /// Stopped after a failure.
    Error,
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Finished => "finished",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Services the pipeline provides to one element.
#[async_trait]
pub trait ElementHost: Send {
    /// URI assigned to the element, if any.
    fn uri(&self) -> Option<&str>;

    /// Current run state of the element.
    fn state(&self) -> ElementState;

    /// Receives a snapshot of the element's stream metadata after a change.
    fn publish_info(&mut self, info: &StreamInfo);

    /// Receives the codec detected while opening.
    fn report_codec(&mut self, codec: CodecFormat);

    /// Pulls bytes from the upstream element; `Ok(0)` when none are left.
    async fn input(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Pushes bytes to the downstream element and returns how many were taken.
    async fn output(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Entry points the pipeline calls on an element.
///
/// The pipeline never calls two of these concurrently on the same element,
/// and calls [`destroy`](Element::destroy) only after the last `close`.
#[async_trait]
pub trait Element: Send {
    /// Starts a transfer cycle.
    async fn open(&mut self, host: &mut dyn ElementHost) -> Result<(), StreamError>;

    /// Fills `buf` from the element's source; `Ok(0)` means no data now.
    async fn read(
        &mut self,
        host: &mut dyn ElementHost,
        buf: &mut [u8],
    ) -> Result<usize, StreamError>;

    /// Sends `buf` to the element's sink.
    async fn write(&mut self, host: &mut dyn ElementHost, buf: &[u8])
    -> Result<usize, StreamError>;

    /// Moves one buffer from the element's input to its output.
    async fn process(
        &mut self,
        host: &mut dyn ElementHost,
        buf: &mut [u8],
    ) -> Result<usize, StreamError>;

    /// Ends the transfer cycle.
    async fn close(&mut self, host: &mut dyn ElementHost);

    /// Releases the element.
    fn destroy(self: Box<Self>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_state_defaults_to_init() {
        assert_eq!(ElementState::default(), ElementState::Init);
        assert_eq!(ElementState::Paused.to_string(), "paused");
    }
}
