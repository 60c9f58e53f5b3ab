//! Pipeline stand-in that records everything the element reports.

use std::collections::VecDeque;
use std::io;

use async_trait::async_trait;

use crate::info::StreamInfo;
use crate::pipeline::{ElementHost, ElementState};
use crate::sniff::CodecFormat;

#[derive(Debug, Default)]
pub(crate) struct RecordingHost {
    pub(crate) uri: Option<String>,
    pub(crate) state: ElementState,
    pub(crate) published: Vec<StreamInfo>,
    pub(crate) codecs: Vec<CodecFormat>,
    pub(crate) upstream: VecDeque<u8>,
    pub(crate) downstream: Vec<u8>,
    pub(crate) fail_output: bool,
}

impl RecordingHost {
    pub(crate) fn with_uri(uri: &str) -> Self {
        Self {
            uri: Some(uri.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn with_upstream(mut self, bytes: &[u8]) -> Self {
        self.upstream.extend(bytes.iter().copied());
        self
    }

    pub(crate) fn last_info(&self) -> Option<StreamInfo> {
        self.published.last().copied()
    }
}

#[async_trait]
impl ElementHost for RecordingHost {
    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn state(&self) -> ElementState {
        self.state
    }

    fn publish_info(&mut self, info: &StreamInfo) {
        self.published.push(*info);
    }

    fn report_codec(&mut self, codec: CodecFormat) {
        self.codecs.push(codec);
    }

    async fn input(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = buf.len().min(self.upstream.len());
        for (slot, byte) in buf.iter_mut().zip(self.upstream.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    async fn output(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_output {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "downstream closed"));
        }
        self.downstream.extend_from_slice(buf);
        Ok(buf.len())
    }
}
