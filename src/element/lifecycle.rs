//! Open/close/destroy state machine of the stream element.

use tracing::{debug, error, info, instrument, warn};

use super::{Role, StreamElement, StreamError};
use crate::hook::{HookBuffer, HookKind, HookOutcome};
use crate::info::StreamInfo;
use crate::pipeline::{ElementHost, ElementState};
use crate::sniff::{CodecFormat, CodecSniffer};
use crate::transport::{IgnoreHeaders, RequestConfig, Transport, TransportError};

/// Total resource size: a partial response only counts what follows the offset.
fn total_size(status: Option<u16>, byte_pos: u64, content_length: Option<u64>) -> Option<u64> {
    match (status, content_length) {
        (Some(206), Some(remaining)) => Some(byte_pos.saturating_add(remaining)),
        (_, content_length) => content_length,
    }
}

impl StreamElement {
    /// Opens a fresh session on the host's URI.
    ///
    /// A reader sends its request, reads the response head and classifies
    /// the codec before returning; a writer only starts a chunked upload.
    /// Any failure releases the session created by this call.
    ///
    /// # Errors
    ///
    /// - [`StreamError::MissingUri`] / [`StreamError::AlreadyOpen`] without
    ///   touching any state
    /// - [`StreamError::Transport`] when the session cannot be started
    /// - [`StreamError::HookAbort`] when a hook fails the open
    #[instrument(skip_all, fields(tag = %self.config.tag, role = %self.config.role))]
    pub async fn open(&mut self, host: &mut dyn ElementHost) -> Result<(), StreamError> {
        let Some(uri) = host.uri().map(str::to_owned) else {
            error!("need a URI to open");
            return Err(StreamError::MissingUri);
        };
        if self.is_open {
            error!(%uri, "already opened");
            return Err(StreamError::already_open(uri));
        }

        let request = RequestConfig::new(&uri).with_timeout(self.config.timeout());
        let mut transport = self
            .connector
            .connect(request)
            .map_err(|e| StreamError::transport(&uri, e))?;

        let mut info = self.info;
        if let Err(err) = self.start_session(transport.as_mut(), &mut info).await {
            error!(%uri, error = %err, "failed to open http stream");
            transport.close().await;
            return Err(err);
        }

        self.transport = Some(transport);
        self.is_open = true;
        if self.config.role == Role::Reader {
            self.info = info;
            host.publish_info(&self.info);
            host.report_codec(self.info.codec);
        }
        debug!(%uri, byte_pos = self.info.byte_pos, "stream opened");
        Ok(())
    }

    async fn start_session(
        &mut self,
        transport: &mut dyn Transport,
        info: &mut StreamInfo,
    ) -> Result<(), StreamError> {
        if info.byte_pos > 0 {
            let range = format!("bytes={}-", info.byte_pos);
            debug!(%range, "resuming with range request");
            transport
                .set_header("Range", &range)
                .map_err(|e| StreamError::transport(transport.uri(), e))?;
        }

        if let HookOutcome::Failed(reason) =
            self.hooks
                .dispatch(HookKind::PreRequest, transport, HookBuffer::Empty)
        {
            return Err(StreamError::hook_abort(HookKind::PreRequest, reason));
        }

        if self.config.role == Role::Writer {
            return transport
                .open(None)
                .await
                .map_err(|e| StreamError::transport(transport.uri(), e));
        }

        let body = transport.pending_request_body().unwrap_or_default();
        transport
            .open(Some(body.len() as u64))
            .await
            .map_err(|e| StreamError::transport(transport.uri(), e))?;

        match self
            .hooks
            .dispatch(HookKind::OnRequest, transport, HookBuffer::Outgoing(&body))
        {
            HookOutcome::Failed(reason) => {
                return Err(StreamError::hook_abort(HookKind::OnRequest, reason));
            }
            HookOutcome::Handled(sent) => debug!(sent, "request body sent by hook"),
            HookOutcome::Deferred if !body.is_empty() => {
                let written = transport
                    .write(&body)
                    .await
                    .map_err(|e| StreamError::transport(transport.uri(), e))?;
                if written == 0 {
                    return Err(StreamError::transport(
                        transport.uri(),
                        TransportError::closed(transport.uri()),
                    ));
                }
                debug!(len = body.len(), "request body sent");
            }
            HookOutcome::Deferred => {}
        }

        if let HookOutcome::Failed(reason) =
            self.hooks
                .dispatch(HookKind::PostRequest, transport, HookBuffer::Empty)
        {
            return Err(StreamError::hook_abort(HookKind::PostRequest, reason));
        }

        let content_length = transport
            .fetch_headers(&mut CodecSniffer::new(info))
            .await
            .map_err(|e| StreamError::transport(transport.uri(), e))?;
        let status = transport.status_code();
        info.total_bytes = total_size(status, info.byte_pos, content_length);
        debug!(?status, total_bytes = ?info.total_bytes, "response head received");

        if !status.is_some_and(|code| (200..300).contains(&code)) {
            // Kept open so callers can still read an error body.
            warn!(?status, "invalid HTTP stream status");
        }
        if info.codec != CodecFormat::None {
            info!(codec = %info.codec, "codec detected");
        }
        Ok(())
    }

    /// Ends the current session. Does nothing when the element is not open.
    ///
    /// A writer first signals the end of its upload, waits for the response
    /// head and notifies the hook; hook failures only skip the remaining
    /// upload steps. The session is always released. Unless the pipeline
    /// reports [`ElementState::Paused`], the resume offset goes back to 0.
    #[instrument(skip_all, fields(tag = %self.config.tag, role = %self.config.role))]
    pub async fn close(&mut self, host: &mut dyn ElementHost) {
        if !self.is_open {
            return;
        }
        self.is_open = false;

        if let Some(mut transport) = self.transport.take() {
            if self.config.role == Role::Writer {
                self.finish_upload(transport.as_mut()).await;
            }
            transport.close().await;
        }

        if host.state() == ElementState::Paused {
            debug!(byte_pos = self.info.byte_pos, "paused, keeping resume offset");
        } else {
            self.info.byte_pos = 0;
            host.publish_info(&self.info);
        }
        debug!("stream closed");
    }

    async fn finish_upload(&mut self, transport: &mut dyn Transport) {
        if let HookOutcome::Failed(reason) =
            self.hooks
                .dispatch(HookKind::PostRequest, transport, HookBuffer::Empty)
        {
            warn!(%reason, "post-request hook failed, skipping upload completion");
            return;
        }

        match transport.fetch_headers(&mut IgnoreHeaders).await {
            Ok(_) => {
                let status = transport.status_code();
                if status.is_some_and(|code| (200..300).contains(&code)) {
                    debug!(?status, "upload acknowledged");
                } else {
                    warn!(?status, "upload answered with unexpected status");
                }
            }
            Err(e) => warn!(error = %e, "upload response not received"),
        }

        if let HookOutcome::Failed(reason) =
            self.hooks
                .dispatch(HookKind::FinishRequest, transport, HookBuffer::Empty)
        {
            warn!(%reason, "finish-request hook failed");
        }
    }

    /// Releases the element.
    ///
    /// The pipeline closes the element before destroying it; a session left
    /// open is released here anyway.
    pub fn destroy(self) {
        if self.is_open {
            warn!(tag = %self.config.tag, "destroying an open stream element");
        }
        drop(self);
    }
}
