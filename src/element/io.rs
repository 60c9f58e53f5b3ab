//! Data path of the stream element: read, write and the process step.

use tracing::{debug, warn};

use super::{Role, StreamElement, StreamError};
use crate::hook::{HookBuffer, HookKind, HookOutcome};
use crate::pipeline::ElementHost;

impl StreamElement {
    /// Reads the next chunk of the response body into `buf`.
    ///
    /// The `OnResponse` hook sees the buffer first and may fill it itself.
    /// `Ok(0)` means no data is available right now.
    ///
    /// # Errors
    ///
    /// - [`StreamError::UnsupportedRole`] on a writer
    /// - [`StreamError::NotOpen`] without a session
    /// - [`StreamError::HookAbort`] / [`StreamError::Transport`] on failure
    pub async fn read(
        &mut self,
        host: &mut dyn ElementHost,
        buf: &mut [u8],
    ) -> Result<usize, StreamError> {
        self.ensure_role(Role::Reader, "read")?;
        let transport = self.transport.as_deref_mut().ok_or(StreamError::NotOpen)?;

        let count = match self.hooks.dispatch(
            HookKind::OnResponse,
            transport,
            HookBuffer::Incoming(&mut *buf),
        ) {
            HookOutcome::Failed(reason) => {
                return Err(StreamError::hook_abort(HookKind::OnResponse, reason));
            }
            HookOutcome::Handled(count) => count.min(buf.len()),
            HookOutcome::Deferred => transport
                .read(buf)
                .await
                .map_err(|e| StreamError::transport(transport.uri(), e))?,
        };

        if count == 0 {
            warn!(byte_pos = self.info.byte_pos, "no more data");
            return Ok(0);
        }
        self.info.advance(count);
        host.publish_info(&self.info);
        debug!(count, byte_pos = self.info.byte_pos, total = ?self.info.total_bytes, "read");
        Ok(count)
    }

    /// Sends `buf` as the next chunk of the upload.
    ///
    /// The `OnRequest` hook sees the chunk first and may send it itself.
    ///
    /// # Errors
    ///
    /// - [`StreamError::UnsupportedRole`] on a reader
    /// - [`StreamError::NotOpen`] without a session
    /// - [`StreamError::HookAbort`] / [`StreamError::Transport`] on failure
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        self.ensure_role(Role::Writer, "write")?;
        let transport = self.transport.as_deref_mut().ok_or(StreamError::NotOpen)?;

        match self
            .hooks
            .dispatch(HookKind::OnRequest, transport, HookBuffer::Outgoing(buf))
        {
            HookOutcome::Failed(reason) => Err(StreamError::hook_abort(HookKind::OnRequest, reason)),
            HookOutcome::Handled(count) => Ok(count),
            HookOutcome::Deferred => {
                let written = transport
                    .write(buf)
                    .await
                    .map_err(|e| StreamError::transport(transport.uri(), e))?;
                debug!(written, "write");
                Ok(written)
            }
        }
    }

    /// Moves one chunk between the pipeline and the HTTP session.
    ///
    /// A reader reads into `buf` and forwards the bytes downstream; a writer
    /// pulls bytes from upstream into `buf` and uploads them. `Ok(0)` means
    /// nothing moved.
    ///
    /// # Errors
    ///
    /// Returns the error of the failing read/write, or
    /// [`StreamError::Host`] when the pipeline buffer fails.
    pub async fn process(
        &mut self,
        host: &mut dyn ElementHost,
        buf: &mut [u8],
    ) -> Result<usize, StreamError> {
        match self.config.role {
            Role::Reader => {
                let count = self.read(host, buf).await?;
                if count == 0 {
                    return Ok(0);
                }
                host.output(&buf[..count]).await.map_err(StreamError::host)
            }
            Role::Writer => {
                let count = host.input(buf).await.map_err(StreamError::host)?;
                if count == 0 {
                    return Ok(0);
                }
                self.write(&buf[..count]).await
            }
        }
    }
}
