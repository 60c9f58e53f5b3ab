//! Drives one stream element from the command line, standing in for the
//! pipeline: a file-backed host, a dedicated worker thread and the
//! pause/close/reopen cycle used to resume interrupted downloads.

use std::io::{self, IsTerminal};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::thread;

use async_trait::async_trait;
use http_stream::{
    CodecFormat, ElementHost, ElementState, HookContext, HookEvent, HookKind, HookOutcome,
    StreamConfig, StreamElement, StreamError, StreamHook, StreamInfo,
};
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use crate::cli::Command;
use crate::retry::{FailureType, RetryDecision, RetryPolicy, classify_http_status};

/// Size of the buffer moved by one `process` call.
const CHUNK_SIZE: usize = 16 * 1024;

/// Failures of one command-line transfer.
#[derive(Debug, Error)]
pub enum RunError {
    /// The element failed.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The server answered with a non-success status.
    #[error("server answered HTTP {status}")]
    HttpStatus {
        /// The response status.
        status: u16,
    },

    /// A resumed request was answered with the whole resource.
    #[error("server ignored the range request for offset {offset}")]
    RangeIgnored {
        /// The requested offset.
        offset: u64,
    },

    /// The body ended before the announced size was reached.
    #[error("stream ended at byte {received} of {expected}")]
    Truncated {
        /// Offset reached.
        received: u64,
        /// Announced total size.
        expected: u64,
    },

    /// An upload finished without a response head.
    #[error("upload finished without a response")]
    NoResponse,

    /// Local file or terminal I/O failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being done.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The element worker thread panicked.
    #[error("element worker panicked")]
    WorkerPanicked,
}

impl RunError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether reopening the stream could get further.
    pub fn failure_type(&self) -> FailureType {
        match self {
            Self::Stream(error) if error.is_transient() => FailureType::Transient,
            Self::HttpStatus { status } => classify_http_status(*status),
            Self::Truncated { .. } => FailureType::Transient,
            _ => FailureType::Permanent,
        }
    }
}

/// Outcome of a finished transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    /// Bytes moved by this run.
    pub transferred: u64,
    /// Final offset in the remote resource.
    pub byte_pos: u64,
    /// Total size, when the server announced it.
    pub total_bytes: Option<u64>,
    /// Codec announced by the response headers.
    pub codec: CodecFormat,
    /// Number of times the stream was reopened.
    pub reopens: u32,
}

/// Request-scoped values shared between the hook and the runner.
#[derive(Debug, Default)]
struct Exchange {
    status: AtomicU16,
    resume_from: AtomicU64,
}

impl Exchange {
    fn status(&self) -> Option<u16> {
        match self.status.load(Ordering::Relaxed) {
            0 => None,
            status => Some(status),
        }
    }

    /// Turns a hook abort caused by the response status into a typed error.
    fn explain(&self, error: StreamError) -> RunError {
        if matches!(error, StreamError::HookAbort { .. }) {
            match self.status() {
                Some(200) if self.resume_from.load(Ordering::Relaxed) > 0 => {
                    return RunError::RangeIgnored {
                        offset: self.resume_from.load(Ordering::Relaxed),
                    };
                }
                Some(status) if !(200..300).contains(&status) => {
                    return RunError::HttpStatus { status };
                }
                _ => {}
            }
        }
        RunError::Stream(error)
    }
}

/// Adds the user's headers and rejects unusable responses.
struct RequestHook {
    headers: Vec<(String, String)>,
}

impl StreamHook for RequestHook {
    fn on_event(&mut self, event: &mut HookEvent<'_>) -> HookOutcome {
        match event.kind {
            HookKind::PreRequest => {
                for (name, value) in &self.headers {
                    if let Err(e) = event.transport.set_header(name, value) {
                        return HookOutcome::fail(e.to_string());
                    }
                }
                HookOutcome::Deferred
            }
            HookKind::OnResponse | HookKind::FinishRequest => {
                let (Some(status), Some(exchange)) =
                    (event.transport.status_code(), event.context_as::<Exchange>())
                else {
                    return HookOutcome::Deferred;
                };
                exchange.status.store(status, Ordering::Relaxed);
                if status == 200 && exchange.resume_from.load(Ordering::Relaxed) > 0 {
                    return HookOutcome::fail("range request answered with the full resource");
                }
                if (200..300).contains(&status) {
                    HookOutcome::Deferred
                } else {
                    HookOutcome::fail(format!("HTTP status {status}"))
                }
            }
            HookKind::OnRequest | HookKind::PostRequest => HookOutcome::Deferred,
        }
    }
}

/// Pipeline stand-in backed by local files.
struct FileHost {
    uri: String,
    state: ElementState,
    source: Option<Box<dyn AsyncRead + Send + Unpin>>,
    sink: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    progress: ProgressBar,
    codec: CodecFormat,
    transferred: u64,
}

impl FileHost {
    fn new(uri: &str, progress: ProgressBar) -> Self {
        Self {
            uri: uri.to_string(),
            state: ElementState::Init,
            source: None,
            sink: None,
            progress,
            codec: CodecFormat::None,
            transferred: 0,
        }
    }
}

#[async_trait]
impl ElementHost for FileHost {
    fn uri(&self) -> Option<&str> {
        Some(&self.uri)
    }

    fn state(&self) -> ElementState {
        self.state
    }

    fn publish_info(&mut self, info: &StreamInfo) {
        if let Some(total) = info.total_bytes {
            self.progress.set_length(total);
        }
        self.progress.set_position(info.byte_pos);
    }

    fn report_codec(&mut self, codec: CodecFormat) {
        info!(%codec, uri = %self.uri, "stream codec");
        self.codec = codec;
    }

    async fn input(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(source) = self.source.as_mut() else {
            return Ok(0);
        };
        let count = source.read(buf).await?;
        self.transferred += count as u64;
        self.progress.inc(count as u64);
        Ok(count)
    }

    async fn output(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "no output"));
        };
        sink.write_all(buf).await?;
        self.transferred += buf.len() as u64;
        Ok(buf.len())
    }
}

/// Runs `command` on a dedicated worker thread with its own runtime.
///
/// The thread is named after the configured tag and sized by the
/// configured stack size.
///
/// # Errors
///
/// Returns [`RunError`] when the worker cannot start or the transfer fails.
pub fn run_on_worker(
    config: StreamConfig,
    headers: Vec<(String, String)>,
    command: Command,
    show_progress: bool,
) -> Result<TransferReport, RunError> {
    let worker = thread::Builder::new()
        .name(config.tag.clone())
        .stack_size(config.task_stack_size)
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| RunError::io("failed to start runtime", e))?;
            runtime.block_on(run(config, headers, command, show_progress))
        })
        .map_err(|e| RunError::io("failed to spawn element worker", e))?;
    worker.join().map_err(|_| RunError::WorkerPanicked)?
}

async fn run(
    config: StreamConfig,
    headers: Vec<(String, String)>,
    command: Command,
    show_progress: bool,
) -> Result<TransferReport, RunError> {
    let exchange = Arc::new(Exchange::default());
    let element = StreamElement::http(config)?
        .with_hook(RequestHook { headers })
        .with_context(Arc::clone(&exchange) as HookContext);
    let progress = progress_bar(show_progress);

    let report = match command {
        Command::Get {
            url,
            output,
            resume,
            offset,
            retries,
        } => {
            let start = match (&output, resume) {
                (Some(path), true) => existing_len(path).await?,
                _ => offset.unwrap_or(0),
            };
            let sink = open_sink(output.as_deref(), resume).await?;
            let mut host = FileHost::new(&url, progress.clone());
            host.sink = Some(sink);
            let policy = RetryPolicy::with_retries(retries);
            download(element, &mut host, &exchange, start, &policy).await
        }
        Command::Put { url, file } => {
            let mut host = FileHost::new(&url, progress.clone());
            let source = File::open(&file)
                .await
                .map_err(|e| RunError::io(format!("failed to open {}", file.display()), e))?;
            if let Ok(metadata) = source.metadata().await {
                progress.set_length(metadata.len());
            }
            host.source = Some(Box::new(source));
            upload(element, &mut host, &exchange).await
        }
    };
    progress.finish_and_clear();
    report
}

#[instrument(skip_all, fields(uri = %host.uri, start = start))]
async fn download(
    mut element: StreamElement,
    host: &mut FileHost,
    exchange: &Exchange,
    start: u64,
    policy: &RetryPolicy,
) -> Result<TransferReport, RunError> {
    element.seek_to(start)?;
    debug!(max_attempts = policy.max_attempts(), "starting download");
    let mut buf = vec![0_u8; CHUNK_SIZE];
    let mut attempt = 1;
    let mut reopens = 0;

    loop {
        host.state = ElementState::Running;
        let Err(error) = pump_reader(&mut element, host, exchange, &mut buf).await else {
            break;
        };
        match policy.should_retry(error.failure_type(), attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next,
            } => {
                warn!(
                    error = %error,
                    byte_pos = element.info().byte_pos,
                    delay_ms = delay.as_millis(),
                    "transfer interrupted, resuming"
                );
                host.state = ElementState::Paused;
                element.close(host).await;
                tokio::time::sleep(delay).await;
                attempt = next;
                reopens += 1;
            }
            RetryDecision::DoNotRetry { reason } => {
                debug!(%reason, "giving up");
                host.state = ElementState::Error;
                element.close(host).await;
                element.destroy();
                return Err(error);
            }
        }
    }

    let info = *element.info();
    if let Some(sink) = host.sink.as_mut() {
        sink.flush()
            .await
            .map_err(|e| RunError::io("failed to flush output", e))?;
    }
    host.state = ElementState::Finished;
    element.close(host).await;
    element.destroy();

    Ok(TransferReport {
        transferred: host.transferred,
        byte_pos: info.byte_pos,
        total_bytes: info.total_bytes,
        codec: host.codec,
        reopens,
    })
}

async fn pump_reader(
    element: &mut StreamElement,
    host: &mut FileHost,
    exchange: &Exchange,
    buf: &mut [u8],
) -> Result<(), RunError> {
    if !element.is_open() {
        exchange
            .resume_from
            .store(element.info().byte_pos, Ordering::Relaxed);
        element.open(host).await?;
    }
    loop {
        let count = element
            .process(host, buf)
            .await
            .map_err(|e| exchange.explain(e))?;
        if count == 0 {
            break;
        }
    }
    let info = element.info();
    match info.total_bytes {
        Some(expected) if info.byte_pos < expected => Err(RunError::Truncated {
            received: info.byte_pos,
            expected,
        }),
        _ => Ok(()),
    }
}

#[instrument(skip_all, fields(uri = %host.uri))]
async fn upload(
    mut element: StreamElement,
    host: &mut FileHost,
    exchange: &Exchange,
) -> Result<TransferReport, RunError> {
    host.state = ElementState::Running;
    element.open(host).await?;

    let mut buf = vec![0_u8; CHUNK_SIZE];
    let sent = loop {
        match element.process(host, &mut buf).await {
            Ok(0) => break Ok(()),
            Ok(count) => debug!(count, "chunk uploaded"),
            Err(e) => break Err(e),
        }
    };
    host.state = if sent.is_ok() {
        ElementState::Finished
    } else {
        ElementState::Error
    };
    element.close(host).await;
    element.destroy();
    sent?;

    match exchange.status() {
        None => Err(RunError::NoResponse),
        Some(status) if !(200..300).contains(&status) => Err(RunError::HttpStatus { status }),
        Some(_) => Ok(TransferReport {
            transferred: host.transferred,
            byte_pos: host.transferred,
            total_bytes: Some(host.transferred),
            codec: CodecFormat::None,
            reopens: 0,
        }),
    }
}

async fn existing_len(path: &Path) -> Result<u64, RunError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(RunError::io(format!("failed to inspect {}", path.display()), e)),
    }
}

async fn open_sink(
    path: Option<&Path>,
    append: bool,
) -> Result<Box<dyn AsyncWrite + Send + Unpin>, RunError> {
    let Some(path) = path else {
        return Ok(Box::new(tokio::io::stdout()));
    };
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .await
        .map_err(|e| RunError::io(format!("failed to open {}", path.display()), e))?;
    Ok(Box::new(file))
}

fn progress_bar(enabled: bool) -> ProgressBar {
    if !enabled || !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{bytes}/{total_bytes} {bar:40} {bytes_per_sec} {eta}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

/// Output path the CLI reports, for log lines.
pub fn describe_output(command: &Command) -> String {
    match command {
        Command::Get { output, .. } => output
            .as_ref()
            .map_or_else(|| "stdout".to_string(), |path| path.display().to_string()),
        Command::Put { file, .. } => file.display().to_string(),
    }
}
