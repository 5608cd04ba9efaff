//! Encoder subprocess wrapper
//!
//! Runs `ffmpeg` reading s16le mono 24 kHz PCM from stdin and writing the
//! requested container to stdout. Streaming sessions are split into an input
//! half (`TranscodeInput`) fed by the upstream stage and an output half
//! (`TranscodeOutput`) drained by the response body. The two halves are
//! joined through the OS pipes and a bounded channel, so a slow reader
//! eventually blocks the writer.

use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::format::{AudioFormat, TranscodeParams, CHANNELS, SAMPLE_RATE};
use super::frame::AudioFrame;
use crate::config::ProxyConfig;
use crate::error::{Error, Result};

const READ_CHUNK_SIZE: usize = 8192;
const OUTPUT_CHANNEL_CAPACITY: usize = 16;

enum TranscodeEvent {
    Chunk(Bytes),
    Finished,
    Failed(Error),
}

/// Launches encoder processes for buffered and streaming transcodes.
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: String,
}

impl Transcoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.ffmpeg_path.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, params: TranscodeParams) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "s16le"])
            .args(["-ar", &SAMPLE_RATE.to_string()])
            .args(["-ac", &CHANNELS.to_string()])
            .args(["-i", "pipe:0"]);
        if let Some(kbps) = params.bitrate_kbps {
            cmd.arg("-b:a").arg(format!("{}k", kbps));
        }
        cmd.args(["-f", params.container, "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn(&self, params: TranscodeParams) -> Result<Child> {
        self.command(params)
            .spawn()
            .map_err(|e| Error::ProcessStart(format!("{}: {}", self.program, e)))
    }

    /// Transcode one complete PCM buffer.
    pub async fn transcode(&self, pcm: Bytes, format: AudioFormat) -> Result<Bytes> {
        let Some(params) = format.transcode_params() else {
            return Ok(pcm);
        };

        let input_len = pcm.len();
        let mut child = self.spawn(params)?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::ProcessStart("encoder stdin unavailable".to_string()))?;

        let write = async move {
            let result = stdin.write_all(&pcm).await;
            drop(stdin);
            result
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Transcode(format!(
                "encoder exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        written?;

        debug!(
            "Transcoded {} PCM bytes to {} ({} bytes)",
            input_len,
            format,
            output.stdout.len()
        );
        Ok(Bytes::from(output.stdout))
    }

    /// Start a streaming transcode.
    ///
    /// Cancelling `cancel` kills the encoder and ends the output without a
    /// terminal error. The pass-through format never spawns a process.
    pub fn start(
        &self,
        format: AudioFormat,
        cancel: CancellationToken,
    ) -> Result<(TranscodeInput, TranscodeOutput)> {
        let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);

        let Some(params) = format.transcode_params() else {
            let input = TranscodeInput::new(InputSink::Passthrough(Some(tx)));
            return Ok((input, TranscodeOutput::new(rx, None)));
        };

        let mut child = self.spawn(params)?;
        let (stdin, stdout, stderr) = match (
            child.stdin.take(),
            child.stdout.take(),
            child.stderr.take(),
        ) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => return Err(Error::ProcessStart("encoder pipes unavailable".to_string())),
        };

        debug!(pid = ?child.id(), %format, "Encoder started");
        let task = tokio::spawn(pump(child, stdout, stderr, tx, cancel));

        let input = TranscodeInput::new(InputSink::Encoder(Some(stdin)));
        Ok((input, TranscodeOutput::new(rx, Some(task))))
    }
}

enum InputSink {
    Encoder(Option<ChildStdin>),
    Passthrough(Option<mpsc::Sender<TranscodeEvent>>),
}

/// Write half of a streaming transcode.
pub struct TranscodeInput {
    sink: InputSink,
    frames_written: usize,
    bytes_written: usize,
}

impl TranscodeInput {
    fn new(sink: InputSink) -> Self {
        Self {
            sink,
            frames_written: 0,
            bytes_written: 0,
        }
    }

    /// Feed one frame to the encoder, waiting while its input pipe is full.
    ///
    /// Returns `false` when the input is closed, either by `end` or because
    /// the encoder went away; such writes are dropped without error.
    pub async fn write(&mut self, frame: AudioFrame) -> bool {
        let len = frame.len();
        let accepted = match &mut self.sink {
            InputSink::Encoder(slot) => {
                let Some(stdin) = slot.as_mut() else {
                    return false;
                };
                let result = stdin.write_all(frame.data()).await;
                if let Err(e) = result {
                    debug!("Encoder input closed: {}", e);
                    *slot = None;
                    false
                } else {
                    true
                }
            }
            InputSink::Passthrough(slot) => {
                let Some(tx) = slot.as_ref() else {
                    return false;
                };
                let result = tx.send(TranscodeEvent::Chunk(frame.into_bytes())).await;
                if result.is_err() {
                    *slot = None;
                    false
                } else {
                    true
                }
            }
        };

        if accepted {
            self.frames_written += 1;
            self.bytes_written += len;
        }
        accepted
    }

    /// Close the input, letting the encoder flush and exit. Idempotent.
    pub async fn end(&mut self) {
        match &mut self.sink {
            InputSink::Encoder(slot) => {
                if let Some(mut stdin) = slot.take() {
                    if let Err(e) = stdin.shutdown().await {
                        debug!("Encoder input shutdown: {}", e);
                    }
                }
            }
            InputSink::Passthrough(slot) => {
                if let Some(tx) = slot.take() {
                    let _ = tx.send(TranscodeEvent::Finished).await;
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        match &self.sink {
            InputSink::Encoder(slot) => slot.is_none(),
            InputSink::Passthrough(slot) => slot.is_none(),
        }
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }
}

/// Read half of a streaming transcode.
///
/// Yields encoded chunks in encoder order, then ends. A non-zero encoder exit
/// is reported as exactly one `Err` item; a stream that stops without either
/// outcome (cancellation) yields `Error::Aborted`.
pub struct TranscodeOutput {
    rx: mpsc::Receiver<TranscodeEvent>,
    task: Option<JoinHandle<()>>,
    done: bool,
}

impl TranscodeOutput {
    fn new(rx: mpsc::Receiver<TranscodeEvent>, task: Option<JoinHandle<()>>) -> Self {
        Self {
            rx,
            task,
            done: false,
        }
    }
}

impl Stream for TranscodeOutput {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(TranscodeEvent::Chunk(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(TranscodeEvent::Finished)) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(TranscodeEvent::Failed(e))) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(Some(Err(Error::Aborted)))
            }
        }
    }
}

impl Drop for TranscodeOutput {
    fn drop(&mut self) {
        // dropping the pump drops the child, which kills it
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Move encoder stdout into the output channel until EOF, then report the
/// exit status exactly once.
async fn pump(
    mut child: Child,
    mut stdout: ChildStdout,
    stderr: ChildStderr,
    tx: mpsc::Sender<TranscodeEvent>,
    cancel: CancellationToken,
) {
    let diagnostics = tokio::spawn(read_diagnostics(stderr));
    let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
    let mut total = 0usize;

    loop {
        buf.reserve(READ_CHUNK_SIZE);
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                terminate(&mut child).await;
                return;
            }
            read = stdout.read_buf(&mut buf) => read,
        };

        match read {
            Ok(0) => break,
            Ok(n) => {
                total += n;
                let chunk = buf.split().freeze();
                let delivered = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => false,
                    sent = tx.send(TranscodeEvent::Chunk(chunk)) => sent.is_ok(),
                };
                if !delivered {
                    debug!("Encoder output abandoned after {} bytes", total);
                    terminate(&mut child).await;
                    return;
                }
            }
            Err(e) => {
                warn!("Encoder stdout read failed: {}", e);
                terminate(&mut child).await;
                let _ = tx.send(TranscodeEvent::Failed(Error::Io(e))).await;
                return;
            }
        }
    }

    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            terminate(&mut child).await;
            return;
        }
        status = child.wait() => status,
    };
    let stderr = diagnostics.await.unwrap_or_default();

    let event = match status {
        Ok(status) if status.success() => {
            debug!("Encoder finished, {} bytes emitted", total);
            TranscodeEvent::Finished
        }
        Ok(status) => TranscodeEvent::Failed(Error::Transcode(format!(
            "encoder exited with {}: {}",
            status,
            stderr.trim()
        ))),
        Err(e) => TranscodeEvent::Failed(Error::Io(e)),
    };
    let _ = tx.send(event).await;
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("Encoder already exited: {}", e);
    }
    let _ = child.wait().await;
}

async fn read_diagnostics<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}
