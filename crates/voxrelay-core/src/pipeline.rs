//! Per-request synthesis pipeline
//!
//! A streaming session is three stages joined by bounded queues:
//!
//! ```text
//! provider SSE ──frames──▶ encoder stdin ── encoder stdout ──chunks──▶ response body
//! ```
//!
//! The upstream stage runs as its own task and awaits every encoder write, so
//! a slow client stalls the encoder, which stalls the upstream reads. One
//! cancellation token per session is shared by all stages and fires when the
//! response body is dropped, e.g. on client disconnect.

use std::fmt;
use std::time::Instant;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::audio::{AudioFormat, TranscodeInput, Transcoder};
use crate::error::{Error, Result};
use crate::provider::{FrameStream, GeminiClient};

/// Encoded audio bytes for the response body
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// Terminal state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Failed,
    Aborted,
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::Failed => "failed",
            SessionOutcome::Aborted => "aborted",
        })
    }
}

/// How the upstream stage ended
#[derive(Debug)]
enum UpstreamOutcome {
    Completed { frames: usize },
    EncoderClosed { frames: usize },
    Aborted,
    Failed(Error),
}

/// One in-flight streaming request.
///
/// Owns the upstream connection, the encoder process and the cancellation
/// token until the body stream is finished or dropped.
pub struct StreamSession {
    id: Uuid,
    format: AudioFormat,
    body: BodyStream,
}

impl StreamSession {
    /// Open the upstream stream, spawn the encoder and wire them together.
    ///
    /// Errors returned here happen before any response byte is produced and
    /// can still be reported with a status code.
    pub async fn start(
        provider: &GeminiClient,
        transcoder: &Transcoder,
        text: &str,
        voice: &str,
        format: AudioFormat,
    ) -> Result<Self> {
        let id = Uuid::new_v4();
        let span = info_span!("stream_session", session_id = %id, %format, voice = %voice);
        let cancel = CancellationToken::new();

        let frames = provider
            .open_stream(text, voice, cancel.clone())
            .instrument(span.clone())
            .await?;

        // the encoder can be stopped on its own when the upstream fails
        let encoder_cancel = cancel.child_token();
        let (input, output) = transcoder.start(format, encoder_cancel.clone())?;

        let upstream = tokio::spawn(
            forward_frames(frames, input, encoder_cancel).instrument(span.clone()),
        );

        let tracker = SessionTracker::new(id, cancel.drop_guard());
        let body = session_body(output, upstream, tracker);

        span.in_scope(|| info!("Streaming session started"));
        Ok(Self { id, format, body })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    /// The encoded body. Dropping it cancels the whole session.
    pub fn into_body(self) -> BodyStream {
        self.body
    }
}

/// Synthesize the full utterance, then transcode it in one pass.
pub async fn synthesize_buffered(
    provider: &GeminiClient,
    transcoder: &Transcoder,
    text: &str,
    voice: &str,
    format: AudioFormat,
) -> Result<Bytes> {
    let pcm = provider.synthesize(text, voice).await?;
    transcoder.transcode(pcm, format).await
}

/// Upstream stage: push frames into the encoder in arrival order.
async fn forward_frames(
    mut frames: FrameStream,
    mut input: TranscodeInput,
    encoder_cancel: CancellationToken,
) -> UpstreamOutcome {
    let outcome = loop {
        match frames.next().await {
            None => {
                break UpstreamOutcome::Completed {
                    frames: input.frames_written(),
                }
            }
            Some(Ok(frame)) => {
                if encoder_cancel.is_cancelled() {
                    break UpstreamOutcome::Aborted;
                }
                debug!("Frame of {} samples", frame.sample_count());
                if !input.write(frame).await {
                    break UpstreamOutcome::EncoderClosed {
                        frames: input.frames_written(),
                    };
                }
            }
            Some(Err(e)) if e.is_aborted() => break UpstreamOutcome::Aborted,
            Some(Err(e)) => break UpstreamOutcome::Failed(e),
        }
    };
    drop(frames);

    match &outcome {
        UpstreamOutcome::Failed(e) => {
            error!("Upstream stream failed after headers were sent: {}", e);
            encoder_cancel.cancel();
        }
        UpstreamOutcome::Completed { frames } => {
            debug!(
                "Upstream completed with {} frames ({} bytes)",
                frames,
                input.bytes_written()
            );
            input.end().await;
        }
        UpstreamOutcome::EncoderClosed { frames } => {
            debug!("Encoder closed its input after {} frames", frames);
            input.end().await;
        }
        UpstreamOutcome::Aborted => {
            debug!("Upstream aborted");
            input.end().await;
        }
    }
    outcome
}

/// Output stage: encoder chunks become body chunks, terminated exactly once.
fn session_body<S>(
    mut output: S,
    mut upstream: JoinHandle<UpstreamOutcome>,
    mut tracker: SessionTracker,
) -> BodyStream
where
    S: futures::Stream<Item = Result<Bytes>> + Send + Unpin + 'static,
{
    let stream = async_stream::stream! {
        loop {
            match output.next().await {
                Some(Ok(chunk)) => {
                    tracker.record(chunk.len());
                    yield Ok(chunk);
                }
                Some(Err(e)) if e.is_aborted() => {
                    // the encoder was stopped; find out whether upstream failed
                    match (&mut upstream).await {
                        Ok(UpstreamOutcome::Failed(e)) => {
                            tracker.finish(SessionOutcome::Failed, Some(&e));
                            yield Err(e);
                        }
                        _ => {
                            tracker.finish(SessionOutcome::Aborted, None);
                            yield Err(Error::Aborted);
                        }
                    }
                    return;
                }
                Some(Err(e)) => {
                    tracker.finish(SessionOutcome::Failed, Some(&e));
                    yield Err(e);
                    return;
                }
                None => {
                    if let Ok(UpstreamOutcome::Completed { frames }) = (&mut upstream).await {
                        tracker.frames_in = frames;
                    }
                    tracker.finish(SessionOutcome::Completed, None);
                    return;
                }
            }
        }
    };
    stream.boxed()
}

/// Logs the session outcome once and cancels the session when dropped.
struct SessionTracker {
    id: Uuid,
    started: Instant,
    frames_in: usize,
    chunks_out: usize,
    bytes_out: usize,
    finished: bool,
    _cancel_on_drop: DropGuard,
}

impl SessionTracker {
    fn new(id: Uuid, cancel_on_drop: DropGuard) -> Self {
        Self {
            id,
            started: Instant::now(),
            frames_in: 0,
            chunks_out: 0,
            bytes_out: 0,
            finished: false,
            _cancel_on_drop: cancel_on_drop,
        }
    }

    fn record(&mut self, len: usize) {
        self.chunks_out += 1;
        self.bytes_out += len;
    }

    fn finish(&mut self, outcome: SessionOutcome, cause: Option<&Error>) {
        if self.finished {
            return;
        }
        self.finished = true;

        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match cause {
            Some(e) => error!(
                session_id = %self.id,
                %outcome,
                bytes_out = self.bytes_out,
                elapsed_ms,
                "Streaming session ended: {}",
                e
            ),
            None => info!(
                session_id = %self.id,
                %outcome,
                frames_in = self.frames_in,
                chunks_out = self.chunks_out,
                bytes_out = self.bytes_out,
                elapsed_ms,
                "Streaming session ended"
            ),
        }
    }
}

impl Drop for SessionTracker {
    fn drop(&mut self) {
        self.finish(SessionOutcome::Aborted, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use base64::Engine;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse_body(frames: &[Vec<u8>]) -> String {
        frames
            .iter()
            .map(|pcm| {
                let data = base64::engine::general_purpose::STANDARD.encode(pcm);
                let payload = json!({
                    "candidates": [{"content": {"parts": [{"inlineData": {"data": data}}]}}]
                });
                format!("data: {}", payload)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    async fn provider_with_stream(frames: &[Vec<u8>]) -> (MockServer, GeminiClient) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/test-model:streamGenerateContent"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse_body(frames), "text/event-stream"),
            )
            .mount(&server)
            .await;
        let mut config = ProxyConfig::for_endpoint(server.uri());
        config.gemini_model = "test-model".to_string();
        let client = GeminiClient::new(&config);
        (server, client)
    }

    #[tokio::test]
    async fn test_passthrough_session_forwards_frames_in_order() {
        let frames = vec![vec![1u8, 0, 2, 0], vec![3u8, 0], vec![4u8, 0, 5, 0, 6, 0]];
        let (_server, provider) = provider_with_stream(&frames).await;
        let transcoder = Transcoder::new("ffmpeg-not-needed");

        let session = StreamSession::start(&provider, &transcoder, "Hi", "Kore", AudioFormat::Pcm)
            .await
            .unwrap();
        assert_eq!(session.content_type(), "audio/pcm");

        let items: Vec<Result<Bytes>> = session.into_body().collect().await;
        let body: Vec<u8> = items
            .into_iter()
            .map(|item| item.unwrap())
            .flat_map(|chunk| chunk.to_vec())
            .collect();
        assert_eq!(body, frames.concat());
    }

    #[tokio::test]
    async fn test_upstream_rejection_fails_before_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;
        let provider = GeminiClient::new(&ProxyConfig::for_endpoint(server.uri()));
        let transcoder = Transcoder::new("ffmpeg-not-needed");

        let err = StreamSession::start(&provider, &transcoder, "Hi", "Kore", AudioFormat::Mp3)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Upstream { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_encoder_launch_failure_fails_before_streaming() {
        let (_server, provider) = provider_with_stream(&[vec![0u8, 0]]).await;
        let transcoder = Transcoder::new("/nonexistent/voxrelay-ffmpeg");

        let err = StreamSession::start(&provider, &transcoder, "Hi", "Kore", AudioFormat::Mp3)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::ProcessStart(_)));
    }

    #[tokio::test]
    async fn test_encoder_failure_surfaces_once_in_body() {
        let (_server, provider) = provider_with_stream(&[vec![0u8; 64]]).await;
        let transcoder = Transcoder::new("false");

        let session = StreamSession::start(&provider, &transcoder, "Hi", "Kore", AudioFormat::Wav)
            .await
            .unwrap();
        let items: Vec<Result<Bytes>> = session.into_body().collect().await;
        let errors: Vec<&Error> = items.iter().filter_map(|i| i.as_ref().err()).collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], Error::Transcode(_)));
    }

    #[tokio::test]
    async fn test_mid_stream_upstream_error_force_closes_body() {
        let (tx, rx) = tokio::sync::mpsc::channel::<std::result::Result<Bytes, Error>>(4);
        let frames = crate::provider::frame_stream(
            tokio_stream::wrappers::ReceiverStream::new(rx),
            CancellationToken::new(),
        );
        let cancel = CancellationToken::new();
        let encoder_cancel = cancel.child_token();
        let (input, output) = Transcoder::new("unused")
            .start(AudioFormat::Pcm, encoder_cancel.clone())
            .unwrap();
        let upstream = tokio::spawn(forward_frames(frames, input, encoder_cancel));
        let tracker = SessionTracker::new(Uuid::new_v4(), cancel.clone().drop_guard());
        let mut body = session_body(output, upstream, tracker);

        let data = base64::engine::general_purpose::STANDARD.encode([7u8, 0]);
        let event = json!({"candidates": [{"content": {"parts": [{"inlineData": {"data": data}}]}}]});
        tx.send(Ok(Bytes::from(format!("data: {}\n", event)))).await.unwrap();
        assert_eq!(body.next().await.unwrap().unwrap().as_ref(), &[7u8, 0]);

        tx.send(Err(Error::Io(std::io::Error::other("connection reset"))))
            .await
            .unwrap();
        let err = body.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_body_cancels_session() {
        let (tx, rx) = tokio::sync::mpsc::channel::<std::result::Result<Bytes, Error>>(4);
        let cancel = CancellationToken::new();
        let frames = crate::provider::frame_stream(
            tokio_stream::wrappers::ReceiverStream::new(rx),
            cancel.clone(),
        );
        let encoder_cancel = cancel.child_token();
        let (input, output) = Transcoder::new("unused")
            .start(AudioFormat::Pcm, encoder_cancel.clone())
            .unwrap();
        let upstream = tokio::spawn(forward_frames(frames, input, encoder_cancel));
        let tracker = SessionTracker::new(Uuid::new_v4(), cancel.clone().drop_guard());
        let body = session_body(output, upstream, tracker);

        drop(body);
        assert!(cancel.is_cancelled());

        // frames arriving after the disconnect are never forwarded
        let _ = tx.send(Ok(Bytes::from_static(b"data: {}\n"))).await;
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !tx.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(SessionOutcome::Completed.to_string(), "completed");
        assert_eq!(SessionOutcome::Aborted.to_string(), "aborted");
    }
}
