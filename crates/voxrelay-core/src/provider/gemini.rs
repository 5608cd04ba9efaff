//! Gemini speech synthesis client
//!
//! Issues `generateContent` (buffered) or `streamGenerateContent?alt=sse`
//! (streaming) requests and turns the replies into raw PCM frames.

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sse;
use super::types::{GenerateContentRequest, GenerateContentResponse};
use crate::audio::AudioFrame;
use crate::config::ProxyConfig;
use crate::error::{Error, Result};

/// Ordered stream of decoded PCM frames from one synthesis request
pub type FrameStream = BoxStream<'static, Result<AudioFrame>>;

/// HTTP client for the Gemini TTS endpoints
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, action)
    }

    /// Synthesize `text` in one request and return the complete PCM buffer.
    pub async fn synthesize(&self, text: &str, voice: &str) -> Result<Bytes> {
        info!("Gemini synthesis: {} chars, voice: {}", text.chars().count(), voice);

        let response = self
            .client
            .post(self.endpoint("generateContent"))
            .query(&[("key", self.api_key.as_str())])
            .json(&GenerateContentRequest::speech(text, voice))
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: GenerateContentResponse = response.json().await?;
        let frames = body.audio_frames()?;
        if frames.is_empty() {
            return Err(Error::InvalidAudio(
                "provider response contained no audio".to_string(),
            ));
        }

        let mut pcm = BytesMut::with_capacity(frames.iter().map(AudioFrame::len).sum());
        for frame in &frames {
            pcm.extend_from_slice(frame.data());
        }
        debug!("Received {} PCM bytes in {} parts", pcm.len(), frames.len());
        Ok(pcm.freeze())
    }

    /// Open a streaming synthesis request.
    ///
    /// Resolves once the provider has answered with a success status; a
    /// non-success status fails here with `Error::Upstream` before any frame
    /// is produced. `cancel` aborts both the pending request and the
    /// returned stream, which then ends with `Error::Aborted`.
    pub async fn open_stream(
        &self,
        text: &str,
        voice: &str,
        cancel: CancellationToken,
    ) -> Result<FrameStream> {
        info!(
            "Gemini streaming synthesis: {} chars, voice: {}",
            text.chars().count(),
            voice
        );

        let request = self
            .client
            .post(self.endpoint("streamGenerateContent"))
            .query(&[("alt", "sse"), ("key", self.api_key.as_str())])
            .json(&GenerateContentRequest::speech(text, voice));

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Aborted),
            response = request.send() => response?,
        };
        let response = check_status(response).await?;

        Ok(frame_stream(response.bytes_stream(), cancel))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("Gemini returned {}: {}", status, body);
    Err(Error::Upstream {
        status: status.as_u16(),
        body,
    })
}

/// Turn an SSE byte stream into decoded frames.
///
/// Unparseable events are logged and skipped. Once `cancel` fires no further
/// frame is delivered and the stream ends with `Error::Aborted`; dropping the
/// stream drops the underlying connection.
pub fn frame_stream<S, E>(byte_stream: S, cancel: CancellationToken) -> FrameStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + Unpin + 'static,
    E: Into<Error> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut lines = sse::data_lines(byte_stream);
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = lines.next() => Some(next),
            };
            let Some(next) = next else {
                yield Err(Error::Aborted);
                return;
            };

            let line = match next {
                None => break,
                Some(Ok(line)) => line,
                Some(Err(_)) if cancel.is_cancelled() => {
                    yield Err(Error::Aborted);
                    return;
                }
                Some(Err(e)) => {
                    yield Err(e);
                    return;
                }
            };

            for frame in parse_event(&line) {
                if cancel.is_cancelled() {
                    yield Err(Error::Aborted);
                    return;
                }
                yield Ok(frame);
            }
        }
    };
    stream.boxed()
}

fn parse_event(data: &str) -> Vec<AudioFrame> {
    let response: GenerateContentResponse = match serde_json::from_str(data) {
        Ok(response) => response,
        Err(e) => {
            warn!(
                error = %e,
                data_preview = %preview(data, 100),
                "Skipping unparseable SSE event"
            );
            return Vec::new();
        }
    };

    if let Some(error) = &response.error {
        warn!("Gemini reported an in-stream error: {}", error);
    }

    match response.audio_frames() {
        Ok(frames) => frames,
        Err(e) => {
            warn!("Skipping SSE event with undecodable audio: {}", e);
            Vec::new()
        }
    }
}

fn preview(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use serde_json::json;
    use tokio_stream::wrappers::ReceiverStream;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event(pcm: &[u8]) -> String {
        let data = base64::engine::general_purpose::STANDARD.encode(pcm);
        let payload = json!({
            "candidates": [{"content": {"parts": [{"inlineData": {
                "mimeType": "audio/L16;codec=pcm;rate=24000",
                "data": data
            }}]}}]
        });
        format!("data: {}", payload)
    }

    fn client_for(server: &MockServer) -> GeminiClient {
        let mut config = ProxyConfig::for_endpoint(server.uri());
        config.gemini_model = "test-model".to_string();
        GeminiClient::new(&config)
    }

    async fn collect_frames(stream: FrameStream) -> Vec<Result<AudioFrame>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_stream_delivers_frames_including_trailing_line() {
        let server = MockServer::start().await;
        // the last event has no trailing newline
        let body = format!(
            "{}\r\n\r\n{}\n\ndata: not-json\n\n{}",
            event(&[1, 0, 2, 0]),
            event(&[3, 0]),
            event(&[4, 0, 5, 0])
        );
        Mock::given(method("POST"))
            .and(path("/models/test-model:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": {"responseModalities": ["AUDIO"]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let stream = client
            .open_stream("Hello", "Kore", CancellationToken::new())
            .await
            .unwrap();
        let frames: Vec<AudioFrame> = collect_frames(stream)
            .await
            .into_iter()
            .map(|f| f.unwrap())
            .collect();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].data().as_ref(), &[1u8, 0, 2, 0]);
        assert_eq!(frames[1].data().as_ref(), &[3u8, 0]);
        assert_eq!(frames[2].data().as_ref(), &[4u8, 0, 5, 0]);
    }

    #[tokio::test]
    async fn test_stream_non_success_status_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/test-model:streamGenerateContent"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key invalid"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .open_stream("Hello", "Kore", CancellationToken::new())
            .await
            .err()
            .unwrap();
        match err {
            Error::Upstream { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "API key invalid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_stream_already_cancelled() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client.open_stream("Hello", "Kore", cancel).await.err().unwrap();
        assert!(err.is_aborted());
    }

    #[tokio::test]
    async fn test_synthesize_concatenates_parts() {
        let server = MockServer::start().await;
        let b64 = |pcm: &[u8]| base64::engine::general_purpose::STANDARD.encode(pcm);
        Mock::given(method("POST"))
            .and(path("/models/test-model:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [
                    {"inlineData": {"data": b64(&[1, 2])}},
                    {"inlineData": {"data": b64(&[3, 4])}}
                ]}}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pcm = client.synthesize("Hello", "Kore").await.unwrap();
        assert_eq!(pcm.as_ref(), &[1u8, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_synthesize_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/test-model:generateContent"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.synthesize("Hello", "Kore").await.unwrap_err();
        assert!(matches!(err, Error::Upstream { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_discards_frames() {
        let (tx, rx) = tokio::sync::mpsc::channel::<std::result::Result<Bytes, Error>>(4);
        let cancel = CancellationToken::new();
        let mut stream = frame_stream(ReceiverStream::new(rx), cancel.clone());

        tx.send(Ok(Bytes::from(format!("{}\n", event(&[1, 0])))))
            .await
            .unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.sample_count(), 1);

        cancel.cancel();
        tx.send(Ok(Bytes::from(format!("{}\n", event(&[2, 0])))))
            .await
            .unwrap();

        let next = stream.next().await.unwrap();
        assert!(next.unwrap_err().is_aborted());
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("héllo", 2), "hé");
        assert_eq!(preview("hi", 10), "hi");
    }
}
