//! # SSE Parser
//!
//! Incremental Server-Sent Events parser for the provider stream:
//! - Line buffering across arbitrary chunk boundaries
//! - `data: ` prefix extraction
//! - `[DONE]` marker filtering
//! - Flushing the trailing partial line when the connection closes

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

use crate::error::{Error, Result};

/// Parse SSE lines from a byte stream and yield the `data` payloads.
///
/// Transport errors are yielded once and end the stream. Content left in the
/// buffer when the transport ends is parsed as a final line, so a last event
/// without a terminating newline is still delivered.
pub fn data_lines<S, E>(byte_stream: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + Unpin + 'static,
    E: Into<Error> + Send + 'static,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let line = match std::str::from_utf8(&line_bytes) {
                        Ok(s) => s,
                        Err(_) => continue,
                    };

                    if let Some(data) = extract_sse_data(line) {
                        return Some((Ok(data), (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => {
                        buffer.extend_from_slice(&chunk);
                    }
                    Some(Err(e)) => {
                        return Some((Err(e.into()), (stream, buffer, true)));
                    }
                    None => {
                        if buffer.is_empty() {
                            return None;
                        }
                        let data = std::str::from_utf8(&buffer)
                            .ok()
                            .and_then(extract_sse_data);
                        buffer.clear();
                        return data.map(|data| (Ok(data), (stream, buffer, true)));
                    }
                }
            }
        },
    )
    .boxed()
}

/// Extract data payload from an SSE line.
///
/// Returns `Some(data)` for data lines, `None` for comments, other fields,
/// empty lines and `[DONE]` markers.
fn extract_sse_data(line: &str) -> Option<String> {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();

    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    Some(data.to_string())
}
