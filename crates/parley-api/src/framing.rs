//! Incremental decoding of a streamed turn response.
//!
//! The server negotiates one of two framing modes per response (via the
//! `x-stream-format` header): `data` carries newline-delimited
//! `<code>:<json>` frames describing structured events; anything else is
//! treated as plain text chunks. Both decoders buffer across transport
//! chunk boundaries, so frames and multi-byte UTF-8 sequences split by the
//! network reassemble correctly.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

use crate::error::ApiError;

/// Events decoded from a turn response stream.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    Text(String),
    Reasoning(String),
    ToolInvocation {
        tool_name: String,
        arguments: serde_json::Value,
    },
    Source {
        url: String,
        title: Option<String>,
    },
    Done {
        finish_reason: Option<String>,
    },
    Error(String),
}

/// Framing mode negotiated per response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamFormat {
    /// Newline-delimited `<code>:<json>` frames.
    Data,
    /// Raw text chunks.
    Text,
}

impl StreamFormat {
    /// Resolve the framing mode from the response header value.
    /// Unknown or absent values fall back to plain text.
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some("data") => StreamFormat::Data,
            _ => StreamFormat::Text,
        }
    }
}

/// Type alias for decoded turn streams.
pub type TurnStream = BoxStream<'static, Result<StreamChunk, ApiError>>;

#[derive(Debug, Deserialize)]
struct ToolInvocationFrame {
    #[serde(rename = "toolName")]
    tool_name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SourceFrame {
    url: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FinishFrame {
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

/// Parse a single `<code>:<json>` frame. Unknown codes and malformed
/// payloads are skipped so one bad frame cannot wedge the stream.
pub(crate) fn parse_data_frame(line: &str) -> Option<StreamChunk> {
    let (code, payload) = line.split_once(':')?;
    let chunk = match code {
        "0" => serde_json::from_str::<String>(payload)
            .ok()
            .map(StreamChunk::Text),
        "g" => serde_json::from_str::<String>(payload)
            .ok()
            .map(StreamChunk::Reasoning),
        "9" => serde_json::from_str::<ToolInvocationFrame>(payload)
            .ok()
            .map(|f| StreamChunk::ToolInvocation {
                tool_name: f.tool_name,
                arguments: f.arguments,
            }),
        "h" => serde_json::from_str::<SourceFrame>(payload)
            .ok()
            .map(|f| StreamChunk::Source {
                url: f.url,
                title: f.title,
            }),
        "3" => serde_json::from_str::<String>(payload)
            .ok()
            .map(StreamChunk::Error),
        "d" => serde_json::from_str::<FinishFrame>(payload)
            .ok()
            .map(|f| StreamChunk::Done {
                finish_reason: f.finish_reason,
            }),
        other => {
            debug!(code = other, "skipping unknown frame code");
            None
        }
    };
    if chunk.is_none() {
        debug!(frame = line, "skipping unparseable frame");
    }
    chunk
}

/// Decode a byte stream into turn chunks using the negotiated framing mode.
///
/// Always terminates with a `Done` chunk: either the server's finish frame
/// or a synthesized one when the transport closes without it, so consumers
/// settle on a single end-of-stream signal.
pub fn decode_stream<S, E>(format: StreamFormat, bytes: S) -> TurnStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + std::marker::Send,
{
    match format {
        StreamFormat::Data => decode_data_stream(bytes),
        StreamFormat::Text => decode_text_stream(bytes),
    }
}

fn decode_data_stream<S, E>(bytes: S) -> TurnStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + std::marker::Send,
{
    Box::pin(async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut buf: Vec<u8> = Vec::new();
        while let Some(item) = bytes.next().await {
            match item {
                Ok(chunk) => {
                    buf.extend_from_slice(&chunk);
                    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = buf.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&line[..line.len() - 1]);
                        let line = line.trim_end_matches('\r');
                        if line.is_empty() {
                            continue;
                        }
                        if let Some(chunk) = parse_data_frame(line) {
                            let is_done = matches!(chunk, StreamChunk::Done { .. });
                            yield Ok(chunk);
                            if is_done {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    yield Ok(StreamChunk::Error(e.to_string()));
                    return;
                }
            }
        }
        // Flush a trailing unterminated line before synthesizing the end.
        if !buf.is_empty() {
            let line = String::from_utf8_lossy(&buf).into_owned();
            let line = line.trim_end_matches('\r');
            if !line.is_empty()
                && let Some(chunk) = parse_data_frame(line)
            {
                let is_done = matches!(chunk, StreamChunk::Done { .. });
                yield Ok(chunk);
                if is_done {
                    return;
                }
            }
        }
        yield Ok(StreamChunk::Done { finish_reason: None });
    })
}

fn decode_text_stream<S, E>(bytes: S) -> TurnStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + std::marker::Send,
{
    Box::pin(async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut buf: Vec<u8> = Vec::new();
        while let Some(item) = bytes.next().await {
            match item {
                Ok(chunk) => {
                    buf.extend_from_slice(&chunk);
                    // Emit the longest valid UTF-8 prefix; keep the rest
                    // buffered until the continuation bytes arrive.
                    let valid = match std::str::from_utf8(&buf) {
                        Ok(_) => buf.len(),
                        Err(e) => e.valid_up_to(),
                    };
                    if valid > 0 {
                        let text = String::from_utf8_lossy(&buf[..valid]).into_owned();
                        buf.drain(..valid);
                        yield Ok(StreamChunk::Text(text));
                    }
                }
                Err(e) => {
                    yield Ok(StreamChunk::Error(e.to_string()));
                    return;
                }
            }
        }
        if !buf.is_empty() {
            yield Ok(StreamChunk::Text(String::from_utf8_lossy(&buf).into_owned()));
        }
        yield Ok(StreamChunk::Done { finish_reason: None });
    })
}
