//! Decoder for the `application/vnd.amazon.eventstream` response framing.
//!
//! Each message on the wire is:
//!
//! ```text
//! total_len:u32 | headers_len:u32 | prelude_crc:u32 | headers | payload | message_crc:u32
//! ```
//!
//! Successful model output arrives as `chunk` events whose payload is
//! `{"bytes": "<base64 frame json>"}`.  CRCs are not checked.

use std::pin::Pin;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::{Buf, Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};
use crate::llm::frame::StreamFrame;

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;
const MIN_MESSAGE_LEN: usize = PRELUDE_LEN + CRC_LEN;
const MAX_MESSAGE_LEN: usize = 24 * 1024 * 1024;

/// Ordered stream of decoded frames; an `Err` item ends the stream.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<StreamFrame>> + Send>>;

/// Incremental splitter turning arbitrary byte chunks into whole messages.
#[derive(Default)]
pub struct EventStreamDecoder {
    buf: BytesMut,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes received but not yet consumed by a complete message.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete raw message, if one is buffered.
    ///
    /// A prelude with impossible lengths is fatal: the byte stream can no
    /// longer be framed.
    pub fn next_message(&mut self) -> Result<Option<Bytes>> {
        if self.buf.len() < PRELUDE_LEN {
            return Ok(None);
        }
        let total = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        let headers_len = u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]) as usize;

        if !(MIN_MESSAGE_LEN..=MAX_MESSAGE_LEN).contains(&total) || headers_len > total - MIN_MESSAGE_LEN {
            return Err(GatewayError::Stream(format!(
                "corrupt event-stream prelude (total {total}, headers {headers_len})"
            )));
        }
        if self.buf.len() < total {
            return Ok(None);
        }
        Ok(Some(self.buf.split_to(total).freeze()))
    }
}

/// A framed message with its string-valued headers.
#[derive(Debug, Clone)]
pub struct EventMessage {
    headers: Vec<(String, String)>,
    pub payload: Bytes,
}

impl EventMessage {
    /// Parse a raw message produced by [`EventStreamDecoder::next_message`].
    /// Returns `None` when the header block is malformed.
    pub fn parse(raw: &Bytes) -> Option<Self> {
        let headers_len = u32::from_be_bytes(raw.get(4..8)?.try_into().ok()?) as usize;
        let headers_end = PRELUDE_LEN + headers_len;
        let payload_end = raw.len().checked_sub(CRC_LEN)?;
        if headers_end > payload_end {
            return None;
        }
        let headers = parse_headers(raw.get(PRELUDE_LEN..headers_end)?)?;
        Some(Self {
            headers,
            payload: raw.slice(headers_end..payload_end),
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Read the header block, keeping string-typed values only.
fn parse_headers(mut block: &[u8]) -> Option<Vec<(String, String)>> {
    let mut headers = Vec::new();
    while block.has_remaining() {
        let name_len = block.get_u8() as usize;
        if block.remaining() < name_len + 1 {
            return None;
        }
        let name = String::from_utf8(block[..name_len].to_vec()).ok()?;
        block.advance(name_len);

        let value_type = block.get_u8();
        let value_len = match value_type {
            0 | 1 => 0,
            2 => 1,
            3 => 2,
            4 => 4,
            5 | 8 => 8,
            9 => 16,
            6 | 7 => {
                if block.remaining() < 2 {
                    return None;
                }
                let len = block.get_u16() as usize;
                if block.remaining() < len {
                    return None;
                }
                if value_type == 7 {
                    headers.push((name, String::from_utf8(block[..len].to_vec()).ok()?));
                }
                block.advance(len);
                continue;
            }
            _ => return None,
        };
        if block.remaining() < value_len {
            return None;
        }
        block.advance(value_len);
    }
    Some(headers)
}

#[derive(Deserialize)]
struct ChunkPayload {
    bytes: String,
}

#[derive(Deserialize)]
struct ExceptionPayload {
    #[serde(default, alias = "Message")]
    message: Option<String>,
}

/// Map a framed message to a model frame.
///
/// Exceptions and errors become `Err`; anything that is not a decodable
/// chunk becomes [`StreamFrame::Unknown`].
pub fn classify(message: &EventMessage) -> Result<StreamFrame> {
    match message.header(":message-type") {
        Some("exception") => {
            let kind = message.header(":exception-type").unwrap_or("exception");
            let detail = serde_json::from_slice::<ExceptionPayload>(&message.payload)
                .ok()
                .and_then(|p| p.message)
                .unwrap_or_else(|| String::from_utf8_lossy(&message.payload).into_owned());
            Err(GatewayError::Stream(format!("{kind}: {detail}")))
        }
        Some("error") => {
            let code = message.header(":error-code").unwrap_or("error");
            let detail = message.header(":error-message").unwrap_or_default();
            Err(GatewayError::Stream(format!("{code}: {detail}")))
        }
        Some("event") if message.header(":event-type") == Some("chunk") => {
            let frame = serde_json::from_slice::<ChunkPayload>(&message.payload)
                .ok()
                .and_then(|p| BASE64.decode(p.bytes.as_bytes()).ok())
                .map(|bytes| StreamFrame::decode(&bytes))
                .unwrap_or(StreamFrame::Unknown);
            Ok(frame)
        }
        other => {
            debug!(message_type = ?other, event_type = ?message.header(":event-type"), "skipping event-stream message");
            Ok(StreamFrame::Unknown)
        }
    }
}

/// Turn a raw HTTP body into decoded frames, in arrival order.
///
/// Transport errors, exception messages and a body that ends mid-message are
/// yielded once as `Err`, after which the stream ends.
pub fn frame_stream<S, E>(body: S) -> FrameStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = (Box::pin(body), EventStreamDecoder::new(), false);

    let frames = stream::unfold(state, |(mut body, mut decoder, finished)| async move {
        if finished {
            return None;
        }
        loop {
            match decoder.next_message() {
                Ok(Some(raw)) => {
                    let item = match EventMessage::parse(&raw) {
                        Some(message) => classify(&message),
                        None => {
                            debug!(len = raw.len(), "malformed event-stream headers, skipping");
                            Ok(StreamFrame::Unknown)
                        }
                    };
                    let done = item.is_err();
                    return Some((item, (body, decoder, done)));
                }
                Ok(None) => {}
                Err(e) => return Some((Err(e), (body, decoder, true))),
            }

            match body.next().await {
                Some(Ok(chunk)) => decoder.push(&chunk),
                Some(Err(e)) => {
                    let err = GatewayError::Stream(format!("response body error: {e}"));
                    return Some((Err(err), (body, decoder, true)));
                }
                None => {
                    let pending = decoder.pending();
                    if pending == 0 {
                        return None;
                    }
                    warn!(pending, "event stream ended mid-message");
                    let err = GatewayError::Stream(format!(
                        "event stream ended mid-message ({pending} bytes pending)"
                    ));
                    return Some((Err(err), (body, decoder, true)));
                }
            }
        }
    });

    frames.boxed()
}

/// Encode one message (with zeroed CRCs) for tests.
#[cfg(test)]
pub(crate) fn encode_message(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
    use bytes::BufMut;

    let mut header_block = Vec::new();
    for (name, value) in headers {
        header_block.put_u8(name.len() as u8);
        header_block.put_slice(name.as_bytes());
        header_block.put_u8(7);
        header_block.put_u16(value.len() as u16);
        header_block.put_slice(value.as_bytes());
    }
    let total = MIN_MESSAGE_LEN + header_block.len() + payload.len();
    let mut out = Vec::with_capacity(total);
    out.put_u32(total as u32);
    out.put_u32(header_block.len() as u32);
    out.put_u32(0);
    out.put_slice(&header_block);
    out.put_slice(payload);
    out.put_u32(0);
    out
}

/// Encode a `chunk` event carrying `frame_json`, for tests.
#[cfg(test)]
pub(crate) fn encode_chunk(frame_json: &str) -> Vec<u8> {
    let payload = serde_json::json!({ "bytes": BASE64.encode(frame_json) }).to_string();
    encode_message(
        &[
            (":event-type", "chunk"),
            (":content-type", "application/json"),
            (":message-type", "event"),
        ],
        payload.as_bytes(),
    )
}
