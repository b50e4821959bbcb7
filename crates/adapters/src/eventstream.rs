// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Decoder for `application/vnd.amazon.eventstream` bodies.
//!
//! Each message is a binary frame:
//!
//! ```text
//! total length (u32 BE) | headers length (u32 BE) | prelude CRC32
//! headers | payload | message CRC32
//! ```
//!
//! Header entries are a 1-byte name length, the name, a type byte and a
//! typed value. Only string values are kept; the others are skipped.

use llm_jurybench_core::provider::Result;
use llm_jurybench_core::ProviderError;
use std::collections::BTreeMap;

/// Content type of event-stream response bodies.
pub const CONTENT_TYPE: &str = "application/vnd.amazon.eventstream";

/// Header carrying `event`, `exception` or `error`.
pub const MESSAGE_TYPE_HEADER: &str = ":message-type";
/// Header naming the event, e.g. `contentBlockDelta`.
pub const EVENT_TYPE_HEADER: &str = ":event-type";
/// Header naming the exception on `exception` messages.
pub const EXCEPTION_TYPE_HEADER: &str = ":exception-type";

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;
const MIN_FRAME_LEN: usize = PRELUDE_LEN + CRC_LEN;
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const TYPE_BOOL_TRUE: u8 = 0;
const TYPE_BOOL_FALSE: u8 = 1;
const TYPE_BYTE: u8 = 2;
const TYPE_SHORT: u8 = 3;
const TYPE_INT: u8 = 4;
const TYPE_LONG: u8 = 5;
const TYPE_BYTES: u8 = 6;
const TYPE_STRING: u8 = 7;
const TYPE_TIMESTAMP: u8 = 8;
const TYPE_UUID: u8 = 9;

fn decode_error(msg: impl Into<String>) -> ProviderError {
    ProviderError::Decode(format!("event stream: {}", msg.into()))
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// One decoded event-stream message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventMessage {
    /// String-valued headers
    pub headers: BTreeMap<String, String>,
    /// Raw payload, JSON for Converse events
    pub payload: Vec<u8>,
}

impl EventMessage {
    /// A string header, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

fn parse_headers(mut bytes: &[u8]) -> Result<BTreeMap<String, String>> {
    let mut headers = BTreeMap::new();
    while !bytes.is_empty() {
        let name_len = usize::from(bytes[0]);
        let rest = &bytes[1..];
        if rest.len() < name_len + 1 {
            return Err(decode_error("truncated header name"));
        }
        let name = std::str::from_utf8(&rest[..name_len])
            .map_err(|_| decode_error("header name is not UTF-8"))?
            .to_string();
        let value_type = rest[name_len];
        let rest = &rest[name_len + 1..];

        let (value_len, prefix) = match value_type {
            TYPE_BOOL_TRUE | TYPE_BOOL_FALSE => (0, 0),
            TYPE_BYTE => (1, 0),
            TYPE_SHORT => (2, 0),
            TYPE_INT => (4, 0),
            TYPE_LONG | TYPE_TIMESTAMP => (8, 0),
            TYPE_UUID => (16, 0),
            TYPE_BYTES | TYPE_STRING => {
                if rest.len() < 2 {
                    return Err(decode_error("truncated header value length"));
                }
                (usize::from(u16::from_be_bytes([rest[0], rest[1]])), 2)
            }
            other => return Err(decode_error(format!("unknown header type {other}"))),
        };
        if rest.len() < prefix + value_len {
            return Err(decode_error(format!("truncated value for header {name}")));
        }
        let value = &rest[prefix..prefix + value_len];
        if value_type == TYPE_STRING {
            let value = std::str::from_utf8(value)
                .map_err(|_| decode_error(format!("header {name} is not UTF-8")))?;
            headers.insert(name, value.to_string());
        }
        bytes = &rest[prefix + value_len..];
    }
    Ok(headers)
}

/// Accumulates body chunks and yields complete messages.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: Vec<u8>,
}

impl EventStreamDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete frame.
    ///
    /// # Errors
    ///
    /// Fails on a checksum mismatch, an impossible length, or malformed
    /// headers.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<EventMessage>> {
        self.buffer.extend_from_slice(bytes);

        let mut messages = Vec::new();
        while self.buffer.len() >= PRELUDE_LEN {
            let total_len = read_u32(&self.buffer[0..4]) as usize;
            let headers_len = read_u32(&self.buffer[4..8]) as usize;
            let prelude_crc = read_u32(&self.buffer[8..12]);

            if crc32fast::hash(&self.buffer[..8]) != prelude_crc {
                return Err(decode_error("prelude checksum mismatch"));
            }
            if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&total_len)
                || headers_len > total_len - MIN_FRAME_LEN
            {
                return Err(decode_error(format!(
                    "invalid frame lengths total={total_len} headers={headers_len}"
                )));
            }
            if self.buffer.len() < total_len {
                break;
            }

            let frame: Vec<u8> = self.buffer.drain(..total_len).collect();
            let body_end = total_len - CRC_LEN;
            if crc32fast::hash(&frame[..body_end]) != read_u32(&frame[body_end..]) {
                return Err(decode_error("message checksum mismatch"));
            }

            let headers_end = PRELUDE_LEN + headers_len;
            messages.push(EventMessage {
                headers: parse_headers(&frame[PRELUDE_LEN..headers_end])?,
                payload: frame[headers_end..body_end].to_vec(),
            });
        }

        Ok(messages)
    }

    /// Check that the body did not end inside a frame.
    pub fn finish(self) -> Result<()> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(decode_error(format!(
                "body ended with {} bytes of an incomplete frame",
                self.buffer.len()
            )))
        }
    }
}

/// Encode one frame with string headers.
pub fn encode_frame(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
    let mut header_bytes = Vec::new();
    for (name, value) in headers {
        header_bytes.push(name.len() as u8);
        header_bytes.extend_from_slice(name.as_bytes());
        header_bytes.push(TYPE_STRING);
        header_bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        header_bytes.extend_from_slice(value.as_bytes());
    }

    let total_len = (PRELUDE_LEN + header_bytes.len() + payload.len() + CRC_LEN) as u32;
    let mut frame = Vec::with_capacity(total_len as usize);
    frame.extend_from_slice(&total_len.to_be_bytes());
    frame.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    let prelude_crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&prelude_crc.to_be_bytes());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(payload);
    let message_crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&message_crc.to_be_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str, payload: &str) -> Vec<u8> {
        encode_frame(
            &[
                (MESSAGE_TYPE_HEADER, "event"),
                (EVENT_TYPE_HEADER, event_type),
                (":content-type", "application/json"),
            ],
            payload.as_bytes(),
        )
    }

    #[test]
    fn test_frames_split_across_chunks() {
        let mut body = event("messageStart", r#"{"role":"assistant"}"#);
        body.extend(event("contentBlockDelta", r#"{"delta":{"text":"Hi"}}"#));

        let mut decoder = EventStreamDecoder::new();
        let mut messages = Vec::new();
        for chunk in body.chunks(7) {
            messages.extend(decoder.feed(chunk).unwrap());
        }
        decoder.finish().unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].header(EVENT_TYPE_HEADER), Some("contentBlockDelta"));
        assert_eq!(messages[1].header(MESSAGE_TYPE_HEADER), Some("event"));
        assert_eq!(messages[1].payload, br#"{"delta":{"text":"Hi"}}"#);
    }

    #[test]
    fn test_non_string_headers_are_skipped() {
        // name "n", type int, value 7; then a string header
        let mut headers = vec![1, b'n', TYPE_INT, 0, 0, 0, 7];
        headers.extend([2, b':', b'x', TYPE_STRING, 0, 1, b'y']);
        let parsed = parse_headers(&headers).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[":x"], "y");
    }

    #[test]
    fn test_corrupt_frame_is_rejected() {
        let mut frame = event("metadata", "{}");
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        let err = EventStreamDecoder::new().feed(&frame).unwrap_err();
        assert!(err.to_string().contains("message checksum mismatch"));

        let err = EventStreamDecoder::new().feed(b"{\"not\":\"a frame\"}\n").unwrap_err();
        assert_eq!(err.code(), "DecodeError");
    }

    #[test]
    fn test_truncated_body_is_reported() {
        let frame = event("metadata", "{}");
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed(&frame[..frame.len() - 3]).unwrap().is_empty());
        assert!(decoder.finish().is_err());
    }
}
