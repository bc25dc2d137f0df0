//! NUL-delimited JSON framing
//!
//! The Bellite host exchanges UTF-8 JSON documents separated by a single
//! `0x00` byte, with no length prefix. JSON encoding escapes control
//! characters, so the delimiter can never appear inside a message body.
//!
//! Two pieces live here:
//!
//! - [`RpcCodec`] turns one outgoing [`Request`] into bytes (delimiter
//!   included) and one complete frame back into a [`Message`].
//! - [`FrameBuffer`] accumulates partial reads and yields complete frames,
//!   keeping whatever follows the last delimiter for the next delivery.
//!
//! # Examples
//!
//! ```rust
//! use bellite_core::codec::{FrameBuffer, NulJsonCodec, RpcCodec};
//!
//! let codec = NulJsonCodec;
//! let mut buffer = FrameBuffer::new();
//!
//! let frames = buffer.push(b"{\"id\":100,\"result\":[0]}\0{\"id\":");
//! assert_eq!(frames.len(), 1);
//! assert!(codec.decode(&frames[0]).unwrap().is_reply());
//!
//! // The tail stays buffered until its delimiter arrives
//! assert_eq!(buffer.pending(), b"{\"id\":");
//! let frames = buffer.push(b"101}\0");
//! assert_eq!(frames, vec![b"{\"id\":101}".to_vec()]);
//! ```

use crate::error::{Error, Result};
use crate::types::{Message, Request};

/// Byte separating frames on the wire
pub const FRAME_DELIMITER: u8 = 0x00;

/// Encoding and decoding of single frames
pub trait RpcCodec {
    /// Encode a request, including the trailing delimiter
    fn encode(&self, request: &Request) -> Result<Vec<u8>>;

    /// Decode one complete frame (delimiter excluded)
    fn decode(&self, frame: &[u8]) -> Result<Message>;
}

/// JSON documents separated by NUL bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct NulJsonCodec;

impl RpcCodec for NulJsonCodec {
    fn encode(&self, request: &Request) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(request)?;
        bytes.push(FRAME_DELIMITER);
        Ok(bytes)
    }

    fn decode(&self, frame: &[u8]) -> Result<Message> {
        if frame.is_empty() {
            return Err(Error::Serialization("empty frame".into()));
        }
        let value: serde_json::Value = serde_json::from_slice(frame)?;
        Message::from_value(value)
    }
}

/// Largest partial frame kept while waiting for its delimiter (100MB)
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Carry-over buffer for a byte stream split on [`FRAME_DELIMITER`]
///
/// A partial frame that grows past the limit is discarded along with
/// everything up to the next delimiter.
#[derive(Debug)]
pub struct FrameBuffer {
    carry: Vec<u8>,
    limit: usize,
    discarding: bool,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_FRAME_SIZE)
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer that gives up on partial frames longer than `limit` bytes
    pub fn with_limit(limit: usize) -> Self {
        Self {
            carry: Vec::new(),
            limit,
            discarding: false,
        }
    }

    /// Append a delivery and return every frame it completed, in order
    ///
    /// Consecutive delimiters produce empty frames; they are returned as-is so
    /// the caller sees exactly what the peer sent.
    pub fn push(&mut self, mut bytes: &[u8]) -> Vec<Vec<u8>> {
        if self.discarding {
            let Some(end) = bytes.iter().position(|b| *b == FRAME_DELIMITER) else {
                return Vec::new();
            };
            bytes = &bytes[end + 1..];
            self.discarding = false;
        }
        self.carry.extend_from_slice(bytes);

        let frames = match self.carry.iter().rposition(|b| *b == FRAME_DELIMITER) {
            Some(last) => {
                let tail = self.carry.split_off(last + 1);
                let complete = std::mem::replace(&mut self.carry, tail);
                complete[..last]
                    .split(|b| *b == FRAME_DELIMITER)
                    .map(<[u8]>::to_vec)
                    .collect()
            }
            None => Vec::new(),
        };

        if self.carry.len() > self.limit {
            tracing::warn!(
                size = self.carry.len(),
                limit = self.limit,
                "Discarding oversized partial frame"
            );
            self.carry = Vec::new();
            self.discarding = true;
        }
        frames
    }

    /// Bytes received after the last delimiter
    pub fn pending(&self) -> &[u8] {
        &self.carry
    }

    /// Drop any partial frame
    pub fn clear(&mut self) {
        self.carry.clear();
        self.discarding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_appends_delimiter() {
        let req = Request::call(100, "auth", Some(json!(["tok"])));
        let bytes = NulJsonCodec.encode(&req).unwrap();

        assert_eq!(bytes.last(), Some(&FRAME_DELIMITER));
        assert_eq!(bytes.iter().filter(|b| **b == FRAME_DELIMITER).count(), 1);
    }

    #[test]
    fn test_encode_escapes_embedded_nul() {
        let req = Request::call(100, "echo", Some(json!(["a\u{0}b"])));
        let bytes = NulJsonCodec.encode(&req).unwrap();

        // Only the trailing delimiter is a raw NUL
        assert_eq!(bytes.iter().filter(|b| **b == FRAME_DELIMITER).count(), 1);
    }

    #[test]
    fn test_frames_across_deliveries() {
        let mut buffer = FrameBuffer::new();

        let first = buffer.push(b"{A}\0{B}\0{C");
        assert_eq!(first, vec![b"{A}".to_vec(), b"{B}".to_vec()]);
        assert_eq!(buffer.pending(), b"{C");

        let second = buffer.push(b"}\0");
        assert_eq!(second, vec![b"{C}".to_vec()]);
        assert!(buffer.pending().is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let input = b"{\"id\":1}\0{\"id\":2}\0";
        let mut frames = Vec::new();

        for byte in input.iter() {
            frames.extend(buffer.push(std::slice::from_ref(byte)));
        }

        assert_eq!(frames, vec![b"{\"id\":1}".to_vec(), b"{\"id\":2}".to_vec()]);
    }

    #[test]
    fn test_consecutive_delimiters_yield_empty_frames() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(b"\0\0{}\0");

        assert_eq!(frames, vec![Vec::new(), Vec::new(), b"{}".to_vec()]);
        assert!(NulJsonCodec.decode(&frames[0]).is_err());
    }

    #[test]
    fn test_no_delimiter_keeps_everything() {
        let mut buffer = FrameBuffer::new();
        assert!(buffer.push(b"{\"partial\":").is_empty());
        assert!(buffer.push(b"true").is_empty());
        assert_eq!(buffer.pending(), b"{\"partial\":true");

        buffer.clear();
        assert!(buffer.pending().is_empty());
    }

    #[test]
    fn test_oversized_partial_frame_is_discarded() {
        let mut buffer = FrameBuffer::with_limit(8);

        let frames = buffer.push(b"{\"id\":1}\0{\"huge\":");
        assert_eq!(frames, vec![b"{\"id\":1}".to_vec()]);
        assert!(buffer.push(b"\"0123456789").is_empty());
        assert!(buffer.pending().is_empty());

        // The rest of the oversized frame is skipped up to its delimiter
        assert!(buffer.push(b"abcdef\"}").is_empty());
        let frames = buffer.push(b"\"tail\"}\0[2]\0");
        assert_eq!(frames, vec![b"[2]".to_vec()]);
        assert!(buffer.pending().is_empty());
    }

    #[test]
    fn test_frame_within_limit_is_kept() {
        let mut buffer = FrameBuffer::with_limit(8);

        assert!(buffer.push(b"[1,2,3]").is_empty());
        assert_eq!(buffer.push(b"\0"), vec![b"[1,2,3]".to_vec()]);
    }

    #[test]
    fn test_decode_invalid_frames() {
        assert!(NulJsonCodec.decode(b"not json").is_err());
        assert!(NulJsonCodec.decode(b"").is_err());
        assert!(NulJsonCodec.decode(&[0xff, 0xfe]).is_err());
        assert!(NulJsonCodec.decode(b"{\"no\":\"id\"}").is_err());
    }

    #[test]
    fn test_decode_valid_frames() {
        let call = NulJsonCodec
            .decode(br#"{"jsonrpc":"2.0","method":"event","params":{"evtType":"x"}}"#)
            .unwrap();
        assert!(call.is_call());

        let reply = NulJsonCodec.decode(br#"{"jsonrpc":"2.0","id":7,"result":null}"#).unwrap();
        assert!(reply.is_reply());
    }
}
