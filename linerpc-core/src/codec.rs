//! Framing and JSON encoding for line-delimited JSON-RPC
//!
//! The wire carries one JSON value per line. Framing and decoding are kept
//! apart:
//!
//! - [`FrameDecoder`] and [`LineCodec`] split a byte stream into bodies. A
//!   body is the bytes preceding each `\n`; a trailing partial frame is kept
//!   until the rest of it arrives.
//! - [`decode`] turns one body into a [`Message`]. A body that is not JSON
//!   is a [`Error::Framing`] and is fatal for the connection it arrived on.
//!
//! # Examples
//!
//! ```rust
//! use linerpc_core::codec::FrameDecoder;
//!
//! let mut decoder = FrameDecoder::new();
//! assert_eq!(decoder.feed(b"{\"id\":1,").count(), 0);
//!
//! let frames: Vec<_> = decoder.feed(b"\"result\":2}\n{\"method\":\"x\"}\n").collect();
//! assert_eq!(frames.len(), 2);
//! assert_eq!(&frames[0][..], b"{\"id\":1,\"result\":2}");
//! ```

use crate::error::{Error, Result};
use crate::types::{Message, Request};
use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frame terminator
pub const TERMINATOR: u8 = b'\n';

/// Serialize a single request body (without terminator)
pub fn encode_request(request: &Request) -> Result<String> {
    serde_json::to_string(request).map_err(|e| Error::Serialization(e.to_string()))
}

/// Serialize a batch of requests as one JSON array literal (without terminator)
pub fn encode_batch(requests: &[Request]) -> Result<String> {
    if requests.is_empty() {
        return Err(Error::InvalidRequest("Batch cannot be empty".to_string()));
    }
    serde_json::to_string(requests).map_err(|e| Error::Serialization(e.to_string()))
}

/// Parse one frame body into a message
pub fn decode(body: &[u8]) -> Result<Message> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| Error::Framing(e.to_string()))?;
    Ok(Message::classify(value))
}

/// Check whether a body carries nothing but whitespace
///
/// Blank lines are skipped instead of being treated as framing errors.
pub fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

/// Split the next complete frame off `buf`
///
/// `scanned` remembers how much of `buf` is already known to hold no
/// terminator so repeated calls on a growing partial frame stay linear.
fn split_frame(buf: &mut BytesMut, scanned: &mut usize) -> Option<Bytes> {
    let offset = buf[*scanned..].iter().position(|b| *b == TERMINATOR);
    match offset {
        Some(offset) => {
            let end = *scanned + offset;
            *scanned = 0;
            let mut frame = buf.split_to(end + 1);
            frame.truncate(end);
            Some(frame.freeze())
        }
        None => {
            *scanned = buf.len();
            None
        }
    }
}

/// Incremental frame decoder for chunked input
///
/// Feed arbitrary chunks; every complete body is yielded in arrival order as
/// soon as its terminator has been seen. No size limit is imposed here.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    scanned: usize,
}

impl FrameDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and lazily yield the bodies it completes
    ///
    /// Bodies not pulled from the returned iterator stay buffered and are
    /// yielded by the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.buf.extend_from_slice(chunk);
        Frames { decoder: self }
    }

    /// Number of buffered bytes not yet emitted as a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn next_frame(&mut self) -> Option<Bytes> {
        split_frame(&mut self.buf, &mut self.scanned)
    }
}

/// Lazy iterator over the complete frames held by a [`FrameDecoder`]
#[derive(Debug)]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_frame()
    }
}

/// `tokio_util` codec for newline-terminated frames
///
/// Decodes to raw frame bodies and encodes string bodies by appending the
/// terminator. An optional maximum length rejects oversized frames as
/// framing errors.
#[derive(Debug, Clone, Default)]
pub struct LineCodec {
    max_length: Option<usize>,
    scanned: usize,
}

impl LineCodec {
    /// Create a codec without a frame size limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec rejecting frames longer than `max_length` bytes
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length: Some(max_length),
            scanned: 0,
        }
    }

    /// Configured frame size limit
    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let frame = split_frame(src, &mut self.scanned);
        if let Some(max) = self.max_length {
            let oversized = match &frame {
                Some(frame) => frame.len() > max,
                None => src.len() > max,
            };
            if oversized {
                return Err(Error::Framing(format!(
                    "frame exceeds maximum length of {} bytes",
                    max
                )));
            }
        }
        Ok(frame)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // Unterminated tail at EOF is discarded.
                src.clear();
                self.scanned = 0;
                Ok(None)
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = Error;

    fn encode(&mut self, body: String, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(body.len() + 1);
        dst.put_slice(body.as_bytes());
        dst.put_u8(TERMINATOR);
        Ok(())
    }
}
