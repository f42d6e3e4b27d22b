//! MongoDB wire frame reassembly.
//!
//! Implements tokio's `Decoder` trait for MongoDB wire frames. Frames are
//! self-delimiting: the first 4 bytes of the header carry the total frame
//! length (little-endian, including the header itself), so the decoder can
//! reassemble frames across arbitrary TCP read boundaries.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::error::DecodeError;

use super::header::{MsgHeader, HEADER_LEN};

/// Default frame ceiling, MongoDB's maxMessageSizeBytes (48 MiB).
const DEFAULT_MAX_FRAME_SIZE: usize = 48 * 1024 * 1024;

/// A reassembled wire frame: header plus the undecoded body bytes.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// The decoded 16-byte header.
    pub header: MsgHeader,
    /// The `message_length - 16` body bytes.
    pub body: Bytes,
}

/// Codec for MongoDB wire frames.
///
/// Only reassembles; opcode dispatch and body decoding happen on the
/// complete frame. Errors from this codec (negative body length, frame
/// above the ceiling) are unrecoverable for the stream, because the next
/// frame boundary can no longer be trusted.
#[derive(Debug, Clone)]
pub struct MongoCodec {
    max_frame_size: usize,
}

impl MongoCodec {
    /// Create a new codec with the default frame ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Create a new codec with a custom frame ceiling.
    #[must_use]
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for MongoCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MongoCodec {
    type Item = RawFrame;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Need the full header to know the frame length.
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let message_length = i32::from_le_bytes([src[0], src[1], src[2], src[3]]);

        if message_length < HEADER_LEN as i32 {
            return Err(DecodeError::BadMessageLength(message_length));
        }

        let total = message_length as usize;
        if total > self.max_frame_size {
            return Err(DecodeError::FrameTooLarge {
                length: total,
                max: self.max_frame_size,
            });
        }

        if src.len() < total {
            // Reserve space for the rest of the frame.
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(total);
        let header = MsgHeader::from_bytes(&frame[..HEADER_LEN]);
        frame.advance(HEADER_LEN);

        Ok(Some(RawFrame {
            header,
            body: frame.freeze(),
        }))
    }
}
