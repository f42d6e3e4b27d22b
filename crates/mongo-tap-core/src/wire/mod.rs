//! MongoDB wire-protocol vocabulary.
//!
//! This module provides:
//! - Opcode tags and the 16-byte standard message header
//! - Frame reassembly across TCP read boundaries
//! - Bounded primitive reads over a frame body
//! - Per-opcode body decoding into [`DecodedMessage`]

pub mod codec;
pub mod decode;
pub mod header;
pub mod message;
pub mod opcode;

pub use codec::{MongoCodec, RawFrame};
pub use decode::FrameCursor;
pub use header::{MsgHeader, HEADER_LEN};
pub use message::{decode_frame, DecodedMessage, Section};
pub use opcode::OpCode;
