//! The 16-byte standard message header that begins every wire frame.

/// Size of the standard message header in bytes.
pub const HEADER_LEN: usize = 16;

/// Standard message header, four little-endian i32 fields.
///
/// `message_length` counts the whole frame including the header itself,
/// so the body is `message_length - 16` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    /// Total frame size, including this header.
    pub message_length: i32,

    /// Sender-assigned identifier for this message.
    pub request_id: i32,

    /// `request_id` of the request this frame answers; 0 if unsolicited.
    pub response_to: i32,

    /// Frame variant tag. Kept as the raw wire value so unknown opcodes
    /// survive into the error event.
    pub op_code: i32,
}

impl MsgHeader {
    /// Decode a header from its first 16 bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than [`HEADER_LEN`]; callers hand in a
    /// slice they have already length-checked.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let i32_at = |offset: usize| {
            i32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };
        Self {
            message_length: i32_at(0),
            request_id: i32_at(4),
            response_to: i32_at(8),
            op_code: i32_at(12),
        }
    }

    /// Body length for this frame.
    #[must_use]
    pub fn body_len(&self) -> usize {
        (self.message_length as usize).saturating_sub(HEADER_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_from_bytes() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&48i32.to_le_bytes());
        bytes.extend_from_slice(&7i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&2004i32.to_le_bytes());

        let header = MsgHeader::from_bytes(&bytes);
        assert_eq!(header.message_length, 48);
        assert_eq!(header.request_id, 7);
        assert_eq!(header.response_to, 0);
        assert_eq!(header.op_code, 2004);
        assert_eq!(header.body_len(), 32);
    }

    #[test]
    fn test_header_only_frame_has_empty_body() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&16i32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 12]);

        let header = MsgHeader::from_bytes(&bytes);
        assert_eq!(header.body_len(), 0);
    }
}
