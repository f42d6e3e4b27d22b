//! Bounded cursor over one frame body.
//!
//! All reads are little-endian. Exhaustion is an explicit [`DecodeError`],
//! never a panic; a clean end-of-cursor boundary is only meaningful to
//! [`FrameCursor::read_document`], which uses it to terminate document
//! sequences.

use bson::Document;

use crate::error::{DecodeError, DecodeResult};

/// A bounded, advancing view over a frame body slice.
#[derive(Debug)]
pub struct FrameCursor<'a> {
    buf: &'a [u8],
}

impl<'a> FrameCursor<'a> {
    /// Create a cursor over a frame body.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes left unread.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Whether the cursor is exhausted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn advance(&mut self, n: usize) {
        self.buf = &self.buf[n..];
    }

    /// Read a single byte.
    pub fn read_u8(&mut self, what: &'static str) -> DecodeResult<u8> {
        if self.buf.is_empty() {
            return Err(DecodeError::Truncated(what));
        }
        let value = self.buf[0];
        self.advance(1);
        Ok(value)
    }

    /// Read a little-endian i32.
    pub fn read_i32(&mut self, what: &'static str) -> DecodeResult<i32> {
        if self.buf.len() < 4 {
            return Err(DecodeError::Truncated(what));
        }
        let value = i32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        self.advance(4);
        Ok(value)
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self, what: &'static str) -> DecodeResult<u32> {
        if self.buf.len() < 4 {
            return Err(DecodeError::Truncated(what));
        }
        let value = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        self.advance(4);
        Ok(value)
    }

    /// Read a little-endian i64.
    pub fn read_i64(&mut self, what: &'static str) -> DecodeResult<i64> {
        if self.buf.len() < 8 {
            return Err(DecodeError::Truncated(what));
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.buf[..8]);
        self.advance(8);
        Ok(i64::from_le_bytes(bytes))
    }

    /// Read a NUL-terminated UTF-8 string; the NUL is consumed but not
    /// returned.
    pub fn read_cstring(&mut self) -> DecodeResult<String> {
        let terminal = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::UnterminatedCString)?;
        let value = std::str::from_utf8(&self.buf[..terminal])
            .map_err(|_| DecodeError::InvalidCString)?
            .to_string();
        self.advance(terminal + 1);
        Ok(value)
    }

    /// Read one BSON document, or `None` on a clean end-of-cursor boundary.
    ///
    /// The document's 4-byte length prefix counts itself; a length below 5
    /// is malformed. A body shorter than the advertised length is treated
    /// as the end of a document sequence in this bounded context.
    pub fn read_document(&mut self) -> DecodeResult<Option<Document>> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        if self.buf.len() < 4 {
            return Err(DecodeError::Truncated("document length"));
        }
        let length = i32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        if length < 5 {
            return Err(DecodeError::DocumentTooShort(length));
        }
        let length = length as usize;
        if self.buf.len() < length {
            return Ok(None);
        }
        let doc = Document::from_reader(&self.buf[..length])?;
        self.advance(length);
        Ok(Some(doc))
    }

    /// Read one BSON document that must be present.
    pub fn read_required_document(&mut self, what: &'static str) -> DecodeResult<Document> {
        self.read_document()?
            .ok_or(DecodeError::Truncated(what))
    }

    /// Read BSON documents until the cursor is exhausted.
    pub fn read_documents(&mut self) -> DecodeResult<Vec<Document>> {
        let mut documents = Vec::new();
        while let Some(doc) = self.read_document()? {
            documents.push(doc);
        }
        Ok(documents)
    }

    /// Split off the next `n` bytes as a sub-cursor.
    pub fn take(&mut self, n: usize, what: &'static str) -> DecodeResult<FrameCursor<'a>> {
        if self.buf.len() < n {
            return Err(DecodeError::Truncated(what));
        }
        let taken = FrameCursor::new(&self.buf[..n]);
        self.advance(n);
        Ok(taken)
    }

    /// Split off the trailing `n` bytes, leaving the head in place.
    pub fn split_tail(&mut self, n: usize, what: &'static str) -> DecodeResult<FrameCursor<'a>> {
        if self.buf.len() < n {
            return Err(DecodeError::Truncated(what));
        }
        let at = self.buf.len() - n;
        let tail = FrameCursor::new(&self.buf[at..]);
        self.buf = &self.buf[..at];
        Ok(tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn doc_bytes(doc: &Document) -> Vec<u8> {
        let mut bytes = Vec::new();
        doc.to_writer(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_read_integers() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&269i32.to_le_bytes());
        bytes.extend_from_slice(&0xdead_beefu32.to_le_bytes());
        bytes.extend_from_slice(&(-42i64).to_le_bytes());

        let mut cursor = FrameCursor::new(&bytes);
        assert_eq!(cursor.read_i32("a").unwrap(), 269);
        assert_eq!(cursor.read_u32("b").unwrap(), 0xdead_beef);
        assert_eq!(cursor.read_i64("c").unwrap(), -42);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_read_integer_exhausted() {
        let mut cursor = FrameCursor::new(&[1, 2]);
        assert!(matches!(
            cursor.read_i32("field"),
            Err(DecodeError::Truncated("field"))
        ));
    }

    #[test]
    fn test_read_cstring() {
        let mut cursor = FrameCursor::new(b"db.coll\0rest");
        assert_eq!(cursor.read_cstring().unwrap(), "db.coll");
        assert_eq!(cursor.remaining(), 4);
    }

    #[test]
    fn test_read_empty_cstring() {
        let mut cursor = FrameCursor::new(b"\0");
        assert_eq!(cursor.read_cstring().unwrap(), "");
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_read_cstring_unterminated() {
        let mut cursor = FrameCursor::new(b"no-nul-here");
        assert!(matches!(
            cursor.read_cstring(),
            Err(DecodeError::UnterminatedCString)
        ));
    }

    #[test]
    fn test_read_cstring_invalid_utf8() {
        let mut cursor = FrameCursor::new(&[0xff, 0xfe, 0x00]);
        assert!(matches!(
            cursor.read_cstring(),
            Err(DecodeError::InvalidCString)
        ));
    }

    #[test]
    fn test_read_document() {
        let bytes = doc_bytes(&doc! {"a": 1});
        let mut cursor = FrameCursor::new(&bytes);
        let decoded = cursor.read_document().unwrap().unwrap();
        assert_eq!(decoded.get_i32("a").unwrap(), 1);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_read_document_at_boundary_is_none() {
        let mut cursor = FrameCursor::new(&[]);
        assert!(cursor.read_document().unwrap().is_none());
    }

    #[test]
    fn test_read_document_short_body_ends_sequence() {
        let mut bytes = doc_bytes(&doc! {"a": 1});
        bytes.truncate(bytes.len() - 2);
        let mut cursor = FrameCursor::new(&bytes);
        assert!(cursor.read_document().unwrap().is_none());
    }

    #[test]
    fn test_read_document_undersized_length() {
        let bytes = 4i32.to_le_bytes();
        let mut cursor = FrameCursor::new(&bytes);
        assert!(matches!(
            cursor.read_document(),
            Err(DecodeError::DocumentTooShort(4))
        ));
    }

    #[test]
    fn test_read_documents_sequence() {
        let mut bytes = doc_bytes(&doc! {"a": 1});
        bytes.extend_from_slice(&doc_bytes(&doc! {"b": 2}));
        bytes.extend_from_slice(&doc_bytes(&doc! {"c": 3}));

        let mut cursor = FrameCursor::new(&bytes);
        let docs = cursor.read_documents().unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[2].get_i32("c").unwrap(), 3);
    }

    #[test]
    fn test_take_and_split_tail() {
        let mut cursor = FrameCursor::new(b"0123456789");
        let mut head = cursor.take(4, "head").unwrap();
        assert_eq!(head.read_u8("byte").unwrap(), b'0');
        assert_eq!(cursor.remaining(), 6);

        let tail = cursor.split_tail(2, "tail").unwrap();
        assert_eq!(tail.remaining(), 2);
        assert_eq!(cursor.remaining(), 4);

        assert!(cursor.split_tail(5, "too much").is_err());
    }
}
