//! Builder for outgoing payload bodies.

use bytes::{BufMut, Bytes, BytesMut};

/// Accumulates an outgoing payload body field by field.
///
/// Methods consume and return the writer so fields chain; call
/// [`finish`](PayloadWriter::finish) to freeze the result for dispatch.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one big-endian `i32`.
    pub fn put_i32(mut self, value: i32) -> Self {
        self.buf.put_i32(value);
        self
    }

    /// Appends one byte.
    pub fn put_u8(mut self, value: u8) -> Self {
        self.buf.put_u8(value);
        self
    }

    /// Appends a length-prefixed UTF-8 string.
    pub fn put_str(mut self, value: &str) -> Self {
        self.buf.put_i32(value.len() as i32);
        self.buf.put_slice(value.as_bytes());
        self
    }

    /// Appends a null string (-1 length prefix, no bytes).
    pub fn put_null_str(mut self) -> Self {
        self.buf.put_i32(-1);
        self
    }

    /// Appends a counted list of `i32`s.
    pub fn put_i32_list(mut self, values: &[i32]) -> Self {
        self.buf.put_i32(values.len() as i32);
        for v in values {
            self.buf.put_i32(*v);
        }
        self
    }

    /// Appends raw bytes with no framing.
    pub fn put_bytes(mut self, data: &[u8]) -> Self {
        self.buf.put_slice(data);
        self
    }

    /// Bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Freezes the accumulated body.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
