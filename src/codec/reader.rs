//! Bounds-checked reader for incoming payload bodies.

use bytes::{Buf, Bytes};

use crate::error::{ChannelError, Result};

/// Cursor over a received payload body.
///
/// Every read validates that enough bytes remain before touching the buffer,
/// so a truncated or hostile body surfaces as
/// [`ChannelError::Truncated`] instead of a panic.
#[derive(Debug, Clone)]
pub struct PayloadReader {
    buf: Bytes,
}

impl PayloadReader {
    /// Wraps a payload body for reading.
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// True once the whole body has been consumed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the unconsumed tail of the body.
    pub fn into_inner(self) -> Bytes {
        self.buf
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.len() < needed {
            return Err(ChannelError::Truncated {
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Reads one big-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// The prefix is an `i32` byte count; -1 denotes a null string and
    /// decodes to `None`. Invalid UTF-8 is a protocol error.
    pub fn read_string(&mut self) -> Result<Option<String>> {
        let len = self.read_i32()?;
        if len < 0 {
            return Ok(None);
        }
        let raw = self.read_bytes(len as usize)?;
        match String::from_utf8(raw.to_vec()) {
            Ok(s) => Ok(Some(s)),
            Err(e) => Err(ChannelError::Protocol(format!(
                "invalid UTF-8 in string field: {}",
                e
            ))),
        }
    }

    /// Reads a counted list of `i32`s.
    pub fn read_i32_list(&mut self) -> Result<Vec<i32>> {
        let count = self.read_i32()?;
        if count < 0 {
            return Err(ChannelError::Protocol(format!(
                "negative list count: {}",
                count
            )));
        }
        let count = count as usize;
        self.ensure(count * 4)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.buf.get_i32());
        }
        Ok(values)
    }

    /// Reads a counted list of nullable strings.
    pub fn read_string_list(&mut self) -> Result<Vec<Option<String>>> {
        let count = self.read_i32()?;
        if count < 0 {
            return Err(ChannelError::Protocol(format!(
                "negative list count: {}",
                count
            )));
        }
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            values.push(self.read_string()?);
        }
        Ok(values)
    }
}
