//! Bounds-checked field access over a payload slice.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{ProtoError, Result};

/// Reads little-endian fields off the front of a payload.
#[derive(Debug, Clone)]
pub(crate) struct PayloadReader<'a> {
    buf: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn need(&self, what: &'static str, needed: usize) -> Result<()> {
        if self.buf.len() < needed {
            return Err(ProtoError::Truncated {
                what,
                needed,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self, what: &'static str) -> Result<u8> {
        self.need(what, 1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16(&mut self, what: &'static str) -> Result<u16> {
        self.need(what, 2)?;
        Ok(self.buf.get_u16_le())
    }

    pub(crate) fn f32(&mut self, what: &'static str) -> Result<f32> {
        self.need(what, 4)?;
        Ok(self.buf.get_f32_le())
    }

    pub(crate) fn bytes(&mut self, what: &'static str, len: usize) -> Result<&'a [u8]> {
        self.need(what, len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// A NUL-terminated string; the terminator is consumed but not returned.
    pub(crate) fn cstr(&mut self, what: &'static str) -> Result<&'a str> {
        let end = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtoError::MissingTerminator { what })?;
        let (head, tail) = self.buf.split_at(end);
        self.buf = &tail[1..];
        std::str::from_utf8(head).map_err(|source| ProtoError::InvalidString { what, source })
    }
}

/// Append `s` followed by a NUL byte.
pub(crate) fn put_cstr(dst: &mut BytesMut, s: &str) {
    dst.put_slice(s.as_bytes());
    dst.put_u8(0);
}

/// Narrow a collection length to its one-byte count field.
pub(crate) fn count_u8(what: &'static str, count: usize) -> Result<u8> {
    u8::try_from(count).map_err(|_| ProtoError::CountOverflow { what, count })
}
