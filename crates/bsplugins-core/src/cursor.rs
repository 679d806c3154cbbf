//! Bounds-checked little-endian reads over a byte slice.
//!
//! A [`Cursor`] remembers the absolute offset of its slice inside the file so
//! that errors raised deep inside a decompressed or nested span still report
//! a useful position.

use crate::reader::DecodeError;
use crate::type_code::TypeCode;

#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// A cursor whose positions are reported relative to `base`.
    pub fn with_base(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }

    /// Absolute offset of the next byte to be read.
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Position relative to the start of this cursor's span.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread bytes, without consuming them.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// The unread bytes up to the first NUL (or the end), without consuming them.
    pub fn peek_zstring(&self) -> &'a [u8] {
        let rest = self.rest();
        match rest.iter().position(|&b| b == 0) {
            Some(end) => &rest[..end],
            None => rest,
        }
    }

    fn overrun(&self, wanted: usize, what: &str) -> DecodeError {
        DecodeError::Malformed {
            offset: self.offset(),
            reason: format!(
                "{what} needs {wanted} bytes but only {} remain",
                self.remaining()
            ),
        }
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(self.overrun(len, "read"));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        if N > self.remaining() {
            return Err(self.overrun(N, "read"));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        if len > self.remaining() {
            return Err(self.overrun(len, "skip"));
        }
        self.pos += len;
        Ok(())
    }

    /// Split off the next `len` bytes as their own cursor and advance past them.
    pub fn take(&mut self, len: usize) -> Result<Cursor<'a>, DecodeError> {
        let base = self.offset();
        if len > self.remaining() {
            return Err(self.overrun(len, "span"));
        }
        let data = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(Cursor::with_base(data, base))
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        self.array().map(i16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.array().map(u32::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.array().map(i32::from_le_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        self.array().map(f32::from_le_bytes)
    }

    pub fn read_type_code(&mut self) -> Result<TypeCode, DecodeError> {
        self.array().map(TypeCode)
    }

    /// Read a NUL-terminated string. A missing terminator consumes the rest of
    /// the span. Bytes are decoded as Windows-1252-compatible Latin-1.
    pub fn read_zstring(&mut self) -> Result<String, DecodeError> {
        let raw = self.peek_zstring();
        let consumed = (raw.len() + 1).min(self.remaining());
        self.pos += consumed;
        Ok(latin1(raw))
    }

    /// Read a fixed-width, NUL-padded string field.
    pub fn read_fixed_string(&mut self, len: usize) -> Result<String, DecodeError> {
        let raw = self.bytes(len)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(latin1(&raw[..end]))
    }
}

pub(crate) fn latin1(raw: &[u8]) -> String {
    raw.iter().map(|&b| b as char).collect()
}
