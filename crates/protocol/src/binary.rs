//! Binary reading and writing utilities for the session protocol.
//!
//! All values are little-endian. Reads are checked: running out of data
//! yields [`ProtocolError::UnexpectedEof`] instead of panicking, since every
//! frame comes from an untrusted peer.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Color, Position, ProtocolError};

/// A reader for parsing binary protocol messages.
#[derive(Debug)]
pub struct BinaryReader {
    buf: Bytes,
}

impl BinaryReader {
    /// Create a new reader from raw bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { buf: data.into() }
    }

    /// Returns remaining bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    #[inline]
    fn ensure(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() >= n {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedEof)
        }
    }

    #[inline]
    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    #[inline]
    pub fn get_bool(&mut self) -> Result<bool, ProtocolError> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidValue {
                field: "bool",
                value: other as u32,
            }),
        }
    }

    #[inline]
    pub fn get_u16(&mut self) -> Result<u16, ProtocolError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    #[inline]
    pub fn get_u32(&mut self) -> Result<u32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    #[inline]
    pub fn get_f32(&mut self) -> Result<f32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_f32_le())
    }

    /// Read an RGB triple.
    pub fn get_color(&mut self) -> Result<Color, ProtocolError> {
        self.ensure(3)?;
        Ok(Color::new(self.buf.get_u8(), self.buf.get_u8(), self.buf.get_u8()))
    }

    /// Read a 2D position as two `f32`s.
    pub fn get_position(&mut self) -> Result<Position, ProtocolError> {
        let x = self.get_f32()?;
        let y = self.get_f32()?;
        Ok(Position::new(x, y))
    }

    /// Read a null-terminated UTF-8 string.
    ///
    /// A missing terminator is an error: the string would otherwise swallow
    /// whatever fields follow it.
    pub fn get_string_utf8(&mut self) -> Result<String, ProtocolError> {
        let end = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::UnexpectedEof)?;
        let bytes = self.buf.split_to(end);
        self.buf.advance(1);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Fails if any bytes are left over after a full message was parsed.
    pub fn finish(&self) -> Result<(), ProtocolError> {
        match self.buf.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }
}

/// A writer for building binary protocol messages.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: BytesMut,
}

impl BinaryWriter {
    /// Create a new writer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Create a new writer with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Returns the current length.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    #[inline]
    pub fn put_bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    #[inline]
    pub fn put_u16(&mut self, v: u16) {
        self.buf.put_u16_le(v);
    }

    #[inline]
    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32_le(v);
    }

    #[inline]
    pub fn put_f32(&mut self, v: f32) {
        self.buf.put_f32_le(v);
    }

    pub fn put_color(&mut self, c: Color) {
        self.buf.put_u8(c.r);
        self.buf.put_u8(c.g);
        self.buf.put_u8(c.b);
    }

    pub fn put_position(&mut self, p: Position) {
        self.buf.put_f32_le(p.x);
        self.buf.put_f32_le(p.y);
    }

    /// Write a null-terminated UTF-8 string.
    ///
    /// Interior NULs are dropped so the terminator stays unambiguous.
    pub fn put_string_utf8(&mut self, s: &str) {
        for b in s.bytes().filter(|&b| b != 0) {
            self.buf.put_u8(b);
        }
        self.buf.put_u8(0);
    }

    /// Consume the writer and return the built buffer.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_u32() {
        let mut w = BinaryWriter::new();
        w.put_u32(0xDEADBEEF);
        let mut r = BinaryReader::new(w.finish());
        assert_eq!(r.get_u32().unwrap(), 0xDEADBEEF);
        assert!(r.finish().is_ok());
    }

    #[test]
    fn test_string_utf8() {
        let mut w = BinaryWriter::new();
        w.put_string_utf8("hello");
        w.put_u8(7);
        let mut r = BinaryReader::new(w.finish());
        assert_eq!(r.get_string_utf8().unwrap(), "hello");
        assert_eq!(r.get_u8().unwrap(), 7);
    }

    #[test]
    fn test_short_read_is_error() {
        let mut r = BinaryReader::new(vec![1u8, 2]);
        assert!(matches!(r.get_u32(), Err(ProtocolError::UnexpectedEof)));
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let mut r = BinaryReader::new(b"abc".to_vec());
        assert!(matches!(r.get_string_utf8(), Err(ProtocolError::UnexpectedEof)));
    }

    #[test]
    fn test_interior_nul_is_stripped() {
        let mut w = BinaryWriter::new();
        w.put_string_utf8("a\0b");
        let mut r = BinaryReader::new(w.finish());
        assert_eq!(r.get_string_utf8().unwrap(), "ab");
        assert!(r.finish().is_ok());
    }

    #[test]
    fn test_bad_bool() {
        let mut r = BinaryReader::new(vec![2u8]);
        assert!(matches!(
            r.get_bool(),
            Err(ProtocolError::InvalidValue { field: "bool", value: 2 })
        ));
    }
}
