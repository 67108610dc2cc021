//! Tag-length-value parameter blocks.
//!
//! The same byte layout configures attach, create, transaction begin, event
//! queueing and every service operation: a version byte, then items made of a
//! 1 byte tag followed by a value. Two flavours exist for the value length,
//! version 1 blocks use a 1 byte length while service blocks use little endian
//! 2 byte lengths.
use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::ProtocolError;
use crate::ext::UsizeExt;

/// Parameter block builder.
#[derive(Debug, Default, Clone)]
pub struct ParamBlock {
    buf: BytesMut,
}

impl ParamBlock {
    /// Empty block, without version byte.
    pub fn new() -> Self {
        Self { buf: BytesMut::with_capacity(64) }
    }

    /// Block starting with the given version byte.
    pub fn with_version(version: u8) -> Self {
        let mut me = Self::new();
        me.buf.put_u8(version);
        me
    }

    /// Append a bare tag.
    pub fn tag(&mut self, tag: u8) -> &mut Self {
        self.buf.put_u8(tag);
        self
    }

    /// Append a tag with a single byte value.
    pub fn byte(&mut self, tag: u8, value: u8) -> &mut Self {
        self.buf.put_slice(&[tag, value]);
        self
    }

    /// Append a tag with a 1 byte length prefixed value.
    ///
    /// # Panics
    ///
    /// Panics if `value` is longer than 255 bytes.
    pub fn short_bytes(&mut self, tag: u8, value: &[u8]) -> &mut Self {
        self.buf.put_u8(tag);
        self.buf.put_u8(value.len().to_u8());
        self.buf.put_slice(value);
        self
    }

    /// Append a tag with a 1 byte length prefixed string.
    pub fn short_str(&mut self, tag: u8, value: &str) -> &mut Self {
        self.short_bytes(tag, value.as_bytes())
    }

    /// Append a tag with a 1 byte length prefixed little endian 4 byte integer.
    pub fn short_int(&mut self, tag: u8, value: i32) -> &mut Self {
        self.short_bytes(tag, &value.to_le_bytes())
    }

    /// Append a tag with a little endian 2 byte integer, no length.
    pub fn int16(&mut self, tag: u8, value: i16) -> &mut Self {
        self.buf.put_u8(tag);
        self.buf.put_i16_le(value);
        self
    }

    /// Append a tag with a little endian 4 byte integer, no length.
    pub fn int32(&mut self, tag: u8, value: i32) -> &mut Self {
        self.buf.put_u8(tag);
        self.buf.put_i32_le(value);
        self
    }

    /// Append a tag with a little endian 8 byte integer, no length.
    pub fn int64(&mut self, tag: u8, value: i64) -> &mut Self {
        self.buf.put_u8(tag);
        self.buf.put_i64_le(value);
        self
    }

    /// Append a tag with a 2 byte length prefixed string.
    pub fn string(&mut self, tag: u8, value: &str) -> &mut Self {
        self.buf.put_u8(tag);
        self.buf.put_u16_le(value.len().to_u16());
        self.buf.put_slice(value.as_bytes());
        self
    }

    /// Append raw bytes.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Parameter and info buffer reader, every read is bounds checked.
#[derive(Debug, Clone)]
pub struct ParamReader {
    buf: Bytes,
}

impl ParamReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn is_end(&self) -> bool {
        !self.buf.has_remaining()
    }

    /// Next tag, [`None`] at the end of buffer.
    pub fn next_tag(&mut self) -> Option<u8> {
        match self.buf.has_remaining() {
            true => Some(self.buf.get_u8()),
            false => None,
        }
    }

    pub fn peek(&self) -> Option<u8> {
        self.buf.first().copied()
    }

    pub fn skip(&mut self, count: usize) -> Result<(), ProtocolError> {
        self.need(count)?;
        self.buf.advance(count);
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn get_i16(&mut self) -> Result<i16, ProtocolError> {
        self.need(2)?;
        Ok(self.buf.get_i16_le())
    }

    pub fn get_i32(&mut self) -> Result<i32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn get_i64(&mut self) -> Result<i64, ProtocolError> {
        self.need(8)?;
        Ok(self.buf.get_i64_le())
    }

    /// Read 2 byte length prefixed bytes.
    pub fn get_bytes(&mut self) -> Result<Bytes, ProtocolError> {
        let len = self.get_i16()? as u16 as usize;
        self.need(len)?;
        Ok(self.buf.split_to(len))
    }

    /// Read 2 byte length prefixed string, lossy.
    pub fn get_string(&mut self) -> Result<String, ProtocolError> {
        self.get_bytes().map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    /// Read 2 byte length prefixed little endian integer of any width.
    pub fn get_int(&mut self) -> Result<i64, ProtocolError> {
        let bytes = self.get_bytes()?;
        Ok(crate::ext::le_int(&bytes))
    }

    /// Remaining unread bytes.
    pub fn rest(&self) -> &Bytes {
        &self.buf
    }

    fn need(&self, len: usize) -> Result<(), ProtocolError> {
        match self.buf.remaining() >= len {
            true => Ok(()),
            false => Err(ProtocolError::malformed("parameter buffer too short")),
        }
    }
}
