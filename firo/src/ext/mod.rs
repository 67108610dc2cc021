//! Binary codec helpers.
//!
//! Words on the wire are 4 byte big endian integers. Variable length data is
//! XDR encoded: a 4 byte length, the payload, then zero padding up to the next
//! 4 byte boundary, the length prefix itself is never padded.
//!
//! Parameter blocks and info buffers use little endian integers instead.
use bytes::{Buf, BufMut, Bytes};

use crate::firebird::ProtocolError;

/// Number of zero bytes required to align `len` to 4 bytes.
pub const fn xdr_pad(len: usize) -> usize {
    (4 - (len & 3)) & 3
}

/// Length is `usize` in rust, while the protocol wants fixed width integers.
pub trait UsizeExt {
    /// Panic when overflow instead of wrapping.
    fn to_u32(self) -> u32;
    /// Panic when overflow instead of wrapping.
    fn to_u16(self) -> u16;
    /// Panic when overflow instead of wrapping.
    fn to_u8(self) -> u8;
}

/// XDR operation in [`BufMut`].
pub trait BufMutExt {
    /// Write length prefixed and padded bytes.
    fn put_xdr_bytes(&mut self, bytes: &[u8]);
    /// Write length prefixed and padded string.
    fn put_xdr_str(&mut self, string: &str);
    /// Write zero padding for a payload of `len` bytes.
    fn put_xdr_pad(&mut self, len: usize);
}

/// XDR operation in [`Bytes`], every read is bounds checked.
pub trait BytesExt {
    fn get_xdr_u32(&mut self) -> Result<u32, ProtocolError>;

    fn get_xdr_i32(&mut self) -> Result<i32, ProtocolError> {
        self.get_xdr_u32().map(|e| e as i32)
    }

    /// Read exactly `len` bytes.
    fn get_exact(&mut self, len: usize) -> Result<Bytes, ProtocolError>;

    /// Read `len` bytes followed by its padding.
    fn get_aligned(&mut self, len: usize) -> Result<Bytes, ProtocolError>;

    /// Read length prefixed and padded bytes, consumes exactly `4 + len + pad`.
    fn get_xdr_bytes(&mut self) -> Result<Bytes, ProtocolError> {
        let len = self.get_xdr_u32()? as usize;
        self.get_aligned(len)
    }

    /// Read little endian 2 byte length prefixed bytes.
    fn get_le_bytes(&mut self) -> Result<Bytes, ProtocolError>;
}

/// Decode a little endian signed integer of 1 to 8 bytes.
///
/// Info buffers carry integers with a 2 byte length followed by the value,
/// the value width varies per item.
pub fn le_int(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    let len = bytes.len().min(8);
    buf[..len].copy_from_slice(&bytes[..len]);
    let value = i64::from_le_bytes(buf);
    match len {
        0 | 8 => value,
        // sign extend
        len => {
            let shift = 64 - len * 8;
            (value << shift) >> shift
        }
    }
}

/// Helper trait to [`Display`][std::fmt::Display] bytes.
pub trait FmtExt {
    /// Lossy [`Display`][std::fmt::Display] bytes.
    fn lossy(&self) -> LossyFmt<'_>;
}

/// Lossy [`Display`][std::fmt::Display] implementation for bytes.
pub struct LossyFmt<'a>(pub &'a [u8]);

impl UsizeExt for usize {
    fn to_u32(self) -> u32 {
        self.try_into().expect("message size too large for protocol")
    }

    fn to_u16(self) -> u16 {
        self.try_into().expect("message size too large for protocol")
    }

    fn to_u8(self) -> u8 {
        self.try_into().expect("parameter too large for protocol")
    }
}

impl<B: BufMut> BufMutExt for B {
    fn put_xdr_bytes(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len().to_u32());
        self.put_slice(bytes);
        self.put_xdr_pad(bytes.len());
    }

    fn put_xdr_str(&mut self, string: &str) {
        self.put_xdr_bytes(string.as_bytes());
    }

    fn put_xdr_pad(&mut self, len: usize) {
        self.put_bytes(0, xdr_pad(len));
    }
}

impl BytesExt for Bytes {
    fn get_xdr_u32(&mut self) -> Result<u32, ProtocolError> {
        if self.remaining() < 4 {
            return Err(ProtocolError::malformed("buffer too short for word"));
        }
        Ok(self.get_u32())
    }

    fn get_exact(&mut self, len: usize) -> Result<Bytes, ProtocolError> {
        if self.remaining() < len {
            return Err(ProtocolError::malformed("buffer shorter than declared length"));
        }
        Ok(self.split_to(len))
    }

    fn get_aligned(&mut self, len: usize) -> Result<Bytes, ProtocolError> {
        let value = self.get_exact(len)?;
        let pad = xdr_pad(len).min(self.remaining());
        self.advance(pad);
        Ok(value)
    }

    fn get_le_bytes(&mut self) -> Result<Bytes, ProtocolError> {
        if self.remaining() < 2 {
            return Err(ProtocolError::malformed("buffer too short for length"));
        }
        let len = self.get_u16_le() as usize;
        self.get_exact(len)
    }
}

impl FmtExt for [u8] {
    fn lossy(&self) -> LossyFmt<'_> {
        LossyFmt(self)
    }
}

impl std::fmt::Display for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn xdr_padding() {
        assert_eq!(xdr_pad(0), 0);
        assert_eq!(xdr_pad(1), 3);
        assert_eq!(xdr_pad(2), 2);
        assert_eq!(xdr_pad(3), 1);
        assert_eq!(xdr_pad(4), 0);
    }

    #[test]
    fn xdr_bytes_layout() {
        let mut buf = BytesMut::new();
        buf.put_xdr_str("abcde");
        assert_eq!(&buf[..], b"\0\0\0\x05abcde\0\0\0");

        let mut buf = BytesMut::new();
        buf.put_xdr_bytes(b"");
        assert_eq!(&buf[..], b"\0\0\0\0");
    }

    #[test]
    fn xdr_bytes_consumes_padding() {
        let mut buf = BytesMut::new();
        buf.put_xdr_str("SYSDBA");
        buf.put_u32(0xCAFE);

        let mut bytes = buf.freeze();
        assert_eq!(&bytes.get_xdr_bytes().unwrap()[..], b"SYSDBA");
        assert_eq!(bytes.get_xdr_u32().unwrap(), 0xCAFE);
        assert!(bytes.is_empty());
    }

    #[test]
    fn short_buffer_is_malformed() {
        let mut bytes = Bytes::from_static(b"\0\0\0\x09abc");
        assert!(bytes.get_xdr_bytes().is_err());
        let mut bytes = Bytes::from_static(b"\0\0");
        assert!(bytes.get_xdr_u32().is_err());
    }

    #[test]
    fn little_endian_int() {
        assert_eq!(le_int(&[0x01]), 1);
        assert_eq!(le_int(&[0xff]), -1);
        assert_eq!(le_int(&[0x00, 0x01]), 256);
        assert_eq!(le_int(&[0xfe, 0xff, 0xff, 0xff]), -2);
        assert_eq!(le_int(&[0x15, 0, 0, 0]), 21);
        assert_eq!(le_int(&[]), 0);
    }
}
