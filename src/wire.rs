//! A read/write-positioned byte buffer with the typed codecs the transport needs.
//!
//! This is the component RFC 4251 §5 calls "data type encoding": big-endian
//! fixed-width integers, length-prefixed strings and the two's-complement
//! `mpint`. Everything downstream of the [`crate::codec::Codec`] operates on
//! top of [`Wire`] rather than raw `Vec<u8>` splicing.

use crate::error::{Error, Result};

/// An expandable byte buffer with an independent read and write cursor.
#[derive(Debug, Default, Clone)]
pub struct Wire {
    buf: Vec<u8>,
    rpos: usize,
    wpos: usize,
}

impl Wire {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing byte vector as a fully-readable buffer.
    pub fn from_vec(buf: Vec<u8>) -> Self {
        let wpos = buf.len();
        Self { buf, rpos: 0, wpos }
    }

    /// Bytes available to read (`wpos - rpos`).
    pub fn available(&self) -> usize {
        self.wpos - self.rpos
    }

    /// The full backing slice, from `0` to the write position.
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.wpos]
    }

    /// The not-yet-read remainder.
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.rpos..self.wpos]
    }

    /// Drop everything already read and rebase the cursors to zero.
    pub fn compact(&mut self) {
        self.buf.drain(..self.rpos);
        self.wpos -= self.rpos;
        self.rpos = 0;
    }

    /// Reset both cursors and clear the buffer, keeping its allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.rpos = 0;
        self.wpos = 0;
    }

    fn ensure_readable(&self, len: usize) -> Result<()> {
        if self.available() < len {
            Err(Error::Protocol("buffer underflow"))
        } else {
            Ok(())
        }
    }

    /// Read `len` raw bytes.
    pub fn get_bytes(&mut self, len: usize) -> Result<&[u8]> {
        self.ensure_readable(len)?;

        let start = self.rpos;
        self.rpos += len;

        Ok(&self.buf[start..self.rpos])
    }

    /// Read a single byte.
    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.get_bytes(1)?[0])
    }

    /// Read a big-endian `u32`.
    pub fn get_u32(&mut self) -> Result<u32> {
        let bytes = self.get_bytes(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().expect("4 bytes")))
    }

    /// Read a big-endian `u64`.
    pub fn get_u64(&mut self) -> Result<u64> {
        let bytes = self.get_bytes(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().expect("8 bytes")))
    }

    /// Read a boolean (any nonzero byte is `true`, per RFC 4251 §5).
    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.get_u8()? != 0)
    }

    /// Read a `uint32`-length-prefixed byte string.
    pub fn get_string(&mut self) -> Result<Vec<u8>> {
        let len = self.get_u32()? as usize;
        Ok(self.get_bytes(len)?.to_vec())
    }

    /// Read an `mpint` (RFC 4251 §5) as its unsigned magnitude, dropping any
    /// RFC-mandated leading zero byte used to keep a positive number's sign
    /// bit clear.
    pub fn get_mpint(&mut self) -> Result<Vec<u8>> {
        let bytes = self.get_string()?;

        Ok(match bytes.first() {
            Some(0) => bytes[1..].to_vec(),
            _ => bytes,
        })
    }

    fn ensure_capacity(&mut self, additional: usize) {
        if self.buf.len() < self.wpos + additional {
            self.buf.resize(self.wpos + additional, 0);
        }
    }

    /// Append raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.ensure_capacity(bytes.len());
        self.buf[self.wpos..self.wpos + bytes.len()].copy_from_slice(bytes);
        self.wpos += bytes.len();

        self
    }

    /// Append a single byte.
    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.put_bytes(&[value])
    }

    /// Append a big-endian `u32`.
    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Append a big-endian `u64`.
    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Append a boolean as a single `0`/`1` byte.
    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.put_u8(value as u8)
    }

    /// Append a `uint32`-length-prefixed byte string.
    pub fn put_string(&mut self, bytes: &[u8]) -> &mut Self {
        self.put_u32(bytes.len() as u32);
        self.put_bytes(bytes)
    }

    /// Append an `mpint`, prefixing a zero byte when the magnitude's high bit
    /// is set so it is not misread as a negative number.
    pub fn put_mpint(&mut self, magnitude: &[u8]) -> &mut Self {
        let leading_zeros = magnitude.iter().take_while(|&&b| b == 0).count();
        let trimmed = &magnitude[leading_zeros..];

        if trimmed.first().is_some_and(|&b| b & 0x80 != 0) {
            self.put_u32(trimmed.len() as u32 + 1);
            self.put_u8(0);
            self.put_bytes(trimmed)
        } else {
            self.put_string(trimmed)
        }
    }
}
