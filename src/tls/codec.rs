//! Byte-level helpers shared by the TLS message and extension codecs.
//!
//! TLS vectors are length-prefixed with 1, 2 or 3 big-endian bytes. The
//! reader hands out sub-readers bounded by such a prefix; writers reserve
//! the prefix, write the body and patch the length in afterwards.

use crate::error::{Error, HandshakeError};

const DECODE: Error = Error::Handshake(HandshakeError::Decode);

/// Cursor over a TLS structure. Every read past the end is a decode error.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let end = self.pos.checked_add(n).ok_or(DECODE)?;
        let out = self.data.get(self.pos..end).ok_or(DECODE)?;
        self.pos = end;
        Ok(out)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn u24(&mut self) -> Result<usize, Error> {
        let b = self.bytes(3)?;
        Ok((usize::from(b[0]) << 16) | (usize::from(b[1]) << 8) | usize::from(b[2]))
    }

    /// Bytes of a vector with a 1-byte length prefix.
    pub fn vec8(&mut self) -> Result<&'a [u8], Error> {
        let len = usize::from(self.u8()?);
        self.bytes(len)
    }

    /// Bytes of a vector with a 2-byte length prefix.
    pub fn vec16(&mut self) -> Result<&'a [u8], Error> {
        let len = usize::from(self.u16()?);
        self.bytes(len)
    }

    /// Bytes of a vector with a 3-byte length prefix.
    pub fn vec24(&mut self) -> Result<&'a [u8], Error> {
        let len = self.u24()?;
        self.bytes(len)
    }

    /// Fail unless every byte was consumed.
    pub fn finish(&self) -> Result<(), Error> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DECODE)
        }
    }
}

pub fn put_u16(out: &mut Vec<u8>, val: u16) {
    out.extend_from_slice(&val.to_be_bytes());
}

pub fn put_u24(out: &mut Vec<u8>, val: usize) -> Result<(), Error> {
    if val >= 1 << 24 {
        return Err(Error::Format);
    }
    out.extend_from_slice(&(val as u32).to_be_bytes()[1..]);
    Ok(())
}

/// Write a vector with a `prefix_len`-byte length prefix; `body` appends
/// the contents.
fn put_prefixed(
    out: &mut Vec<u8>,
    prefix_len: usize,
    body: impl FnOnce(&mut Vec<u8>) -> Result<(), Error>,
) -> Result<(), Error> {
    let start = out.len();
    out.resize(start + prefix_len, 0);
    body(out)?;
    let len = out.len() - start - prefix_len;
    if len >> (8 * prefix_len) != 0 {
        return Err(Error::Format);
    }
    let be = (len as u32).to_be_bytes();
    out[start..start + prefix_len].copy_from_slice(&be[4 - prefix_len..]);
    Ok(())
}

pub fn put_vec8(
    out: &mut Vec<u8>,
    body: impl FnOnce(&mut Vec<u8>) -> Result<(), Error>,
) -> Result<(), Error> {
    put_prefixed(out, 1, body)
}

pub fn put_vec16(
    out: &mut Vec<u8>,
    body: impl FnOnce(&mut Vec<u8>) -> Result<(), Error>,
) -> Result<(), Error> {
    put_prefixed(out, 2, body)
}

pub fn put_vec24(
    out: &mut Vec<u8>,
    body: impl FnOnce(&mut Vec<u8>) -> Result<(), Error>,
) -> Result<(), Error> {
    put_prefixed(out, 3, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_reads_vectors() {
        let data = [0x02, 0xaa, 0xbb, 0x00, 0x01, 0xcc, 0x00, 0x00, 0x01, 0xdd, 0x12, 0x34];
        let mut r = Reader::new(&data);
        assert_eq!(r.vec8().unwrap(), &[0xaa, 0xbb]);
        assert_eq!(r.vec16().unwrap(), &[0xcc]);
        assert_eq!(r.vec24().unwrap(), &[0xdd]);
        assert!(r.finish().is_err());
        assert_eq!(r.u16().unwrap(), 0x1234);
        r.finish().unwrap();
        assert_eq!(r.u8(), Err(DECODE));
    }

    #[test]
    fn reader_rejects_overlong_prefix() {
        let mut r = Reader::new(&[0x05, 1, 2]);
        assert_eq!(r.vec8(), Err(DECODE));
    }

    #[test]
    fn prefixed_writers_patch_length() {
        let mut out = Vec::new();
        put_vec16(&mut out, |out| {
            out.extend_from_slice(&[1, 2, 3]);
            put_vec8(out, |out| {
                out.push(9);
                Ok(())
            })
        })
        .unwrap();
        assert_eq!(out, [0x00, 0x05, 1, 2, 3, 0x01, 9]);

        let mut out = Vec::new();
        put_vec24(&mut out, |out| {
            out.resize(out.len() + 300, 0);
            Ok(())
        })
        .unwrap();
        assert_eq!(&out[..3], &[0x00, 0x01, 0x2c]);
    }

    #[test]
    fn vec8_overflow_is_rejected() {
        let mut out = Vec::new();
        let result = put_vec8(&mut out, |out| {
            out.resize(out.len() + 256, 0);
            Ok(())
        });
        assert_eq!(result, Err(Error::Format));
    }
}
