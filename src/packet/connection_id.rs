//! Connection IDs (RFC 9000 §5.1).

use heapless::Vec as HVec;
use rand_core::CryptoRngCore;

use crate::error::Error;

/// Maximum connection ID length in QUIC v1.
pub const MAX_CID_LEN: usize = 20;

/// An opaque 0-20 byte connection identifier.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct ConnectionId(HVec<u8, MAX_CID_LEN>);

impl ConnectionId {
    pub const EMPTY: ConnectionId = ConnectionId(HVec::new());

    /// Fails with [`Error::Format`] when `bytes` is longer than 20.
    pub fn new(bytes: &[u8]) -> Result<Self, Error> {
        HVec::from_slice(bytes).map(Self).map_err(|_| Error::Format)
    }

    /// A fresh random connection ID of `len` bytes.
    pub fn random<R: CryptoRngCore>(rng: &mut R, len: usize) -> Result<Self, Error> {
        let mut bytes = [0u8; MAX_CID_LEN];
        let buf = bytes.get_mut(..len).ok_or(Error::Format)?;
        rng.fill_bytes(buf);
        Self::new(buf)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append the length-prefixed form used in long headers.
    pub(crate) fn write_prefixed(&self, out: &mut Vec<u8>) {
        out.push(self.0.len() as u8);
        out.extend_from_slice(&self.0);
    }

    /// Read a length-prefixed connection ID; returns it and the bytes consumed.
    pub(crate) fn read_prefixed(buf: &[u8]) -> Result<(Self, usize), Error> {
        let len = usize::from(*buf.first().ok_or(Error::Format)?);
        let bytes = buf.get(1..1 + len).ok_or(Error::Format)?;
        Ok((Self::new(bytes)?, 1 + len))
    }
}

impl core::ops::Deref for ConnectionId {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("ConnectionId(")?;
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        f.write_str(")")
    }
}
