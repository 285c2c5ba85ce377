//! QUIC packet number encoding and decoding (RFC 9000 section 17.1, A.2, A.3).

use crate::error::Error;
use crate::varint::MAX_VARINT;

/// A full packet number, `0..=2^62-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketNumber(u64);

impl PacketNumber {
    pub const ZERO: PacketNumber = PacketNumber(0);

    pub fn new(value: u64) -> Result<Self, Error> {
        if value > MAX_VARINT {
            return Err(Error::Format);
        }
        Ok(Self(value))
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// The following packet number, if one exists.
    pub fn next(self) -> Option<Self> {
        Self::new(self.0 + 1).ok()
    }

    /// Bytes needed on the wire given the largest acknowledged packet
    /// number in this space.
    ///
    /// Chooses the smallest encoding whose half-window covers the distance
    /// from `largest_acked`, as RFC 9000 section A.2 recommends.
    pub fn encoded_len(self, largest_acked: Option<PacketNumber>) -> usize {
        let num_unacked = match largest_acked {
            Some(acked) if self.0 > acked.0 => self.0 - acked.0,
            Some(_) => 1,
            None => self.0 + 1,
        };
        if num_unacked < (1 << 7) {
            1
        } else if num_unacked < (1 << 15) {
            2
        } else if num_unacked < (1 << 23) {
            3
        } else {
            4
        }
    }

    /// Write the low `len` bytes (1-4) in big-endian order.
    pub fn write_truncated(self, len: usize, buf: &mut [u8]) -> Result<(), Error> {
        if !(1..=4).contains(&len) {
            return Err(Error::Format);
        }
        if buf.len() < len {
            return Err(Error::BufferTooSmall { needed: len });
        }
        buf[..len].copy_from_slice(&self.0.to_be_bytes()[8 - len..]);
        Ok(())
    }

    /// Reconstruct a packet number from its `pn_len`-byte truncation and
    /// the largest packet number successfully processed in this space.
    ///
    /// Implements the algorithm from RFC 9000 section A.3.
    pub fn decode(truncated: u32, pn_len: usize, largest_pn: Option<PacketNumber>) -> Self {
        let pn_nbits = (pn_len as u64) * 8;
        let pn_win = 1u64 << pn_nbits;
        let pn_hwin = pn_win / 2;
        let pn_mask = pn_win - 1;

        let expected_pn = largest_pn.map_or(0, |pn| pn.0 + 1);

        // Replace the lower bits of expected_pn with the truncated value.
        let candidate_pn = (expected_pn & !pn_mask) | u64::from(truncated);

        let value = if candidate_pn + pn_hwin <= expected_pn && candidate_pn + pn_win <= (1u64 << 62)
        {
            candidate_pn + pn_win
        } else if candidate_pn > expected_pn + pn_hwin && candidate_pn >= pn_win {
            candidate_pn - pn_win
        } else {
            candidate_pn
        };
        Self(value.min(MAX_VARINT))
    }
}

impl TryFrom<u64> for PacketNumber {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self, Error> {
        Self::new(value)
    }
}
