//! Iterator over coalesced QUIC packets in a single UDP datagram.

use crate::error::Error;
use crate::packet::half_parsed::{parse, ParsedPacket};

/// Iterator over coalesced packets in a single UDP datagram.
///
/// Multiple QUIC packets can be coalesced into a single UDP datagram.
/// Long header packets use the Length field to determine packet boundaries.
/// A short header packet must be the last packet in the datagram (it consumes
/// the rest of the buffer). Iteration stops after the first error, since
/// the boundary of anything that follows is unknown.
pub struct CoalescedPackets<'a> {
    buf: &'a [u8],
    offset: usize,
    short_dcid_len: usize,
}

impl<'a> CoalescedPackets<'a> {
    pub fn new(datagram: &'a [u8], short_dcid_len: usize) -> Self {
        CoalescedPackets {
            buf: datagram,
            offset: 0,
            short_dcid_len,
        }
    }
}

impl Iterator for CoalescedPackets<'_> {
    type Item = Result<ParsedPacket, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = &self.buf[self.offset..];
        if remaining.is_empty() {
            return None;
        }
        // Senders may pad a datagram with zero bytes after the last packet.
        if remaining.iter().all(|&b| b == 0) {
            self.offset = self.buf.len();
            return None;
        }

        match parse(remaining, self.short_dcid_len) {
            Ok((packet, consumed)) => {
                self.offset += consumed;
                Some(Ok(packet))
            }
            Err(e) => {
                self.offset = self.buf.len();
                Some(Err(e))
            }
        }
    }
}
