//! Short header (1-RTT) packets (RFC 9000 section 17.3).

use tracing::trace;

use crate::crypto::Aead;
use crate::error::{Error, TransportError};
use crate::packet::connection_id::ConnectionId;
use crate::packet::half_parsed::{HalfParsedPacket, PacketKind};
use crate::packet::number::PacketNumber;
use crate::packet::protection::{self, MIN_PN_AND_PAYLOAD};
use crate::packet::{ShortPacket, FIXED_BIT, LONG_FORM_BIT};

const SPIN_BIT: u8 = 0x20;
const KEY_PHASE_BIT: u8 = 0x04;

impl ShortPacket {
    /// Serialize and protect. Payloads too short to be sampled are padded
    /// with PADDING frames.
    pub fn write(&self, aead: &Aead, largest_acked: Option<PacketNumber>) -> Result<Vec<u8>, Error> {
        let pn_len = self.packet_number.encoded_len(largest_acked);

        let mut plaintext = self.payload.clone();
        plaintext.pad_to(MIN_PN_AND_PAYLOAD.saturating_sub(pn_len));

        let mut first_byte = FIXED_BIT | (pn_len as u8 - 1);
        if self.spin {
            first_byte |= SPIN_BIT;
        }
        if self.key_phase {
            first_byte |= KEY_PHASE_BIT;
        }

        let mut out = Vec::with_capacity(1 + self.dcid.len() + pn_len + plaintext.len() + 16);
        out.push(first_byte);
        out.extend_from_slice(&self.dcid);
        let pn_offset = out.len();
        out.resize(pn_offset + pn_len, 0);
        self.packet_number
            .write_truncated(pn_len, &mut out[pn_offset..])?;

        trace!(
            pn = self.packet_number.value(),
            pn_len,
            key_phase = self.key_phase,
            "sealing short header packet"
        );
        protection::protect(
            out,
            pn_offset,
            self.packet_number,
            plaintext.as_bytes(),
            aead,
            true,
        )
    }

    /// Rebuild the packet from unprotected parts; `first_byte` carries the
    /// spin and key phase bits.
    pub(crate) fn from_parts(
        dcid: ConnectionId,
        first_byte: u8,
        packet_number: PacketNumber,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            dcid,
            spin: first_byte & SPIN_BIT != 0,
            key_phase: first_byte & KEY_PHASE_BIT != 0,
            packet_number,
            payload: payload.into(),
        }
    }
}

/// Phase 1 for a short header packet. The DCID length is not on the wire;
/// the caller knows it from connection state. The packet consumes the rest
/// of the datagram.
pub(crate) fn parse_short(
    datagram: &[u8],
    dcid_len: usize,
) -> Result<(HalfParsedPacket, usize), Error> {
    let first_byte = *datagram.first().ok_or(Error::Format)?;
    if first_byte & LONG_FORM_BIT != 0 {
        return Err(Error::Format);
    }
    if first_byte & FIXED_BIT == 0 {
        return Err(Error::Transport(TransportError::ProtocolViolation));
    }
    let dcid = datagram.get(1..1 + dcid_len).ok_or(Error::Format)?;
    let dcid = ConnectionId::new(dcid)?;

    trace!(len = datagram.len(), "parsed short header");
    let half = HalfParsedPacket::new(
        PacketKind::Short,
        None,
        dcid,
        None,
        datagram.to_vec(),
        1 + dcid_len,
    );
    Ok((half, datagram.len()))
}
