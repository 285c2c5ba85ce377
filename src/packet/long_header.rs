//! Long header packets (RFC 9000 section 17.2): the shared envelope plus
//! Initial and Handshake encoding and first-phase parsing.

use tracing::trace;

use crate::crypto::rustcrypto::TAG_LEN;
use crate::crypto::Aead;
use crate::error::{Error, TransportError};
use crate::packet::connection_id::ConnectionId;
use crate::packet::half_parsed::{HalfParsedPacket, PacketKind};
use crate::packet::number::PacketNumber;
use crate::packet::payload::Payload;
use crate::packet::protection::{self, MIN_PN_AND_PAYLOAD};
use crate::packet::{HandshakePacket, InitialPacket, LongPacketType, FIXED_BIT, LONG_FORM_BIT};
use crate::varint::{decode_varint, put_varint};
use crate::version::Version;

/// First byte, version and both connection IDs of a long header.
#[derive(Debug)]
pub(crate) struct LongEnvelope {
    pub first_byte: u8,
    pub version: u32,
    pub dcid: ConnectionId,
    pub scid: ConnectionId,
    /// Bytes consumed through the end of the SCID.
    pub len: usize,
}

impl LongEnvelope {
    pub fn packet_type(&self) -> LongPacketType {
        LongPacketType::from_bits(self.first_byte >> 4)
    }
}

/// Parse the version-independent part of a long header.
pub(crate) fn read_envelope(buf: &[u8]) -> Result<LongEnvelope, Error> {
    // 1 (first byte) + 4 (version) + 1 (dcid len) + 1 (scid len)
    if buf.len() < 7 {
        return Err(Error::Format);
    }
    let first_byte = buf[0];
    if first_byte & LONG_FORM_BIT == 0 {
        return Err(Error::Format);
    }
    let version = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);

    let mut pos = 5;
    let (dcid, n) = ConnectionId::read_prefixed(&buf[pos..])?;
    pos += n;
    let (scid, n) = ConnectionId::read_prefixed(&buf[pos..])?;
    pos += n;

    Ok(LongEnvelope {
        first_byte,
        version,
        dcid,
        scid,
        len: pos,
    })
}

/// Append first byte, version and both connection IDs.
pub(crate) fn write_envelope(
    first_byte: u8,
    version: u32,
    dcid: &ConnectionId,
    scid: &ConnectionId,
    out: &mut Vec<u8>,
) {
    out.push(first_byte);
    out.extend_from_slice(&version.to_be_bytes());
    dcid.write_prefixed(out);
    scid.write_prefixed(out);
}

struct LongFields<'a> {
    packet_type: LongPacketType,
    version: Version,
    dcid: &'a ConnectionId,
    scid: &'a ConnectionId,
    token: Option<&'a [u8]>,
    packet_number: PacketNumber,
    payload: &'a Payload,
}

fn write_protected_long(
    fields: LongFields<'_>,
    aead: &Aead,
    largest_acked: Option<PacketNumber>,
) -> Result<Vec<u8>, Error> {
    let pn_len = fields.packet_number.encoded_len(largest_acked);

    let mut plaintext = fields.payload.clone();
    plaintext.pad_to(MIN_PN_AND_PAYLOAD.saturating_sub(pn_len));

    let first_byte =
        LONG_FORM_BIT | FIXED_BIT | (fields.packet_type.bits() << 4) | (pn_len as u8 - 1);

    let mut out = Vec::with_capacity(64 + plaintext.len() + TAG_LEN);
    write_envelope(
        first_byte,
        fields.version.to_wire(),
        fields.dcid,
        fields.scid,
        &mut out,
    );
    if let Some(token) = fields.token {
        put_varint(token.len() as u64, &mut out)?;
        out.extend_from_slice(token);
    }
    put_varint((pn_len + plaintext.len() + TAG_LEN) as u64, &mut out)?;

    let pn_offset = out.len();
    out.resize(pn_offset + pn_len, 0);
    fields
        .packet_number
        .write_truncated(pn_len, &mut out[pn_offset..])?;

    trace!(
        packet_type = ?fields.packet_type,
        pn = fields.packet_number.value(),
        pn_len,
        payload_len = plaintext.len(),
        "sealing long header packet"
    );
    protection::protect(
        out,
        pn_offset,
        fields.packet_number,
        plaintext.as_bytes(),
        aead,
        false,
    )
}

impl InitialPacket {
    /// Serialize and protect. Payloads too short to be sampled are padded
    /// with PADDING frames.
    pub fn write(&self, aead: &Aead, largest_acked: Option<PacketNumber>) -> Result<Vec<u8>, Error> {
        write_protected_long(
            LongFields {
                packet_type: LongPacketType::Initial,
                version: self.version,
                dcid: &self.dcid,
                scid: &self.scid,
                token: Some(&self.token),
                packet_number: self.packet_number,
                payload: &self.payload,
            },
            aead,
            largest_acked,
        )
    }
}

impl HandshakePacket {
    /// Serialize and protect. Payloads too short to be sampled are padded
    /// with PADDING frames.
    pub fn write(&self, aead: &Aead, largest_acked: Option<PacketNumber>) -> Result<Vec<u8>, Error> {
        write_protected_long(
            LongFields {
                packet_type: LongPacketType::Handshake,
                version: self.version,
                dcid: &self.dcid,
                scid: &self.scid,
                token: None,
                packet_number: self.packet_number,
                payload: &self.payload,
            },
            aead,
            largest_acked,
        )
    }
}

/// Phase 1 for Initial and Handshake packets: read everything up to the
/// protected packet number and capture the packet's bytes.
///
/// Returns the half-parsed packet and the bytes it occupies in `datagram`.
pub(crate) fn parse_protected_long(
    datagram: &[u8],
    envelope: LongEnvelope,
    version: Version,
) -> Result<(HalfParsedPacket, usize), Error> {
    if envelope.first_byte & FIXED_BIT == 0 {
        return Err(Error::Transport(TransportError::ProtocolViolation));
    }

    let mut pos = envelope.len;
    let kind = match envelope.packet_type() {
        LongPacketType::Initial => {
            let (token_len, n) = decode_varint(&datagram[pos..])?;
            pos += n;
            let token_len = usize::try_from(token_len).map_err(|_| Error::Format)?;
            let token = datagram
                .get(pos..pos.saturating_add(token_len))
                .ok_or(Error::Format)?
                .to_vec();
            pos += token_len;
            PacketKind::Initial { token }
        }
        LongPacketType::Handshake => PacketKind::Handshake,
        LongPacketType::ZeroRtt | LongPacketType::Retry => return Err(Error::UnsupportedPacket),
    };

    let (length, n) = decode_varint(&datagram[pos..])?;
    pos += n;
    let pn_offset = pos;
    let end = usize::try_from(length)
        .ok()
        .and_then(|length| pn_offset.checked_add(length))
        .filter(|&end| end <= datagram.len())
        .ok_or(Error::Format)?;

    trace!(?kind, version = ?version, len = end, "parsed long header");
    let half = HalfParsedPacket::new(
        kind,
        Some(version),
        envelope.dcid,
        Some(envelope.scid),
        datagram[..end].to_vec(),
        pn_offset,
    );
    Ok((half, end))
}
