//! Applying and removing packet protection (RFC 9001 §5.3, §5.4).
//!
//! Write order: seal the payload with the unprotected header as AAD, then
//! sample the ciphertext and mask the header. Read order is the reverse:
//! unmask the header assuming a 4-byte packet number, learn the real
//! length, rebuild the AAD and open.

use crate::crypto::header_protection::{SAMPLE_LEN, SAMPLE_OFFSET};
use crate::crypto::Aead;
use crate::error::{Error, TransportError};
use crate::packet::number::PacketNumber;

/// Reserved bits of the first byte that must be zero once unprotected.
const LONG_RESERVED_BITS: u8 = 0x0c;
const SHORT_RESERVED_BITS: u8 = 0x18;

/// Smallest `pn_len + payload_len` that leaves room for a full sample.
pub(crate) const MIN_PN_AND_PAYLOAD: usize = SAMPLE_OFFSET;

/// A packet with protection removed.
pub(crate) struct Unprotected {
    pub first_byte: u8,
    pub packet_number: PacketNumber,
    pub payload: Vec<u8>,
}

fn sample_at(packet: &[u8], pn_offset: usize) -> Result<[u8; SAMPLE_LEN], Error> {
    let start = pn_offset + SAMPLE_OFFSET;
    let bytes = packet.get(start..start + SAMPLE_LEN).ok_or(Error::Format)?;
    let mut sample = [0u8; SAMPLE_LEN];
    sample.copy_from_slice(bytes);
    Ok(sample)
}

fn header_window(packet: &[u8], pn_offset: usize) -> Result<[u8; 5], Error> {
    let pn_bytes = packet.get(pn_offset..pn_offset + 4).ok_or(Error::Format)?;
    let mut header = [0u8; 5];
    header[0] = packet[0];
    header[1..].copy_from_slice(pn_bytes);
    Ok(header)
}

/// Seal `payload` after `header` (which ends with the raw packet number
/// starting at `pn_offset`) and apply header protection last.
pub(crate) fn protect(
    mut header: Vec<u8>,
    pn_offset: usize,
    packet_number: PacketNumber,
    payload: &[u8],
    aead: &Aead,
    is_short_header: bool,
) -> Result<Vec<u8>, Error> {
    let pn_len = header.len() - pn_offset;
    let sealed = aead.seal(payload, packet_number, &header)?;
    header.extend_from_slice(&sealed);
    let mut packet = header;

    let sample = sample_at(&packet, pn_offset)?;
    let masked = aead.encrypt_header(&sample, &header_window(&packet, pn_offset)?, is_short_header)?;
    packet[0] = masked[0];
    packet[pn_offset..pn_offset + pn_len].copy_from_slice(&masked[1..1 + pn_len]);
    Ok(packet)
}

/// Remove header protection and open the payload of one packet.
///
/// `packet` spans exactly one packet; `pn_offset` is where its protected
/// packet number starts.
pub(crate) fn unprotect(
    packet: &[u8],
    pn_offset: usize,
    aead: &Aead,
    largest_pn: Option<PacketNumber>,
    is_short_header: bool,
) -> Result<Unprotected, Error> {
    let sample = sample_at(packet, pn_offset)?;
    let header = aead.decrypt_header(&sample, &header_window(packet, pn_offset)?, is_short_header)?;

    let first_byte = header[0];
    let pn_len = usize::from(first_byte & 0x03) + 1;
    let truncated = header[1..1 + pn_len]
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
    let packet_number = PacketNumber::decode(truncated, pn_len, largest_pn);

    let mut aad = packet[..pn_offset + pn_len].to_vec();
    aad[0] = first_byte;
    aad[pn_offset..].copy_from_slice(&header[1..1 + pn_len]);

    let payload = aead.open(&packet[pn_offset + pn_len..], packet_number, &aad)?;

    // Only meaningful once the packet has been authenticated (RFC 9000 §17.2).
    let reserved = if is_short_header {
        SHORT_RESERVED_BITS
    } else {
        LONG_RESERVED_BITS
    };
    if first_byte & reserved != 0 {
        return Err(Error::Transport(TransportError::ProtocolViolation));
    }

    Ok(Unprotected {
        first_byte,
        packet_number,
        payload,
    })
}
