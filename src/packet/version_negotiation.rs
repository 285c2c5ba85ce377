//! Version Negotiation packets (RFC 9000 §17.2.1).
//!
//! Only the wire shape lives here: zero version, both connection IDs and a
//! list of 32-bit versions. No packet number, no protection.

use crate::error::Error;
use crate::packet::long_header::{write_envelope, LongEnvelope};
use crate::packet::{VersionNegotiationPacket, LONG_FORM_BIT};

impl VersionNegotiationPacket {
    pub fn write(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(7 + self.dcid.len() + self.scid.len() + 4 * self.supported_versions.len());
        write_envelope(
            LONG_FORM_BIT | (self.unused_bits & 0x7f),
            0,
            &self.dcid,
            &self.scid,
            &mut out,
        );
        for version in &self.supported_versions {
            out.extend_from_slice(&version.to_be_bytes());
        }
        out
    }
}

/// Parse the version list, which runs to the end of the datagram.
pub(crate) fn parse_version_negotiation(
    datagram: &[u8],
    envelope: LongEnvelope,
) -> Result<VersionNegotiationPacket, Error> {
    let list = &datagram[envelope.len..];
    if list.is_empty() || list.len() % 4 != 0 {
        return Err(Error::Format);
    }
    let supported_versions = list
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(VersionNegotiationPacket {
        dcid: envelope.dcid,
        scid: envelope.scid,
        unused_bits: envelope.first_byte & 0x7f,
        supported_versions,
    })
}
