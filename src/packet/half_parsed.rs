//! Two-phase packet parsing.
//!
//! Phase 1 ([`parse`]) reads whatever a packet exposes without keys. For
//! Initial, Handshake and Short packets that stops at the protected packet
//! number and yields a [`HalfParsedPacket`] that owns the packet's bytes.
//! Phase 2 ([`HalfParsedPacket::complete`]) needs the AEAD of the packet's
//! level, which depends on connection state the codec does not own.

use tracing::debug;

use crate::crypto::{Aead, AeadProvider, EncryptionLevel};
use crate::error::Error;
use crate::packet::connection_id::ConnectionId;
use crate::packet::long_header::{parse_protected_long, read_envelope};
use crate::packet::number::PacketNumber;
use crate::packet::protection;
use crate::packet::retry::parse_retry;
use crate::packet::short_header::parse_short;
use crate::packet::version_negotiation::parse_version_negotiation;
use crate::packet::{
    HandshakePacket, InitialPacket, LongPacketType, Packet, RetryPacket, ShortPacket,
    VersionNegotiationPacket, LONG_FORM_BIT,
};
use crate::version::Version;

/// Which protected packet a [`HalfParsedPacket`] holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketKind {
    Initial { token: Vec<u8> },
    Handshake,
    Short,
}

/// A protected packet whose header protection and payload protection are
/// still in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalfParsedPacket {
    kind: PacketKind,
    version: Option<Version>,
    dcid: ConnectionId,
    scid: Option<ConnectionId>,
    bytes: Vec<u8>,
    pn_offset: usize,
}

impl HalfParsedPacket {
    pub(crate) fn new(
        kind: PacketKind,
        version: Option<Version>,
        dcid: ConnectionId,
        scid: Option<ConnectionId>,
        bytes: Vec<u8>,
        pn_offset: usize,
    ) -> Self {
        Self {
            kind,
            version,
            dcid,
            scid,
            bytes,
            pn_offset,
        }
    }

    pub fn kind(&self) -> &PacketKind {
        &self.kind
    }

    /// `None` for short header packets, which carry no version.
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    pub fn dcid(&self) -> &ConnectionId {
        &self.dcid
    }

    pub fn scid(&self) -> Option<&ConnectionId> {
        self.scid.as_ref()
    }

    /// The Initial token; `None` for other packet types.
    pub fn token(&self) -> Option<&[u8]> {
        match &self.kind {
            PacketKind::Initial { token } => Some(token),
            _ => None,
        }
    }

    /// The encryption level whose keys `complete` needs.
    pub fn level(&self) -> EncryptionLevel {
        match self.kind {
            PacketKind::Initial { .. } => EncryptionLevel::Initial,
            PacketKind::Handshake => EncryptionLevel::Handshake,
            PacketKind::Short => EncryptionLevel::OneRtt,
        }
    }

    /// Protected bytes of this packet, exactly as received.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Remove header protection, reconstruct the packet number against
    /// `largest_pn` (the largest packet number processed in this space) and
    /// open the payload.
    ///
    /// Failures concern this packet only: [`Error::Format`] when it is too
    /// short to sample, [`Error::Authentication`] when the tag does not
    /// verify, `ProtocolViolation` when reserved bits are set.
    pub fn complete(self, aead: &Aead, largest_pn: Option<PacketNumber>) -> Result<Packet, Error> {
        let is_short = self.kind == PacketKind::Short;
        let unprotected =
            match protection::unprotect(&self.bytes, self.pn_offset, aead, largest_pn, is_short) {
                Ok(u) => u,
                Err(e) => {
                    debug!(level = ?self.level(), error = %e, "dropping packet");
                    return Err(e);
                }
            };

        let Self {
            kind,
            version,
            dcid,
            scid,
            ..
        } = self;
        Ok(match (kind, version, scid) {
            (PacketKind::Initial { token }, Some(version), Some(scid)) => {
                Packet::Initial(InitialPacket {
                    version,
                    dcid,
                    scid,
                    token,
                    packet_number: unprotected.packet_number,
                    payload: unprotected.payload.into(),
                })
            }
            (PacketKind::Handshake, Some(version), Some(scid)) => {
                Packet::Handshake(HandshakePacket {
                    version,
                    dcid,
                    scid,
                    packet_number: unprotected.packet_number,
                    payload: unprotected.payload.into(),
                })
            }
            (PacketKind::Short, ..) => Packet::Short(ShortPacket::from_parts(
                dcid,
                unprotected.first_byte,
                unprotected.packet_number,
                unprotected.payload,
            )),
            _ => return Err(Error::InvalidState),
        })
    }

    /// [`complete`](Self::complete) with the AEAD looked up by level.
    /// Missing keys yield [`Error::InvalidState`].
    pub fn complete_with<P: AeadProvider + ?Sized>(
        self,
        keys: &P,
        largest_pn: Option<PacketNumber>,
    ) -> Result<Packet, Error> {
        let aead = keys.for_level(self.level()).ok_or(Error::InvalidState)?;
        self.complete(aead, largest_pn)
    }
}

/// Result of the first parsing phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPacket {
    /// Initial, Handshake or Short; needs keys to finish.
    Protected(HalfParsedPacket),
    /// Retry carries no protection beyond its integrity tag.
    Retry(RetryPacket),
    VersionNegotiation(VersionNegotiationPacket),
}

/// Parse the first packet of `datagram`.
///
/// `short_dcid_len` is the length of this endpoint's connection IDs, which
/// short headers do not encode. Returns the packet and the number of bytes
/// it occupies; long header packets other than Retry and Version
/// Negotiation may be followed by more coalesced packets.
pub fn parse(datagram: &[u8], short_dcid_len: usize) -> Result<(ParsedPacket, usize), Error> {
    let first_byte = *datagram.first().ok_or(Error::Format)?;
    if first_byte & LONG_FORM_BIT == 0 {
        let (half, consumed) = parse_short(datagram, short_dcid_len)?;
        return Ok((ParsedPacket::Protected(half), consumed));
    }

    let envelope = read_envelope(datagram)?;
    if envelope.version == 0 {
        let vn = parse_version_negotiation(datagram, envelope)?;
        return Ok((ParsedPacket::VersionNegotiation(vn), datagram.len()));
    }
    let version = Version::from_wire(envelope.version).ok_or(Error::UnsupportedPacket)?;

    if envelope.packet_type() == LongPacketType::Retry {
        let retry = parse_retry(datagram, envelope, version)?;
        return Ok((ParsedPacket::Retry(retry), datagram.len()));
    }
    let (half, consumed) = parse_protected_long(datagram, envelope, version)?;
    Ok((ParsedPacket::Protected(half), consumed))
}
