//! QUIC packet types and codec.
//!
//! This module builds and parses the outer QUIC packet structure: long and
//! short headers, packet numbers, Retry and Version Negotiation, and
//! coalescing. Writing applies packet protection through an [`Aead`];
//! parsing is split in two phases (see [`half_parsed`]) because the keys
//! for a packet are only known once its header has been read.

pub mod coalesce;
pub mod connection_id;
pub mod half_parsed;
pub mod long_header;
pub mod number;
pub mod payload;
pub mod protection;
pub mod retry;
pub mod short_header;
pub mod version_negotiation;

pub use coalesce::CoalescedPackets;
pub use connection_id::{ConnectionId, MAX_CID_LEN};
pub use half_parsed::{parse, HalfParsedPacket, PacketKind, ParsedPacket};
pub use number::PacketNumber;
pub use payload::Payload;

use crate::crypto::rustcrypto::TAG_LEN;
use crate::crypto::{Aead, AeadProvider, EncryptionLevel};
use crate::error::Error;
use crate::version::Version;

/// Header form bit: set for long headers.
pub const LONG_FORM_BIT: u8 = 0x80;

/// Fixed bit: must be set in every packet except Version Negotiation.
pub const FIXED_BIT: u8 = 0x40;

/// Minimum Initial packet size (anti-amplification, RFC 9000 section 14.1).
pub const MIN_INITIAL_PACKET_SIZE: usize = 1200;

/// Long header packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongPacketType {
    Initial,   // 0b00
    ZeroRtt,   // 0b01
    Handshake, // 0b10
    Retry,     // 0b11
}

impl LongPacketType {
    /// Decode from the two type bits (first byte, bits 4-5).
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => LongPacketType::Initial,
            1 => LongPacketType::ZeroRtt,
            2 => LongPacketType::Handshake,
            _ => LongPacketType::Retry,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            LongPacketType::Initial => 0,
            LongPacketType::ZeroRtt => 1,
            LongPacketType::Handshake => 2,
            LongPacketType::Retry => 3,
        }
    }
}

/// An Initial packet: carries the first CRYPTO frames, protected with keys
/// derived from the client's first Destination Connection ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialPacket {
    pub version: Version,
    pub dcid: ConnectionId,
    pub scid: ConnectionId,
    /// Address validation token; empty unless echoing a Retry or NEW_TOKEN.
    pub token: Vec<u8>,
    pub packet_number: PacketNumber,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePacket {
    pub version: Version,
    pub dcid: ConnectionId,
    pub scid: ConnectionId,
    pub packet_number: PacketNumber,
    pub payload: Payload,
}

/// A 1-RTT packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortPacket {
    pub dcid: ConnectionId,
    pub spin: bool,
    pub key_phase: bool,
    pub packet_number: PacketNumber,
    pub payload: Payload,
}

/// A Retry packet. Build with [`RetryPacket::new`] so the integrity tag
/// matches the rest of the fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPacket {
    pub version: Version,
    pub dcid: ConnectionId,
    pub scid: ConnectionId,
    pub token: Vec<u8>,
    /// Low four bits of the first byte; ignored by receivers.
    pub unused_bits: u8,
    pub integrity_tag: [u8; TAG_LEN],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionNegotiationPacket {
    pub dcid: ConnectionId,
    pub scid: ConnectionId,
    /// Low seven bits of the first byte; arbitrary on the wire.
    pub unused_bits: u8,
    pub supported_versions: Vec<u32>,
}

/// Any fully parsed (or to-be-written) QUIC packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Initial(InitialPacket),
    Handshake(HandshakePacket),
    Short(ShortPacket),
    Retry(RetryPacket),
    VersionNegotiation(VersionNegotiationPacket),
}

impl Packet {
    /// Encryption level of a protected packet; `None` for Retry and
    /// Version Negotiation.
    pub fn level(&self) -> Option<EncryptionLevel> {
        match self {
            Packet::Initial(_) => Some(EncryptionLevel::Initial),
            Packet::Handshake(_) => Some(EncryptionLevel::Handshake),
            Packet::Short(_) => Some(EncryptionLevel::OneRtt),
            Packet::Retry(_) | Packet::VersionNegotiation(_) => None,
        }
    }

    pub fn packet_number(&self) -> Option<PacketNumber> {
        match self {
            Packet::Initial(p) => Some(p.packet_number),
            Packet::Handshake(p) => Some(p.packet_number),
            Packet::Short(p) => Some(p.packet_number),
            Packet::Retry(_) | Packet::VersionNegotiation(_) => None,
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Packet::Initial(p) => Some(&p.payload),
            Packet::Handshake(p) => Some(&p.payload),
            Packet::Short(p) => Some(&p.payload),
            Packet::Retry(_) | Packet::VersionNegotiation(_) => None,
        }
    }

    /// Serialize, protecting with the keys of the packet's level.
    /// `largest_acked` sizes the packet number encoding.
    pub fn write<P: AeadProvider + ?Sized>(
        &self,
        keys: &P,
        largest_acked: Option<PacketNumber>,
    ) -> Result<Vec<u8>, Error> {
        let aead = |level| keys.for_level(level).ok_or(Error::InvalidState);
        match self {
            Packet::Initial(p) => p.write(aead(EncryptionLevel::Initial)?, largest_acked),
            Packet::Handshake(p) => p.write(aead(EncryptionLevel::Handshake)?, largest_acked),
            Packet::Short(p) => p.write(aead(EncryptionLevel::OneRtt)?, largest_acked),
            Packet::Retry(p) => Ok(p.write()),
            Packet::VersionNegotiation(p) => Ok(p.write()),
        }
    }

    /// Serialize with a single AEAD regardless of level.
    pub fn write_with(&self, aead: &Aead, largest_acked: Option<PacketNumber>) -> Result<Vec<u8>, Error> {
        match self {
            Packet::Initial(p) => p.write(aead, largest_acked),
            Packet::Handshake(p) => p.write(aead, largest_acked),
            Packet::Short(p) => p.write(aead, largest_acked),
            Packet::Retry(p) => Ok(p.write()),
            Packet::VersionNegotiation(p) => Ok(p.write()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{LevelKeys, Role};

    fn cid(bytes: &[u8]) -> ConnectionId {
        ConnectionId::new(bytes).unwrap()
    }

    fn pn(v: u64) -> PacketNumber {
        PacketNumber::new(v).unwrap()
    }

    fn client_and_server(dcid: &ConnectionId) -> (Aead, Aead) {
        let client = Aead::initial(Version::V1, dcid, Role::Client).unwrap();
        let server = Aead::initial(Version::V1, dcid, Role::Server).unwrap();
        (client, server)
    }

    fn roundtrip(packet: &Packet, writer: &Aead, reader: &Aead, dcid_len: usize) -> Packet {
        let bytes = packet.write_with(writer, None).unwrap();
        let (parsed, consumed) = parse(&bytes, dcid_len).unwrap();
        assert_eq!(consumed, bytes.len());
        match parsed {
            ParsedPacket::Protected(half) => half.complete(reader, None).unwrap(),
            ParsedPacket::Retry(r) => Packet::Retry(r),
            ParsedPacket::VersionNegotiation(vn) => Packet::VersionNegotiation(vn),
        }
    }

    #[test]
    fn long_packet_type_bits() {
        for ty in [
            LongPacketType::Initial,
            LongPacketType::ZeroRtt,
            LongPacketType::Handshake,
            LongPacketType::Retry,
        ] {
            assert_eq!(LongPacketType::from_bits(ty.bits()), ty);
        }
        // Only the low two bits matter.
        assert_eq!(LongPacketType::from_bits(0x0e), LongPacketType::Handshake);
    }

    #[test]
    fn initial_client_to_server() {
        let dcid = cid(&[0x83, 0x94, 0xc8, 0xf0, 0x3e, 0x51, 0x57, 0x08]);
        let (client, server) = client_and_server(&dcid);
        let packet = Packet::Initial(InitialPacket {
            version: Version::V1,
            dcid: dcid.clone(),
            scid: cid(&[1, 2, 3]),
            token: vec![0xfe; 12],
            packet_number: pn(0),
            payload: Payload::from_bytes(vec![0x06; 200]),
        });
        assert_eq!(roundtrip(&packet, &client, &server, 0), packet);
    }

    #[test]
    fn handshake_with_large_packet_number() {
        let dcid = cid(&[9; 12]);
        let (client, server) = client_and_server(&dcid);
        let packet = HandshakePacket {
            version: Version::Draft29,
            dcid: dcid.clone(),
            scid: ConnectionId::EMPTY,
            packet_number: pn(0x00ab_cdef),
            payload: Payload::from_bytes(vec![0x06; 64]),
        };
        let bytes = packet.write(&server, Some(pn(0x00ab_cd00))).unwrap();
        let ParsedPacket::Protected(half) = parse(&bytes, 0).unwrap().0 else {
            panic!("expected a protected packet");
        };
        let opened = half.complete(&client, Some(pn(0x00ab_cdee))).unwrap();
        assert_eq!(opened, Packet::Handshake(packet));
    }

    #[test]
    fn short_packet_flags_survive() {
        let dcid = cid(&[4; 8]);
        let (client, server) = client_and_server(&dcid);
        let packet = Packet::Short(ShortPacket {
            dcid: dcid.clone(),
            spin: true,
            key_phase: true,
            packet_number: pn(77),
            payload: Payload::from_bytes(vec![0x01, 0x02, 0x03]),
        });
        assert_eq!(roundtrip(&packet, &server, &client, 8), packet);
    }

    #[test]
    fn tiny_payload_is_padded() {
        let dcid = cid(&[4; 8]);
        let (client, server) = client_and_server(&dcid);
        let packet = ShortPacket {
            dcid: dcid.clone(),
            spin: false,
            key_phase: false,
            packet_number: pn(1),
            payload: Payload::from([0x01]),
        };
        let opened = roundtrip(&Packet::Short(packet), &client, &server, 8);
        let payload = opened.payload().unwrap().as_bytes();
        // PING followed by PADDING up to pn_len + payload = 4.
        assert_eq!(payload, &[0x01, 0x00, 0x00]);
    }

    #[test]
    fn unprotected_packets_roundtrip() {
        let dcid = cid(&[4; 8]);
        let (client, server) = client_and_server(&dcid);
        let retry = Packet::Retry(
            RetryPacket::new(Version::V1, cid(&[1]), cid(&[2; 8]), vec![7; 24], &dcid).unwrap(),
        );
        assert_eq!(roundtrip(&retry, &client, &server, 0), retry);

        let vn = Packet::VersionNegotiation(VersionNegotiationPacket {
            dcid: cid(&[1]),
            scid: cid(&[2]),
            unused_bits: 0,
            supported_versions: vec![1],
        });
        assert_eq!(roundtrip(&vn, &client, &server, 0), vn);
        assert_eq!(vn.level(), None);
        assert_eq!(vn.packet_number(), None);
    }

    #[test]
    fn write_needs_keys_for_level() {
        let dcid = cid(&[4; 8]);
        let (client, _) = client_and_server(&dcid);
        let packet = Packet::Handshake(HandshakePacket {
            version: Version::V1,
            dcid: dcid.clone(),
            scid: dcid.clone(),
            packet_number: pn(0),
            payload: Payload::from_bytes(vec![0x06; 20]),
        });
        let mut keys = LevelKeys::new();
        keys.install(EncryptionLevel::Initial, client.clone());
        assert_eq!(packet.write(&keys, None), Err(Error::InvalidState));
        keys.install(EncryptionLevel::Handshake, client);
        assert!(packet.write(&keys, None).is_ok());
        assert_eq!(packet.level(), Some(EncryptionLevel::Handshake));
        assert_eq!(packet.packet_number(), Some(pn(0)));
    }
}
