//! QUIC v1 packet protection and TLS 1.3 key establishment.
//!
//! - [`packet`]: long/short header codec, header protection, Retry and
//!   Version Negotiation packets, coalesced datagrams.
//! - [`crypto`]: the key schedule and the per-level [`Aead`].
//! - [`tls`]: client and server handshake state machines that produce the
//!   Handshake and 1-RTT keys.
//!
//! Socket I/O, connection management, loss recovery and frame semantics are
//! left to the caller; payloads are opaque bytes here.

#![forbid(unsafe_code)]

pub mod crypto;
pub mod error;
pub mod packet;
pub mod tls;
pub mod varint;
pub mod version;

pub use crypto::{Aead, AeadProvider, EncryptionLevel, LevelKeys, PacketKey, Role};
pub use error::{Error, HandshakeError, TransportError};
pub use packet::{
    CoalescedPackets, ConnectionId, HalfParsedPacket, Packet, PacketNumber, ParsedPacket, Payload,
};
pub use tls::{
    CertificateProvider, ClientConfig, ClientFinished, ClientSession, Progress, RsaIdentity,
    ServerConfig, ServerFlight, ServerSession, TransportParameters,
};
pub use version::Version;
