//! Cryptographic building blocks for QUIC packet protection.
//!
//! Key derivation ([`key_schedule`]) turns TLS traffic secrets into
//! [`PacketKey`]s; an [`Aead`] pairs the key this endpoint sends with and
//! the key its peer sends with. [`header_protection`] masks the packet
//! number, and [`rsa_pss`] covers the CertificateVerify signature.

pub mod aead;
pub mod header_protection;
pub mod key_schedule;
pub mod keys;
pub mod rsa_pss;
pub mod rustcrypto;

pub use aead::{Aead, PacketKey};
pub use keys::{AeadProvider, LevelKeys};

/// Encryption level, which selects the keys. 0-RTT is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionLevel {
    Initial,
    Handshake,
    /// 1-RTT application data.
    OneRtt,
}

/// Which end of the connection this endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}
