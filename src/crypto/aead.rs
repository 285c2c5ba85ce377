//! Packet payload protection: the per-level AEAD pair.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::header_protection;
use crate::crypto::key_schedule::{derive_initial_secrets, derive_packet_key};
use crate::crypto::rustcrypto::{aes_gcm_open, aes_gcm_seal, aes_hp_mask, KEY_LEN, NONCE_LEN};
use crate::crypto::Role;
use crate::error::Error;
use crate::packet::number::PacketNumber;
use crate::version::Version;

/// Key material for one direction at one encryption level: the
/// AES-128-GCM key, its IV and the header protection key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PacketKey {
    key: [u8; KEY_LEN],
    iv: [u8; NONCE_LEN],
    hp: [u8; KEY_LEN],
}

impl PacketKey {
    pub fn new(key: [u8; KEY_LEN], iv: [u8; NONCE_LEN], hp: [u8; KEY_LEN]) -> Self {
        Self { key, iv, hp }
    }

    /// Derive key, IV and header protection key from a traffic secret.
    pub fn from_secret(secret: &[u8]) -> Result<Self, Error> {
        derive_packet_key(secret)
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; NONCE_LEN] {
        &self.iv
    }

    pub fn hp(&self) -> &[u8; KEY_LEN] {
        &self.hp
    }

    /// Per-packet nonce: the IV XORed with the packet number, big-endian
    /// and right-aligned.
    pub fn nonce(&self, pn: PacketNumber) -> [u8; NONCE_LEN] {
        let mut nonce = self.iv;
        for (n, p) in nonce[NONCE_LEN - 8..].iter_mut().zip(pn.value().to_be_bytes()) {
            *n ^= p;
        }
        nonce
    }

    /// Same header protection key, new payload key and IV. Used by Key
    /// Update, which never rotates the header protection key.
    pub fn with_payload_secret(&self, secret: &[u8]) -> Result<Self, Error> {
        let next = derive_packet_key(secret)?;
        Ok(Self::new(next.key, next.iv, self.hp))
    }
}

impl core::fmt::Debug for PacketKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PacketKey { .. }")
    }
}

/// The AEAD pair for one encryption level.
///
/// `own` protects what this endpoint sends, `peer` removes protection from
/// what it receives. Values are immutable once built and may be shared
/// across threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aead {
    own: PacketKey,
    peer: PacketKey,
}

impl Aead {
    pub fn new(own: PacketKey, peer: PacketKey) -> Self {
        Self { own, peer }
    }

    /// Build the pair from the two traffic secrets of a level.
    pub fn from_secrets(own_secret: &[u8], peer_secret: &[u8]) -> Result<Self, Error> {
        Ok(Self::new(
            PacketKey::from_secret(own_secret)?,
            PacketKey::from_secret(peer_secret)?,
        ))
    }

    /// Initial-level keys, derived from the client's first Destination
    /// Connection ID.
    pub fn initial(version: Version, dcid: &[u8], role: Role) -> Result<Self, Error> {
        let (mut client, mut server) = derive_initial_secrets(version, dcid)?;
        let result = match role {
            Role::Client => Self::from_secrets(&client, &server),
            Role::Server => Self::from_secrets(&server, &client),
        };
        client.zeroize();
        server.zeroize();
        result
    }

    pub fn own(&self) -> &PacketKey {
        &self.own
    }

    pub fn peer(&self) -> &PacketKey {
        &self.peer
    }

    /// The pair as seen from the other endpoint.
    pub fn mirrored(&self) -> Self {
        Self::new(self.peer.clone(), self.own.clone())
    }

    /// The next 1-RTT key phase (RFC 9001 §6). Takes the updated traffic
    /// secrets; header protection keys carry over unchanged.
    pub fn next_generation(&self, own_secret: &[u8], peer_secret: &[u8]) -> Result<Self, Error> {
        Ok(Self::new(
            self.own.with_payload_secret(own_secret)?,
            self.peer.with_payload_secret(peer_secret)?,
        ))
    }

    /// Encrypt `plaintext` for packet `pn`; `aad` is the unprotected header.
    /// Returns ciphertext followed by the 16-byte tag.
    pub fn seal(&self, plaintext: &[u8], pn: PacketNumber, aad: &[u8]) -> Result<Vec<u8>, Error> {
        let mut buf = plaintext.to_vec();
        aes_gcm_seal(&self.own.key, &self.own.nonce(pn), aad, &mut buf)?;
        Ok(buf)
    }

    /// Authenticate and decrypt a payload sealed by the peer.
    ///
    /// Fails with [`Error::Authentication`] on any tag mismatch; no
    /// plaintext is returned in that case.
    pub fn open(&self, ciphertext: &[u8], pn: PacketNumber, aad: &[u8]) -> Result<Vec<u8>, Error> {
        let mut buf = ciphertext.to_vec();
        aes_gcm_open(&self.peer.key, &self.peer.nonce(pn), aad, &mut buf)?;
        Ok(buf)
    }

    /// Apply header protection with the own key. `header` is the first byte
    /// followed by four bytes starting at the packet number.
    pub fn encrypt_header(
        &self,
        sample: &[u8; 16],
        header: &[u8; 5],
        is_short_header: bool,
    ) -> Result<[u8; 5], Error> {
        let mask = aes_hp_mask(&self.own.hp, sample)?;
        let mut out = *header;
        header_protection::protect(&mask, &mut out, is_short_header);
        Ok(out)
    }

    /// Remove header protection applied by the peer.
    pub fn decrypt_header(
        &self,
        sample: &[u8; 16],
        header: &[u8; 5],
        is_short_header: bool,
    ) -> Result<[u8; 5], Error> {
        let mask = aes_hp_mask(&self.peer.hp, sample)?;
        let mut out = *header;
        header_protection::unprotect(&mask, &mut out, is_short_header);
        Ok(out)
    }
}
