//! QUIC key derivation (RFC 9001).
//!
//! Provides HKDF-Expand-Label, Initial secret derivation, packet key
//! derivation and the Key Update secret chain.

use zeroize::Zeroize;

use crate::crypto::aead::PacketKey;
use crate::crypto::rustcrypto::{hkdf_expand, hkdf_extract, HASH_LEN};
use crate::error::Error;
use crate::version::Version;

/// Label prefix used by TLS 1.3 and by QUIC v1 packet protection.
pub const TLS13_LABEL_PREFIX: &[u8] = b"tls13 ";

/// A 32-byte secret from the SHA-256 key schedule.
pub type Secret = [u8; HASH_LEN];

/// HKDF-Expand-Label (RFC 8446 §7.1) with an explicit label prefix.
///
/// Constructs the HkdfLabel structure:
///   uint16 length = out.len()
///   opaque label<7..255> = prefix + label
///   opaque context<0..255> = context
///
/// Then calls HKDF-Expand(secret, HkdfLabel, out.len()). Both peers must
/// agree on `prefix`.
pub fn expand_label(
    secret: &[u8],
    prefix: &[u8],
    label: &[u8],
    context: &[u8],
    out: &mut [u8],
) -> Result<(), Error> {
    let full_label_len = prefix.len() + label.len();
    let info_len = 2 + 1 + full_label_len + 1 + context.len();

    // 80 bytes covers every TLS and QUIC label with a SHA-256 context.
    if info_len > 80 || out.len() > usize::from(u16::MAX) {
        return Err(Error::Crypto);
    }

    let mut info = [0u8; 80];
    let mut off = 0;
    info[off..off + 2].copy_from_slice(&(out.len() as u16).to_be_bytes());
    off += 2;
    info[off] = full_label_len as u8;
    off += 1;
    info[off..off + prefix.len()].copy_from_slice(prefix);
    off += prefix.len();
    info[off..off + label.len()].copy_from_slice(label);
    off += label.len();
    info[off] = context.len() as u8;
    off += 1;
    info[off..off + context.len()].copy_from_slice(context);
    off += context.len();

    hkdf_expand(secret, &info[..off], out)
}

/// Derive the client and server Initial secrets from the client's first
/// Destination Connection ID (RFC 9001 §5.2).
pub fn derive_initial_secrets(version: Version, dcid: &[u8]) -> Result<(Secret, Secret), Error> {
    let mut initial_secret = hkdf_extract(version.initial_salt(), dcid);

    let mut client = [0u8; HASH_LEN];
    let mut server = [0u8; HASH_LEN];
    let result = expand_label(&initial_secret, TLS13_LABEL_PREFIX, b"client in", &[], &mut client)
        .and_then(|()| {
            expand_label(&initial_secret, TLS13_LABEL_PREFIX, b"server in", &[], &mut server)
        });
    initial_secret.zeroize();
    result?;
    Ok((client, server))
}

/// Derive the packet protection key, IV and header protection key from a
/// traffic secret (labels "quic key", "quic iv", "quic hp").
pub fn derive_packet_key(secret: &[u8]) -> Result<PacketKey, Error> {
    let mut key = [0u8; 16];
    let mut iv = [0u8; 12];
    let mut hp = [0u8; 16];
    expand_label(secret, TLS13_LABEL_PREFIX, b"quic key", &[], &mut key)?;
    expand_label(secret, TLS13_LABEL_PREFIX, b"quic iv", &[], &mut iv)?;
    expand_label(secret, TLS13_LABEL_PREFIX, b"quic hp", &[], &mut hp)?;
    let packet_key = PacketKey::new(key, iv, hp);
    key.zeroize();
    iv.zeroize();
    hp.zeroize();
    Ok(packet_key)
}

/// Derive the next-generation application traffic secret for Key Update
/// (RFC 9001 §6.1): `HKDF-Expand-Label(current, "quic ku", "", 32)`.
pub fn next_application_secret(current: &Secret) -> Result<Secret, Error> {
    let mut next = [0u8; HASH_LEN];
    expand_label(current, TLS13_LABEL_PREFIX, b"quic ku", &[], &mut next)?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    // ---- RFC 9001 Appendix A.1 test vectors ----

    const DCID: [u8; 8] = hex!("8394c8f03e515708");
    const CLIENT_SECRET: [u8; 32] =
        hex!("c00cf151ca5be075ed0ebfb5c80323c42d6b7db67881289af4008f1f6c357aea");
    const SERVER_SECRET: [u8; 32] =
        hex!("3c199828fd139efd216c155ad844cc81fb82fa8d7446fa7d78be803acdda951b");

    #[test]
    fn initial_secrets_rfc9001_a1() {
        let (client, server) = derive_initial_secrets(Version::V1, &DCID).unwrap();
        assert_eq!(client, CLIENT_SECRET);
        assert_eq!(server, SERVER_SECRET);
    }

    #[test]
    fn initial_client_keys_rfc9001_a1() {
        let key = derive_packet_key(&CLIENT_SECRET).unwrap();
        assert_eq!(key.key(), &hex!("1f369613dd76d5467730efcbe3b1a22d"));
        assert_eq!(key.iv(), &hex!("fa044b2f42a3fd3b46fb255c"));
        assert_eq!(key.hp(), &hex!("9f50449e04a0e810283a1e9933adedd2"));
    }

    #[test]
    fn initial_server_keys_rfc9001_a1() {
        let key = derive_packet_key(&SERVER_SECRET).unwrap();
        assert_eq!(key.key(), &hex!("cf3a5331653c364c88f0f379b6067e37"));
        assert_eq!(key.iv(), &hex!("0ac1493ca1905853b0bba03e"));
        assert_eq!(key.hp(), &hex!("c206b8d9b9f0f37644430b490eeaa314"));
    }

    #[test]
    fn draft29_uses_its_own_salt() {
        let (v1, _) = derive_initial_secrets(Version::V1, &DCID).unwrap();
        let (d29, _) = derive_initial_secrets(Version::Draft29, &DCID).unwrap();
        assert_ne!(v1, d29);
    }

    #[test]
    fn label_prefix_changes_output() {
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        expand_label(&CLIENT_SECRET, b"tls13 ", b"quic key", &[], &mut a).unwrap();
        expand_label(&CLIENT_SECRET, b"tls13 quic ", b"key", &[], &mut b).unwrap();
        // Same HkdfLabel bytes either way.
        assert_eq!(a, b);
        expand_label(&CLIENT_SECRET, b"quic ", b"key", &[], &mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn oversized_label_rejected() {
        let mut out = [0u8; 32];
        let context = [0u8; 80];
        assert_eq!(
            expand_label(&CLIENT_SECRET, TLS13_LABEL_PREFIX, b"x", &context, &mut out),
            Err(Error::Crypto)
        );
    }

    // ---- Key Update derivation (RFC 9001 section 6.1) ----

    #[test]
    fn key_update_chain_is_deterministic_and_distinct() {
        let gen1 = next_application_secret(&CLIENT_SECRET).unwrap();
        let gen2 = next_application_secret(&gen1).unwrap();
        assert_ne!(gen1, CLIENT_SECRET);
        assert_ne!(gen2, gen1);
        assert_eq!(next_application_secret(&CLIENT_SECRET).unwrap(), gen1);
    }
}
