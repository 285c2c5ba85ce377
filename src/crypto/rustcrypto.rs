//! RustCrypto-backed primitives: HKDF-SHA256, AES-128-GCM and the AES
//! header-protection block cipher.
//!
//! Every function instantiates its cipher from raw key bytes on each call,
//! so callers only ever hold plain key arrays.

use crate::error::Error;

pub const KEY_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const HASH_LEN: usize = 32;

// ---- HKDF-SHA256 ----

/// HKDF-Extract(salt, ikm).
pub fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> [u8; HASH_LEN] {
    let (prk, _) = hkdf::Hkdf::<sha2::Sha256>::extract(Some(salt), ikm);
    prk.into()
}

/// HKDF-Expand(prk, info) filling `okm`.
pub fn hkdf_expand(prk: &[u8], info: &[u8], okm: &mut [u8]) -> Result<(), Error> {
    let hk = hkdf::Hkdf::<sha2::Sha256>::from_prk(prk).map_err(|_| Error::Crypto)?;
    hk.expand(info, okm).map_err(|_| Error::Crypto)
}

/// HMAC-SHA256(key, data).
///
/// HKDF-Extract is defined as HMAC(salt, ikm), so the extract step doubles
/// as the MAC for Finished verify_data.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; HASH_LEN] {
    hkdf_extract(key, data)
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; HASH_LEN] {
    use sha2::{Digest, Sha256};
    Sha256::digest(data).into()
}

// ---- AES-128-GCM ----

fn gcm(key: &[u8; KEY_LEN]) -> Result<aes_gcm::Aes128Gcm, Error> {
    use aes_gcm::KeyInit;
    aes_gcm::Aes128Gcm::new_from_slice(key).map_err(|_| Error::Crypto)
}

/// Encrypt `buf` in place and append the 16-byte tag.
pub fn aes_gcm_seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    buf: &mut Vec<u8>,
) -> Result<(), Error> {
    use aes_gcm::aead::AeadInPlace;
    use aes_gcm::Nonce;

    let tag = gcm(key)?
        .encrypt_in_place_detached(Nonce::from_slice(nonce), aad, buf)
        .map_err(|_| Error::Crypto)?;
    buf.extend_from_slice(&tag);
    Ok(())
}

/// Verify and strip the trailing tag of `buf`, decrypting in place.
///
/// On failure the buffer is cleared so no unauthenticated plaintext escapes.
pub fn aes_gcm_open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    buf: &mut Vec<u8>,
) -> Result<(), Error> {
    use aes_gcm::aead::AeadInPlace;
    use aes_gcm::{Nonce, Tag};

    if buf.len() < TAG_LEN {
        return Err(Error::Authentication);
    }
    let plaintext_len = buf.len() - TAG_LEN;
    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&buf[plaintext_len..]);
    buf.truncate(plaintext_len);

    let result = gcm(key)?.decrypt_in_place_detached(
        Nonce::from_slice(nonce),
        aad,
        buf,
        &Tag::from(tag_bytes),
    );
    if result.is_err() {
        buf.clear();
        return Err(Error::Authentication);
    }
    Ok(())
}

// ---- AES header protection ----

/// Header-protection mask: the first five bytes of AES-ECB(hp_key, sample).
pub fn aes_hp_mask(hp_key: &[u8; KEY_LEN], sample: &[u8; 16]) -> Result<[u8; 5], Error> {
    use aes::cipher::{BlockEncrypt, KeyInit};

    let cipher = aes::Aes128::new_from_slice(hp_key).map_err(|_| Error::Crypto)?;
    let mut block = aes::Block::clone_from_slice(sample);
    cipher.encrypt_block(&mut block);

    let mut mask = [0u8; 5];
    mask.copy_from_slice(&block[..5]);
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn sha256_empty() {
        assert_eq!(
            sha256(b""),
            hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[test]
    fn gcm_seal_open() {
        let key = [0x11; 16];
        let nonce = [0x22; 12];
        let mut buf = b"hello quic".to_vec();
        aes_gcm_seal(&key, &nonce, b"aad", &mut buf).unwrap();
        assert_eq!(buf.len(), 10 + TAG_LEN);
        aes_gcm_open(&key, &nonce, b"aad", &mut buf).unwrap();
        assert_eq!(buf, b"hello quic");
    }

    #[test]
    fn gcm_open_wrong_aad_clears_buffer() {
        let key = [0x11; 16];
        let nonce = [0x22; 12];
        let mut buf = b"hello quic".to_vec();
        aes_gcm_seal(&key, &nonce, b"aad", &mut buf).unwrap();
        assert_eq!(
            aes_gcm_open(&key, &nonce, b"other", &mut buf),
            Err(Error::Authentication)
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn gcm_open_short_input() {
        let mut buf = vec![0u8; 15];
        assert_eq!(
            aes_gcm_open(&[0; 16], &[0; 12], b"", &mut buf),
            Err(Error::Authentication)
        );
    }

    /// RFC 9001 A.2: client Initial header protection.
    #[test]
    fn hp_mask_rfc9001_a2() {
        let hp = hex!("9f50449e04a0e810283a1e9933adedd2");
        let sample = hex!("d1b1c98dd7689fb8ec11d242b123dc9b");
        assert_eq!(aes_hp_mask(&hp, &sample).unwrap(), hex!("437b9aec36"));
    }
}
