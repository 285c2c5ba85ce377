//! RSA-PSS signing and verification for TLS 1.3 CertificateVerify.
//!
//! Provides helpers to:
//! - Build the TLS 1.3 CertificateVerify signed content (RFC 8446 section 4.4.3)
//! - Sign with an RSA private key (rsa_pss_rsae_sha256)
//! - Verify a signature using the RSA key of a DER certificate
//! - Extract the RSA public key from an X.509 certificate

use rand_core::CryptoRngCore;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{Error, HandshakeError};

/// TLS 1.3 signature scheme code for rsa_pss_rsae_sha256.
pub const RSA_PSS_RSAE_SHA256: u16 = 0x0804;

/// Context string for server CertificateVerify (RFC 8446 section 4.4.3).
pub const SERVER_CONTEXT: &[u8] = b"TLS 1.3, server CertificateVerify";

/// Context string for client CertificateVerify (RFC 8446 section 4.4.3).
pub const CLIENT_CONTEXT: &[u8] = b"TLS 1.3, client CertificateVerify";

/// rsaEncryption AlgorithmIdentifier: OID 1.2.840.113549.1.1.1 followed by NULL.
const RSA_ENCRYPTION_ALG_ID: &[u8] = &[
    0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01, 0x05, 0x00,
];

/// Build the content covered by a CertificateVerify signature:
///   64 bytes of 0x20 + context_string + 0x00 + transcript_hash
pub fn certificate_verify_content(context: &[u8], transcript_hash: &[u8; 32]) -> Vec<u8> {
    let mut content = Vec::with_capacity(64 + context.len() + 1 + 32);
    content.resize(64, 0x20);
    content.extend_from_slice(context);
    content.push(0x00);
    content.extend_from_slice(transcript_hash);
    content
}

/// Sign the server CertificateVerify content.
///
/// `transcript_hash` is the hash of the transcript up to and including the
/// Certificate message.
pub fn sign_certificate_verify<R: CryptoRngCore>(
    key: &RsaPrivateKey,
    transcript_hash: &[u8; 32],
    rng: &mut R,
) -> Result<Vec<u8>, Error> {
    let signing_key = BlindedSigningKey::<Sha256>::new(key.clone());
    let content = certificate_verify_content(SERVER_CONTEXT, transcript_hash);
    let signature = signing_key
        .try_sign_with_rng(rng, &content)
        .map_err(|_| Error::Crypto)?;
    Ok(signature.to_vec())
}

/// Verify a server CertificateVerify signature.
pub fn verify_certificate_verify(
    public_key: &RsaPublicKey,
    signature: &[u8],
    transcript_hash: &[u8; 32],
) -> Result<(), Error> {
    let invalid = Error::Handshake(HandshakeError::InvalidCertificateSignature);
    let verifying_key = VerifyingKey::<Sha256>::new(public_key.clone());
    let signature = Signature::try_from(signature).map_err(|_| invalid)?;
    let content = certificate_verify_content(SERVER_CONTEXT, transcript_hash);
    verifying_key.verify(&content, &signature).map_err(|_| invalid)
}

/// Extract the RSA public key from a DER-encoded X.509 certificate.
///
/// Minimal ASN.1 walk: locate the rsaEncryption AlgorithmIdentifier of the
/// SubjectPublicKeyInfo, then read the BIT STRING that follows it, whose
/// contents (after the unused-bits byte) are a PKCS#1 RSAPublicKey.
pub fn extract_rsa_public_key(cert_der: &[u8]) -> Result<RsaPublicKey, Error> {
    let bad = Error::Handshake(HandshakeError::BadCertificate);

    let oid_pos = find_subsequence(cert_der, RSA_ENCRYPTION_ALG_ID).ok_or(bad)?;
    let mut pos = oid_pos + RSA_ENCRYPTION_ALG_ID.len();

    if cert_der.get(pos) != Some(&0x03) {
        return Err(bad);
    }
    pos += 1;
    let (bit_string_len, len_len) = read_der_length(&cert_der[pos..]).ok_or(bad)?;
    pos += len_len;

    let bit_string = cert_der.get(pos..pos + bit_string_len).ok_or(bad)?;
    match bit_string.split_first() {
        Some((0x00, pkcs1)) => RsaPublicKey::from_pkcs1_der(pkcs1).map_err(|_| bad),
        _ => Err(bad),
    }
}

/// Parse a DER length; returns `(length, bytes_consumed)`.
fn read_der_length(buf: &[u8]) -> Option<(usize, usize)> {
    let first = *buf.first()?;
    if first < 0x80 {
        return Some((usize::from(first), 1));
    }
    let n = usize::from(first & 0x7f);
    if n == 0 || n > 3 || buf.len() < 1 + n {
        return None;
    }
    let len = buf[1..=n]
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | usize::from(b));
    Some((len, 1 + n))
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::traits::PublicKeyParts;

    const CERT: &[u8] = include_bytes!("../../testdata/server.cert.der");
    const KEY: &[u8] = include_bytes!("../../testdata/server.key.der");

    fn private_key() -> RsaPrivateKey {
        RsaPrivateKey::from_pkcs8_der(KEY).unwrap()
    }

    #[test]
    fn content_layout() {
        let hash = [0xab; 32];
        let content = certificate_verify_content(SERVER_CONTEXT, &hash);
        assert_eq!(content.len(), 64 + 33 + 1 + 32);
        assert!(content[..64].iter().all(|&b| b == 0x20));
        assert_eq!(&content[64..97], SERVER_CONTEXT);
        assert_eq!(content[97], 0x00);
        assert_eq!(&content[98..], &hash);
        assert_ne!(
            certificate_verify_content(CLIENT_CONTEXT, &hash),
            content
        );
    }

    #[test]
    fn extracts_key_matching_private_key() {
        let public = extract_rsa_public_key(CERT).unwrap();
        let private = private_key();
        assert_eq!(public.n(), private.n());
        assert_eq!(public.e(), private.e());
    }

    #[test]
    fn sign_then_verify() {
        let private = private_key();
        let public = extract_rsa_public_key(CERT).unwrap();
        let hash = [0x42; 32];
        let sig = sign_certificate_verify(&private, &hash, &mut rand_core::OsRng).unwrap();
        assert_eq!(sig.len(), 256);
        verify_certificate_verify(&public, &sig, &hash).unwrap();

        let err = Error::Handshake(HandshakeError::InvalidCertificateSignature);
        assert_eq!(verify_certificate_verify(&public, &sig, &[0x43; 32]), Err(err));

        let mut corrupted = sig.clone();
        corrupted[100] ^= 0x01;
        assert_eq!(verify_certificate_verify(&public, &corrupted, &hash), Err(err));
        assert_eq!(verify_certificate_verify(&public, &[], &hash), Err(err));
    }

    #[test]
    fn certificate_without_rsa_key() {
        let err = Error::Handshake(HandshakeError::BadCertificate);
        assert_eq!(extract_rsa_public_key(&[0x30, 0x03, 0x02, 0x01, 0x00]).unwrap_err(), err);
        // AlgorithmIdentifier present but BIT STRING truncated.
        let mut truncated = RSA_ENCRYPTION_ALG_ID.to_vec();
        truncated.extend_from_slice(&[0x03, 0x82, 0x01]);
        assert_eq!(extract_rsa_public_key(&truncated).unwrap_err(), err);
    }

    #[test]
    fn der_lengths() {
        assert_eq!(read_der_length(&[0x05]), Some((5, 1)));
        assert_eq!(read_der_length(&[0x81, 0xff]), Some((255, 2)));
        assert_eq!(read_der_length(&[0x82, 0x01, 0x0f]), Some((271, 3)));
        assert_eq!(read_der_length(&[0x80]), None);
        assert_eq!(read_der_length(&[0x82, 0x01]), None);
    }
}
