//! Retry packets (RFC 9000 §17.2.5) and their integrity tag (RFC 9001 §5.8).
//!
//! A Retry is not encrypted. Its last 16 bytes are an AES-128-GCM tag,
//! under a key and nonce fixed per QUIC version, over a pseudo-packet that
//! prepends the client's original Destination Connection ID.

use crate::crypto::rustcrypto::{aes_gcm_seal, TAG_LEN};
use crate::error::Error;
use crate::packet::connection_id::ConnectionId;
use crate::packet::long_header::{write_envelope, LongEnvelope};
use crate::packet::{LongPacketType, RetryPacket, FIXED_BIT, LONG_FORM_BIT};
use crate::version::Version;

impl RetryPacket {
    /// Build a Retry and compute its integrity tag against the original
    /// Destination Connection ID the client used.
    pub fn new(
        version: Version,
        dcid: ConnectionId,
        scid: ConnectionId,
        token: Vec<u8>,
        original_dcid: &ConnectionId,
    ) -> Result<Self, Error> {
        let mut packet = Self {
            version,
            dcid,
            scid,
            token,
            unused_bits: 0x0f,
            integrity_tag: [0; TAG_LEN],
        };
        packet.integrity_tag = packet.compute_tag(original_dcid)?;
        Ok(packet)
    }

    fn first_byte(&self) -> u8 {
        LONG_FORM_BIT | FIXED_BIT | (LongPacketType::Retry.bits() << 4) | (self.unused_bits & 0x0f)
    }

    fn write_without_tag(&self, out: &mut Vec<u8>) {
        write_envelope(
            self.first_byte(),
            self.version.to_wire(),
            &self.dcid,
            &self.scid,
            out,
        );
        out.extend_from_slice(&self.token);
    }

    fn compute_tag(&self, original_dcid: &ConnectionId) -> Result<[u8; TAG_LEN], Error> {
        let mut pseudo = Vec::with_capacity(64 + self.token.len());
        original_dcid.write_prefixed(&mut pseudo);
        self.write_without_tag(&mut pseudo);

        let mut tag = Vec::with_capacity(TAG_LEN);
        aes_gcm_seal(
            self.version.retry_key(),
            self.version.retry_nonce(),
            &pseudo,
            &mut tag,
        )?;
        let mut out = [0u8; TAG_LEN];
        out.copy_from_slice(&tag);
        Ok(out)
    }

    /// Check the integrity tag against the Destination Connection ID of the
    /// client's first Initial. A mismatch means the Retry is spoofed or
    /// corrupted and must be discarded.
    pub fn verify(&self, original_dcid: &ConnectionId) -> Result<(), Error> {
        let expected = self.compute_tag(original_dcid)?;
        if crate::tls::ct_eq(&expected, &self.integrity_tag) {
            Ok(())
        } else {
            Err(Error::Authentication)
        }
    }

    pub fn write(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.token.len() + TAG_LEN);
        self.write_without_tag(&mut out);
        out.extend_from_slice(&self.integrity_tag);
        out
    }
}

/// Parse a Retry; it always extends to the end of the datagram.
pub(crate) fn parse_retry(
    datagram: &[u8],
    envelope: LongEnvelope,
    version: Version,
) -> Result<RetryPacket, Error> {
    let rest = &datagram[envelope.len..];
    if rest.len() < TAG_LEN {
        return Err(Error::Format);
    }
    let (token, tag) = rest.split_at(rest.len() - TAG_LEN);
    let mut integrity_tag = [0u8; TAG_LEN];
    integrity_tag.copy_from_slice(tag);

    Ok(RetryPacket {
        version,
        dcid: envelope.dcid,
        scid: envelope.scid,
        token: token.to_vec(),
        unused_bits: envelope.first_byte & 0x0f,
        integrity_tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::long_header::read_envelope;
    use hex_literal::hex;

    fn cid(bytes: &[u8]) -> ConnectionId {
        ConnectionId::new(bytes).unwrap()
    }

    fn parse(bytes: &[u8]) -> RetryPacket {
        let env = read_envelope(bytes).unwrap();
        parse_retry(bytes, env, Version::V1).unwrap()
    }

    /// RFC 9001 A.4.
    #[test]
    fn rfc9001_retry_vector() {
        let bytes = hex!(
            "ff000000010008f067a5502a4262b5746f6b656e04a265ba2eff4d829058fb3f0f2496ba"
        );
        let retry = parse(&bytes);
        assert!(retry.dcid.is_empty());
        assert_eq!(retry.scid, cid(&hex!("f067a5502a4262b5")));
        assert_eq!(retry.token, b"token");
        retry.verify(&cid(&hex!("8394c8f03e515708"))).unwrap();
        assert_eq!(retry.write(), bytes);

        let rebuilt = RetryPacket::new(
            Version::V1,
            ConnectionId::EMPTY,
            cid(&hex!("f067a5502a4262b5")),
            b"token".to_vec(),
            &cid(&hex!("8394c8f03e515708")),
        )
        .unwrap();
        assert_eq!(rebuilt.write(), bytes);
    }

    #[test]
    fn wrong_original_dcid_fails() {
        let retry = RetryPacket::new(
            Version::V1,
            cid(&[1, 2, 3, 4]),
            cid(&[5, 6, 7, 8]),
            vec![0xaa; 32],
            &cid(&[9; 8]),
        )
        .unwrap();
        retry.verify(&cid(&[9; 8])).unwrap();
        assert_eq!(retry.verify(&cid(&[9; 7])), Err(Error::Authentication));
    }

    #[test]
    fn corrupted_token_fails() {
        let odcid = cid(&[9; 8]);
        let retry = RetryPacket::new(
            Version::V1,
            cid(&[1, 2, 3, 4]),
            cid(&[5, 6, 7, 8]),
            vec![0xaa; 32],
            &odcid,
        )
        .unwrap();
        let mut bytes = retry.write();
        let len = bytes.len();
        bytes[len - 20] ^= 0x01;
        assert_eq!(parse(&bytes).verify(&odcid), Err(Error::Authentication));
    }

    #[test]
    fn draft29_tag_differs() {
        let odcid = cid(&[9; 8]);
        let v1 = RetryPacket::new(Version::V1, cid(&[1]), cid(&[2]), vec![3], &odcid).unwrap();
        let d29 =
            RetryPacket::new(Version::Draft29, cid(&[1]), cid(&[2]), vec![3], &odcid).unwrap();
        assert_ne!(v1.integrity_tag, d29.integrity_tag);
        d29.verify(&odcid).unwrap();
    }

    #[test]
    fn too_short_for_tag() {
        let mut bytes = Vec::new();
        write_envelope(0xf0, 1, &cid(&[1]), &cid(&[2]), &mut bytes);
        bytes.extend_from_slice(&[0; 15]);
        let env = read_envelope(&bytes).unwrap();
        assert_eq!(parse_retry(&bytes, env, Version::V1), Err(Error::Format));
    }
}
