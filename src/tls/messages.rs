//! TLS 1.3 handshake message encoding and decoding.
//!
//! Handshake message format:
//!   HandshakeType (1 byte)
//!   Length (3 bytes, big-endian)
//!   Body (Length bytes)
//!
//! Messages are owned values. Encoding produces the full framed message,
//! which is what both the peer and the transcript consume.

use crate::error::{Error, HandshakeError};
use crate::tls::codec::{put_u16, put_u24, put_vec16, put_vec24, put_vec8, Reader};
use crate::tls::extensions::{encode_extensions, parse_extensions, Extension, ExtensionContext};

const DECODE: Error = Error::Handshake(HandshakeError::Decode);

/// Length of the handshake message header.
pub const HANDSHAKE_HEADER_LEN: usize = 4;

/// legacy_version in ClientHello and ServerHello.
const LEGACY_VERSION: u16 = 0x0303;

/// ServerHello.random of a HelloRetryRequest (RFC 8446 section 4.1.3).
const HELLO_RETRY_REQUEST_RANDOM: [u8; 32] = [
    0xcf, 0x21, 0xad, 0x74, 0xe5, 0x9a, 0x61, 0x11, 0xbe, 0x1d, 0x8c, 0x02, 0x1e, 0x65, 0xb8, 0x91,
    0xc2, 0xa2, 0x11, 0x16, 0x7a, 0xbb, 0x8c, 0x5e, 0x07, 0x9e, 0x09, 0xe2, 0xc8, 0xa8, 0x33, 0x9c,
];

/// TLS handshake message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    ClientHello = 1,
    ServerHello = 2,
    EncryptedExtensions = 8,
    Certificate = 11,
    CertificateVerify = 15,
    Finished = 20,
}

impl HandshakeType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::ClientHello),
            2 => Some(Self::ServerHello),
            8 => Some(Self::EncryptedExtensions),
            11 => Some(Self::Certificate),
            15 => Some(Self::CertificateVerify),
            20 => Some(Self::Finished),
            _ => None,
        }
    }
}

/// The only cipher suite offered or accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherSuite {
    TlsAes128GcmSha256,
}

impl CipherSuite {
    pub fn to_u16(self) -> u16 {
        match self {
            Self::TlsAes128GcmSha256 => 0x1301,
        }
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x1301 => Some(Self::TlsAes128GcmSha256),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suites: Vec<u16>,
    pub extensions: Vec<Extension>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub random: [u8; 32],
    /// Echo of the ClientHello legacy_session_id.
    pub session_id: Vec<u8>,
    pub cipher_suite: u16,
    pub extensions: Vec<Extension>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedExtensions {
    pub extensions: Vec<Extension>,
}

/// A single certificate entry from the Certificate message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEntry {
    /// DER-encoded certificate data.
    pub cert_data: Vec<u8>,
    /// Raw extension block (usually empty).
    pub extensions: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The certificate request context (empty for server certs).
    pub context: Vec<u8>,
    /// Leaf first.
    pub entries: Vec<CertificateEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerify {
    pub algorithm: u16,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub verify_data: [u8; 32],
}

/// Any handshake message this crate exchanges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    EncryptedExtensions(EncryptedExtensions),
    Certificate(Certificate),
    CertificateVerify(CertificateVerify),
    Finished(Finished),
}

impl HandshakeMessage {
    pub fn handshake_type(&self) -> HandshakeType {
        match self {
            HandshakeMessage::ClientHello(_) => HandshakeType::ClientHello,
            HandshakeMessage::ServerHello(_) => HandshakeType::ServerHello,
            HandshakeMessage::EncryptedExtensions(_) => HandshakeType::EncryptedExtensions,
            HandshakeMessage::Certificate(_) => HandshakeType::Certificate,
            HandshakeMessage::CertificateVerify(_) => HandshakeType::CertificateVerify,
            HandshakeMessage::Finished(_) => HandshakeType::Finished,
        }
    }

    /// Encode the framed message (header and body).
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(128);
        out.push(self.handshake_type() as u8);
        put_vec24(&mut out, |out| self.encode_body(out))?;
        Ok(out)
    }

    fn encode_body(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            HandshakeMessage::ClientHello(ch) => {
                put_u16(out, LEGACY_VERSION);
                out.extend_from_slice(&ch.random);
                put_bytes8(out, &ch.session_id)?;
                put_vec16(out, |out| {
                    ch.cipher_suites.iter().for_each(|cs| put_u16(out, *cs));
                    Ok(())
                })?;
                // Compression methods: only null.
                out.extend_from_slice(&[1, 0]);
                encode_extensions(&ch.extensions, out)
            }
            HandshakeMessage::ServerHello(sh) => {
                put_u16(out, LEGACY_VERSION);
                out.extend_from_slice(&sh.random);
                put_bytes8(out, &sh.session_id)?;
                put_u16(out, sh.cipher_suite);
                out.push(0);
                encode_extensions(&sh.extensions, out)
            }
            HandshakeMessage::EncryptedExtensions(ee) => encode_extensions(&ee.extensions, out),
            HandshakeMessage::Certificate(cert) => {
                put_bytes8(out, &cert.context)?;
                put_vec24(out, |out| {
                    for entry in &cert.entries {
                        put_u24(out, entry.cert_data.len())?;
                        out.extend_from_slice(&entry.cert_data);
                        put_vec16(out, |out| {
                            out.extend_from_slice(&entry.extensions);
                            Ok(())
                        })?;
                    }
                    Ok(())
                })
            }
            HandshakeMessage::CertificateVerify(cv) => {
                put_u16(out, cv.algorithm);
                put_vec16(out, |out| {
                    out.extend_from_slice(&cv.signature);
                    Ok(())
                })
            }
            HandshakeMessage::Finished(fin) => {
                out.extend_from_slice(&fin.verify_data);
                Ok(())
            }
        }
    }

    /// Decode one complete framed message. `data` must hold exactly the
    /// message; use [`split_message`] to cut it out of a stream.
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let mut r = Reader::new(data);
        let msg_type = r.u8()?;
        let body = r.vec24()?;
        r.finish()?;

        let handshake_type = HandshakeType::from_u8(msg_type)
            .ok_or(Error::Handshake(HandshakeError::UnexpectedMessage))?;
        let mut r = Reader::new(body);
        let msg = match handshake_type {
            HandshakeType::ClientHello => {
                let _legacy_version = r.u16()?;
                let random = r.array()?;
                let session_id = read_session_id(&mut r)?;
                let suites = r.vec16()?;
                if suites.is_empty() || suites.len() % 2 != 0 {
                    return Err(DECODE);
                }
                let cipher_suites = suites
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                if !r.vec8()?.contains(&0) {
                    return Err(Error::Handshake(HandshakeError::IllegalParameter));
                }
                let extensions = parse_extensions(r.vec16()?, ExtensionContext::ClientHello)?;
                HandshakeMessage::ClientHello(ClientHello {
                    random,
                    session_id,
                    cipher_suites,
                    extensions,
                })
            }
            HandshakeType::ServerHello => {
                let _legacy_version = r.u16()?;
                let random: [u8; 32] = r.array()?;
                if random == HELLO_RETRY_REQUEST_RANDOM {
                    return Err(Error::Handshake(HandshakeError::UnexpectedMessage));
                }
                let session_id = read_session_id(&mut r)?;
                let cipher_suite = r.u16()?;
                if r.u8()? != 0 {
                    return Err(Error::Handshake(HandshakeError::IllegalParameter));
                }
                let extensions = parse_extensions(r.vec16()?, ExtensionContext::ServerHello)?;
                HandshakeMessage::ServerHello(ServerHello {
                    random,
                    session_id,
                    cipher_suite,
                    extensions,
                })
            }
            HandshakeType::EncryptedExtensions => {
                let extensions =
                    parse_extensions(r.vec16()?, ExtensionContext::EncryptedExtensions)?;
                HandshakeMessage::EncryptedExtensions(EncryptedExtensions { extensions })
            }
            HandshakeType::Certificate => {
                let context = r.vec8()?.to_vec();
                let mut list = Reader::new(r.vec24()?);
                let mut entries = Vec::new();
                while !list.is_empty() {
                    let cert_data = list.vec24()?.to_vec();
                    let extensions = list.vec16()?.to_vec();
                    entries.push(CertificateEntry {
                        cert_data,
                        extensions,
                    });
                }
                HandshakeMessage::Certificate(Certificate { context, entries })
            }
            HandshakeType::CertificateVerify => {
                let algorithm = r.u16()?;
                let signature = r.vec16()?.to_vec();
                HandshakeMessage::CertificateVerify(CertificateVerify {
                    algorithm,
                    signature,
                })
            }
            HandshakeType::Finished => {
                // SHA-256 verify_data is 32 bytes.
                let verify_data = r.array()?;
                HandshakeMessage::Finished(Finished { verify_data })
            }
        };
        r.finish()?;
        Ok(msg)
    }
}

fn put_bytes8(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), Error> {
    put_vec8(out, |out| {
        out.extend_from_slice(bytes);
        Ok(())
    })
}

fn read_session_id(r: &mut Reader<'_>) -> Result<Vec<u8>, Error> {
    let session_id = r.vec8()?;
    if session_id.len() > 32 {
        return Err(DECODE);
    }
    Ok(session_id.to_vec())
}

/// Total length of the first framed message in `buf`, or `None` if the
/// buffer does not yet hold all of it.
pub fn frame_len(buf: &[u8]) -> Option<usize> {
    let header = buf.get(..HANDSHAKE_HEADER_LEN)?;
    let body_len =
        (usize::from(header[1]) << 16) | (usize::from(header[2]) << 8) | usize::from(header[3]);
    let total = HANDSHAKE_HEADER_LEN + body_len;
    (buf.len() >= total).then_some(total)
}

/// Split the first complete message off `buf`: returns its type byte and
/// framed bytes plus the remainder, or `None` on underflow.
pub fn split_message(buf: &[u8]) -> Option<(u8, &[u8], &[u8])> {
    let total = frame_len(buf)?;
    let (msg, rest) = buf.split_at(total);
    Some((msg[0], msg, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::extensions::{KeyShareEntry, GROUP_X25519, TLS13};

    fn roundtrip(msg: HandshakeMessage) {
        let bytes = msg.encode().unwrap();
        assert_eq!(frame_len(&bytes), Some(bytes.len()));
        assert_eq!(HandshakeMessage::decode(&bytes).unwrap(), msg);
    }

    fn client_hello() -> ClientHello {
        ClientHello {
            random: [0x11; 32],
            session_id: vec![0x22; 32],
            cipher_suites: vec![0x1301],
            extensions: vec![
                Extension::ClientSupportedVersions(vec![TLS13]),
                Extension::ClientKeyShare(vec![KeyShareEntry {
                    group: GROUP_X25519,
                    key_exchange: vec![0x33; 32],
                }]),
            ],
        }
    }

    #[test]
    fn every_message_type_roundtrips() {
        roundtrip(HandshakeMessage::ClientHello(client_hello()));
        roundtrip(HandshakeMessage::ServerHello(ServerHello {
            random: [0x44; 32],
            session_id: vec![0x22; 32],
            cipher_suite: 0x1301,
            extensions: vec![Extension::ServerSupportedVersion(TLS13)],
        }));
        roundtrip(HandshakeMessage::EncryptedExtensions(EncryptedExtensions {
            extensions: vec![Extension::Alpn(vec![b"h3".to_vec()])],
        }));
        roundtrip(HandshakeMessage::Certificate(Certificate {
            context: vec![],
            entries: vec![
                CertificateEntry {
                    cert_data: vec![0x30; 500],
                    extensions: vec![],
                },
                CertificateEntry {
                    cert_data: vec![0x30; 3],
                    extensions: vec![0, 5, 0, 0],
                },
            ],
        }));
        roundtrip(HandshakeMessage::CertificateVerify(CertificateVerify {
            algorithm: 0x0804,
            signature: vec![0x55; 256],
        }));
        roundtrip(HandshakeMessage::Finished(Finished {
            verify_data: [0x66; 32],
        }));
    }

    #[test]
    fn client_hello_layout() {
        let bytes = HandshakeMessage::ClientHello(client_hello()).encode().unwrap();
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[4..6], &[0x03, 0x03]);
        assert_eq!(&bytes[6..38], &[0x11; 32]);
        assert_eq!(bytes[38], 32);
        // cipher suites: len 2, 0x1301; compression: len 1, null
        assert_eq!(&bytes[71..77], &[0x00, 0x02, 0x13, 0x01, 0x01, 0x00]);
    }

    #[test]
    fn frame_len_reports_underflow() {
        let bytes = HandshakeMessage::Finished(Finished {
            verify_data: [1; 32],
        })
        .encode()
        .unwrap();
        assert_eq!(frame_len(&bytes[..3]), None);
        assert_eq!(frame_len(&bytes[..35]), None);
        assert_eq!(frame_len(&bytes), Some(36));

        let mut two = bytes.clone();
        two.extend_from_slice(&bytes[..10]);
        let (ty, first, rest) = split_message(&two).unwrap();
        assert_eq!(ty, 20);
        assert_eq!(first, &bytes[..]);
        assert_eq!(rest.len(), 10);
        assert!(split_message(rest).is_none());
    }

    #[test]
    fn trailing_bytes_are_decode_errors() {
        let mut bytes = HandshakeMessage::Finished(Finished {
            verify_data: [1; 32],
        })
        .encode()
        .unwrap();
        // Grow the body by one byte and fix up the length.
        bytes.push(0);
        bytes[3] = 33;
        assert_eq!(HandshakeMessage::decode(&bytes), Err(DECODE));
    }

    #[test]
    fn hello_retry_request_is_rejected() {
        let bytes = HandshakeMessage::ServerHello(ServerHello {
            random: HELLO_RETRY_REQUEST_RANDOM,
            session_id: vec![],
            cipher_suite: 0x1301,
            extensions: vec![],
        })
        .encode()
        .unwrap();
        assert_eq!(
            HandshakeMessage::decode(&bytes),
            Err(Error::Handshake(HandshakeError::UnexpectedMessage))
        );
    }

    #[test]
    fn unknown_message_type() {
        assert_eq!(
            HandshakeMessage::decode(&[0x04, 0, 0, 0]),
            Err(Error::Handshake(HandshakeError::UnexpectedMessage))
        );
    }
}
