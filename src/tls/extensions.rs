//! TLS 1.3 extension encoding and decoding for QUIC.
//!
//! Extension format: type (2 bytes) + length (2 bytes) + data.
//!
//! key_share and supported_versions have a different body in ClientHello
//! and ServerHello, so parsing takes the message the extensions came from.

use crate::error::{Error, HandshakeError};
use crate::tls::codec::{put_u16, put_vec16, put_vec8, Reader};

// Extension type codes
pub const EXT_SERVER_NAME: u16 = 0x0000;
pub const EXT_SUPPORTED_GROUPS: u16 = 0x000a;
pub const EXT_SIGNATURE_ALGORITHMS: u16 = 0x000d;
pub const EXT_ALPN: u16 = 0x0010;
pub const EXT_SUPPORTED_VERSIONS: u16 = 0x002b;
pub const EXT_PSK_KEY_EXCHANGE_MODES: u16 = 0x002d;
pub const EXT_KEY_SHARE: u16 = 0x0033;
pub const EXT_QUIC_TRANSPORT_PARAMS: u16 = 0x0039;

/// Named group for X25519.
pub const GROUP_X25519: u16 = 0x001d;

/// TLS 1.3 in supported_versions.
pub const TLS13: u16 = 0x0304;

/// psk_dhe_ke; advertised for completeness, no PSK is ever offered.
pub const PSK_DHE_KE: u8 = 1;

/// Which handshake message an extension block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionContext {
    ClientHello,
    ServerHello,
    EncryptedExtensions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShareEntry {
    pub group: u16,
    pub key_exchange: Vec<u8>,
}

/// A single TLS extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    /// SNI host name.
    ServerName(String),
    SupportedGroups(Vec<u16>),
    SignatureAlgorithms(Vec<u16>),
    /// Offered protocols (ClientHello) or the single selected one
    /// (EncryptedExtensions).
    Alpn(Vec<Vec<u8>>),
    ClientKeyShare(Vec<KeyShareEntry>),
    ServerKeyShare(KeyShareEntry),
    PskKeyExchangeModes(Vec<u8>),
    ClientSupportedVersions(Vec<u16>),
    ServerSupportedVersion(u16),
    /// Raw quic_transport_parameters; the framing is decided by the session.
    TransportParameters(Vec<u8>),
    Unknown { ext_type: u16, data: Vec<u8> },
}

const DECODE: Error = Error::Handshake(HandshakeError::Decode);

impl Extension {
    pub fn ext_type(&self) -> u16 {
        match self {
            Extension::ServerName(_) => EXT_SERVER_NAME,
            Extension::SupportedGroups(_) => EXT_SUPPORTED_GROUPS,
            Extension::SignatureAlgorithms(_) => EXT_SIGNATURE_ALGORITHMS,
            Extension::Alpn(_) => EXT_ALPN,
            Extension::ClientKeyShare(_) | Extension::ServerKeyShare(_) => EXT_KEY_SHARE,
            Extension::PskKeyExchangeModes(_) => EXT_PSK_KEY_EXCHANGE_MODES,
            Extension::ClientSupportedVersions(_) | Extension::ServerSupportedVersion(_) => {
                EXT_SUPPORTED_VERSIONS
            }
            Extension::TransportParameters(_) => EXT_QUIC_TRANSPORT_PARAMS,
            Extension::Unknown { ext_type, .. } => *ext_type,
        }
    }

    fn encode_body(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            Extension::ServerName(name) => put_vec16(out, |out| {
                // HostName type = 0
                out.push(0);
                put_vec16(out, |out| {
                    out.extend_from_slice(name.as_bytes());
                    Ok(())
                })
            }),
            Extension::SupportedGroups(list) | Extension::SignatureAlgorithms(list) => {
                put_vec16(out, |out| {
                    list.iter().for_each(|v| put_u16(out, *v));
                    Ok(())
                })
            }
            Extension::Alpn(protocols) => put_vec16(out, |out| {
                for proto in protocols {
                    put_vec8(out, |out| {
                        out.extend_from_slice(proto);
                        Ok(())
                    })?;
                }
                Ok(())
            }),
            Extension::ClientKeyShare(entries) => put_vec16(out, |out| {
                for entry in entries {
                    encode_key_share_entry(entry, out)?;
                }
                Ok(())
            }),
            Extension::ServerKeyShare(entry) => encode_key_share_entry(entry, out),
            Extension::PskKeyExchangeModes(modes) => put_vec8(out, |out| {
                out.extend_from_slice(modes);
                Ok(())
            }),
            Extension::ClientSupportedVersions(versions) => put_vec8(out, |out| {
                versions.iter().for_each(|v| put_u16(out, *v));
                Ok(())
            }),
            Extension::ServerSupportedVersion(v) => {
                put_u16(out, *v);
                Ok(())
            }
            Extension::TransportParameters(data) | Extension::Unknown { data, .. } => {
                out.extend_from_slice(data);
                Ok(())
            }
        }
    }

    fn decode_body(ext_type: u16, data: &[u8], ctx: ExtensionContext) -> Result<Self, Error> {
        let mut r = Reader::new(data);
        let ext = match (ext_type, ctx) {
            (EXT_SERVER_NAME, ExtensionContext::ClientHello) => {
                let mut list = Reader::new(r.vec16()?);
                let mut name = None;
                while !list.is_empty() {
                    let name_type = list.u8()?;
                    let host = list.vec16()?;
                    if name_type == 0 && name.is_none() {
                        name = Some(String::from_utf8(host.to_vec()).map_err(|_| DECODE)?);
                    }
                }
                Extension::ServerName(name.ok_or(DECODE)?)
            }
            // The server acknowledges SNI with an empty extension.
            (EXT_SERVER_NAME, _) if data.is_empty() => {
                return Ok(Extension::Unknown {
                    ext_type,
                    data: Vec::new(),
                })
            }
            (EXT_SUPPORTED_GROUPS, _) => Extension::SupportedGroups(read_u16_list(r.vec16()?)?),
            (EXT_SIGNATURE_ALGORITHMS, _) => {
                Extension::SignatureAlgorithms(read_u16_list(r.vec16()?)?)
            }
            (EXT_ALPN, _) => {
                let mut list = Reader::new(r.vec16()?);
                let mut protocols = Vec::new();
                while !list.is_empty() {
                    let proto = list.vec8()?;
                    if proto.is_empty() {
                        return Err(DECODE);
                    }
                    protocols.push(proto.to_vec());
                }
                Extension::Alpn(protocols)
            }
            (EXT_KEY_SHARE, ExtensionContext::ClientHello) => {
                let mut list = Reader::new(r.vec16()?);
                let mut entries = Vec::new();
                while !list.is_empty() {
                    entries.push(decode_key_share_entry(&mut list)?);
                }
                Extension::ClientKeyShare(entries)
            }
            (EXT_KEY_SHARE, ExtensionContext::ServerHello) => {
                Extension::ServerKeyShare(decode_key_share_entry(&mut r)?)
            }
            (EXT_PSK_KEY_EXCHANGE_MODES, _) => Extension::PskKeyExchangeModes(r.vec8()?.to_vec()),
            (EXT_SUPPORTED_VERSIONS, ExtensionContext::ClientHello) => {
                Extension::ClientSupportedVersions(read_u16_list(r.vec8()?)?)
            }
            (EXT_SUPPORTED_VERSIONS, ExtensionContext::ServerHello) => {
                Extension::ServerSupportedVersion(r.u16()?)
            }
            (EXT_QUIC_TRANSPORT_PARAMS, _) => {
                return Ok(Extension::TransportParameters(data.to_vec()))
            }
            _ => {
                return Ok(Extension::Unknown {
                    ext_type,
                    data: data.to_vec(),
                })
            }
        };
        r.finish()?;
        Ok(ext)
    }
}

fn encode_key_share_entry(entry: &KeyShareEntry, out: &mut Vec<u8>) -> Result<(), Error> {
    put_u16(out, entry.group);
    put_vec16(out, |out| {
        out.extend_from_slice(&entry.key_exchange);
        Ok(())
    })
}

fn decode_key_share_entry(r: &mut Reader<'_>) -> Result<KeyShareEntry, Error> {
    let group = r.u16()?;
    let key_exchange = r.vec16()?.to_vec();
    Ok(KeyShareEntry {
        group,
        key_exchange,
    })
}

fn read_u16_list(data: &[u8]) -> Result<Vec<u16>, Error> {
    if data.len() % 2 != 0 {
        return Err(DECODE);
    }
    Ok(data
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect())
}

/// Append a 2-byte length-prefixed extension block.
pub fn encode_extensions(extensions: &[Extension], out: &mut Vec<u8>) -> Result<(), Error> {
    put_vec16(out, |out| {
        for ext in extensions {
            put_u16(out, ext.ext_type());
            put_vec16(out, |out| ext.encode_body(out))?;
        }
        Ok(())
    })
}

/// Parse the contents of an extension block (without its length prefix).
/// A repeated extension type is an `illegal_parameter` failure.
pub fn parse_extensions(data: &[u8], ctx: ExtensionContext) -> Result<Vec<Extension>, Error> {
    let mut r = Reader::new(data);
    let mut out: Vec<Extension> = Vec::new();
    while !r.is_empty() {
        let ext_type = r.u16()?;
        let body = r.vec16()?;
        if out.iter().any(|e| e.ext_type() == ext_type) {
            return Err(Error::Handshake(HandshakeError::IllegalParameter));
        }
        out.push(Extension::decode_body(ext_type, body, ctx)?);
    }
    Ok(out)
}

/// First extension for which `f` returns `Some`.
pub fn find<'a, T: 'a>(
    extensions: &'a [Extension],
    f: impl FnMut(&'a Extension) -> Option<T>,
) -> Option<T> {
    extensions.iter().find_map(f)
}
