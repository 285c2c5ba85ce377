//! TLS 1.3 alert descriptions (RFC 8446 section 6).
//!
//! QUIC never sends TLS alert records. A handshake failure is reported in
//! CONNECTION_CLOSE as `CRYPTO_ERROR`: 0x0100 plus the alert code
//! (RFC 9001 section 4.8).

use crate::error::{HandshakeError, TransportError};

/// TLS alert description codes a QUIC handshake can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    HandshakeFailure = 40,
    BadCertificate = 42,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    UnknownCa = 48,
    DecodeError = 50,
    DecryptError = 51,
    ProtocolVersion = 70,
    InternalError = 80,
    MissingExtension = 109,
    UnsupportedExtension = 110,
    NoApplicationProtocol = 120,
}

impl AlertDescription {
    /// Convert from a raw u8 byte.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::CloseNotify),
            10 => Some(Self::UnexpectedMessage),
            40 => Some(Self::HandshakeFailure),
            42 => Some(Self::BadCertificate),
            46 => Some(Self::CertificateUnknown),
            47 => Some(Self::IllegalParameter),
            48 => Some(Self::UnknownCa),
            50 => Some(Self::DecodeError),
            51 => Some(Self::DecryptError),
            70 => Some(Self::ProtocolVersion),
            80 => Some(Self::InternalError),
            109 => Some(Self::MissingExtension),
            110 => Some(Self::UnsupportedExtension),
            120 => Some(Self::NoApplicationProtocol),
            _ => None,
        }
    }

    /// Convert to raw u8 byte.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// The QUIC `CRYPTO_ERROR` code carrying this alert.
    pub fn transport_code(self) -> u64 {
        TransportError::crypto_error(self.to_u8())
    }

    /// Recover the alert from a `CRYPTO_ERROR` code received from a peer.
    pub fn from_transport_code(code: u64) -> Option<Self> {
        let alert = code.checked_sub(0x0100).filter(|a| *a <= 0xff)?;
        Self::from_u8(alert as u8)
    }
}

impl From<HandshakeError> for AlertDescription {
    fn from(e: HandshakeError) -> Self {
        e.alert()
    }
}
