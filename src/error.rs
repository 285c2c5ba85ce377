use crate::tls::alert::AlertDescription;

/// QUIC transport error codes (RFC 9000 §20).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum TransportError {
    NoError = 0x00,
    InternalError = 0x01,
    ConnectionRefused = 0x02,
    FlowControlError = 0x03,
    StreamLimitError = 0x04,
    StreamStateError = 0x05,
    FinalSizeError = 0x06,
    FrameEncodingError = 0x07,
    TransportParameterError = 0x08,
    ConnectionIdLimitError = 0x09,
    ProtocolViolation = 0x0a,
    InvalidToken = 0x0b,
    ApplicationError = 0x0c,
    CryptoBufferExceeded = 0x0d,
    KeyUpdateError = 0x0e,
    AeadLimitReached = 0x0f,
    NoViablePath = 0x10,
    VersionNegotiationError = 0x11,
}

impl TransportError {
    /// Convert a transport error to its RFC 9000 wire code.
    pub const fn to_code(self) -> u64 {
        self as u64
    }

    /// Create a `CRYPTO_ERROR` code (0x0100 + TLS alert code).
    pub const fn crypto_error(alert_code: u8) -> u64 {
        0x0100 + alert_code as u64
    }

    /// Parse a wire error code into a `TransportError`.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0x00 => Some(Self::NoError),
            0x01 => Some(Self::InternalError),
            0x02 => Some(Self::ConnectionRefused),
            0x03 => Some(Self::FlowControlError),
            0x04 => Some(Self::StreamLimitError),
            0x05 => Some(Self::StreamStateError),
            0x06 => Some(Self::FinalSizeError),
            0x07 => Some(Self::FrameEncodingError),
            0x08 => Some(Self::TransportParameterError),
            0x09 => Some(Self::ConnectionIdLimitError),
            0x0a => Some(Self::ProtocolViolation),
            0x0b => Some(Self::InvalidToken),
            0x0c => Some(Self::ApplicationError),
            0x0d => Some(Self::CryptoBufferExceeded),
            0x0e => Some(Self::KeyUpdateError),
            0x0f => Some(Self::AeadLimitReached),
            0x10 => Some(Self::NoViablePath),
            0x11 => Some(Self::VersionNegotiationError),
            _ => None,
        }
    }
}

/// Reasons a TLS handshake is aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    /// A message arrived that the current state does not expect.
    UnexpectedMessage,
    /// A handshake message body could not be decoded.
    Decode,
    /// The peer does not speak TLS 1.3.
    UnsupportedVersion,
    /// No cipher suite in common (only TLS_AES_128_GCM_SHA256 is offered).
    UnsupportedCipherSuite,
    /// No usable X25519 key share.
    MissingKeyShare,
    /// The key share produced a non-contributory shared secret.
    InvalidKeyShare,
    /// The peer cannot verify RSA-PSS-RSAE-SHA256 signatures.
    NoCommonSignatureScheme,
    /// The quic_transport_parameters extension was absent.
    MissingTransportParameters,
    /// The server sent no certificate, or one without an RSA key.
    BadCertificate,
    /// The certificate is not one of the configured pins.
    UntrustedCertificate,
    /// CertificateVerify did not verify against the certificate key.
    InvalidCertificateSignature,
    /// Finished verify_data did not match.
    InvalidFinished,
    /// ALPN was offered but no protocol matched.
    NoApplicationProtocol,
    /// The ServerHello did not echo the legacy session id.
    IllegalParameter,
}

impl HandshakeError {
    /// The TLS alert a peer would be sent for this failure.
    pub fn alert(self) -> AlertDescription {
        match self {
            HandshakeError::UnexpectedMessage => AlertDescription::UnexpectedMessage,
            HandshakeError::Decode => AlertDescription::DecodeError,
            HandshakeError::UnsupportedVersion => AlertDescription::ProtocolVersion,
            HandshakeError::UnsupportedCipherSuite
            | HandshakeError::MissingKeyShare
            | HandshakeError::NoCommonSignatureScheme => AlertDescription::HandshakeFailure,
            HandshakeError::InvalidKeyShare | HandshakeError::IllegalParameter => {
                AlertDescription::IllegalParameter
            }
            HandshakeError::MissingTransportParameters => AlertDescription::MissingExtension,
            HandshakeError::BadCertificate => AlertDescription::BadCertificate,
            HandshakeError::UntrustedCertificate => AlertDescription::UnknownCa,
            HandshakeError::InvalidCertificateSignature | HandshakeError::InvalidFinished => {
                AlertDescription::DecryptError
            }
            HandshakeError::NoApplicationProtocol => AlertDescription::NoApplicationProtocol,
        }
    }
}

/// Top-level crate error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Malformed varint, length or field. Fatal to the packet.
    Format,
    /// AEAD tag or Retry integrity tag mismatch. Drop the packet.
    Authentication,
    /// The TLS handshake must be aborted.
    Handshake(HandshakeError),
    /// QUIC transport error; `ProtocolViolation` and `CryptoBufferExceeded` live here.
    Transport(TransportError),
    /// Long header with a packet type or version this crate does not process.
    UnsupportedPacket,
    /// Cryptographic operation failed for a reason other than authentication.
    Crypto,
    /// Caller-provided buffer too small.
    BufferTooSmall { needed: usize },
    /// Invalid state for the requested operation.
    InvalidState,
}

impl Error {
    /// True for errors that discard a single packet and leave the
    /// connection usable. The connection layer decides what repeated
    /// failures mean.
    pub fn is_packet_local(&self) -> bool {
        matches!(
            self,
            Error::Format | Error::Authentication | Error::UnsupportedPacket
        )
    }

    /// The QUIC error code to close the connection with, if this error is
    /// connection-fatal.
    pub fn transport_code(&self) -> Option<u64> {
        match self {
            Error::Transport(e) => Some(e.to_code()),
            Error::Handshake(e) => Some(TransportError::crypto_error(e.alert().to_u8())),
            Error::Crypto | Error::InvalidState => Some(TransportError::InternalError.to_code()),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<HandshakeError> for Error {
    fn from(e: HandshakeError) -> Self {
        Error::Handshake(e)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Format => write!(f, "malformed packet or message"),
            Error::Authentication => write!(f, "authentication failed"),
            Error::Handshake(e) => write!(f, "handshake error: {e:?}"),
            Error::Transport(e) => write!(f, "transport error: {e:?}"),
            Error::UnsupportedPacket => write!(f, "unsupported packet type or version"),
            Error::Crypto => write!(f, "cryptographic error"),
            Error::BufferTooSmall { needed } => {
                write!(f, "buffer too small, need {needed} bytes")
            }
            Error::InvalidState => write!(f, "invalid state"),
        }
    }
}

impl std::error::Error for Error {}
