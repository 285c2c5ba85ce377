//! Server side of the handshake.
//!
//! The ClientHello is answered in one go: ServerHello for the Initial
//! level, then EncryptedExtensions, Certificate, CertificateVerify and
//! Finished for the Handshake level. The 1-RTT keys are derived at that
//! point but only handed out once the client's Finished verifies.

use rand_core::{CryptoRngCore, RngCore};
use tracing::{debug, warn};
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::crypto::{Aead, Role};
use crate::error::{Error, HandshakeError, TransportError};
use crate::tls::config::ServerConfig;
use crate::tls::extensions::{find, Extension, KeyShareEntry, GROUP_X25519, TLS13};
use crate::tls::key_schedule_tls::{finished_verify_data, ApplicationSecrets, HandshakeSecrets};
use crate::tls::messages::{
    split_message, Certificate, CertificateEntry, CertificateVerify, CipherSuite, ClientHello,
    EncryptedExtensions, Finished, HandshakeMessage, ServerHello,
};
use crate::tls::transcript::Transcript;
use crate::tls::transport_params::TransportParameters;
use crate::tls::{ct_eq, Progress, MAX_HANDSHAKE_BUFFER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    WaitClientHello,
    WaitClientFinished,
    Connected,
    Failed,
}

/// The server's answer to a ClientHello.
#[derive(Debug)]
pub struct ServerFlight {
    /// Framed ServerHello, sent at the Initial level.
    pub server_hello: Vec<u8>,
    /// EncryptedExtensions, Certificate, CertificateVerify and Finished,
    /// sent at the Handshake level.
    pub handshake: Vec<u8>,
    pub handshake_aead: Aead,
}

/// TLS 1.3 server state machine.
pub struct ServerSession {
    config: ServerConfig,
    state: ServerState,
    transcript: Transcript,
    handshake: Option<HandshakeSecrets>,
    application: Option<ApplicationSecrets>,
    buffer: heapless::Vec<u8, MAX_HANDSHAKE_BUFFER>,
    peer_params: Option<TransportParameters>,
    alpn: Option<Vec<u8>>,
}

/// What the ClientHello offered that the server acts on.
struct Offer {
    key_share: [u8; 32],
    params: TransportParameters,
    alpn: Option<Vec<u8>>,
}

impl ServerSession {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: ServerState::WaitClientHello,
            transcript: Transcript::new(),
            handshake: None,
            application: None,
            buffer: heapless::Vec::new(),
            peer_params: None,
            alpn: None,
        }
    }

    /// Validate the ClientHello and produce the whole server flight.
    pub fn handle_client_hello<R: CryptoRngCore>(
        &mut self,
        bytes: &[u8],
        rng: &mut R,
    ) -> Result<ServerFlight, Error> {
        self.expect_state(ServerState::WaitClientHello)?;
        let result = self.respond(bytes, rng);
        self.track(result, ServerState::WaitClientFinished)
    }

    /// Feed Handshake-level CRYPTO data from the client. Returns the 1-RTT
    /// keys once the client Finished has been verified.
    pub fn handle_client_finished(&mut self, bytes: &[u8]) -> Result<Progress<Aead>, Error> {
        self.expect_state(ServerState::WaitClientFinished)?;
        if self.buffer.extend_from_slice(bytes).is_err() {
            let result = Err(Error::Transport(TransportError::CryptoBufferExceeded));
            return self.track(result, ServerState::WaitClientFinished);
        }
        match self.verify_client_finished() {
            Ok(Progress::Incomplete) => {
                debug!(buffered = self.buffer.len(), "client Finished incomplete");
                Ok(Progress::Incomplete)
            }
            other => self.track(other, ServerState::Connected),
        }
    }

    /// Advance the 1-RTT keys one key phase. `current` is the AEAD in use.
    pub fn next_one_rtt_generation(&mut self, current: &Aead) -> Result<Aead, Error> {
        self.expect_state(ServerState::Connected)?;
        let app = self.application.as_mut().ok_or(Error::InvalidState)?;
        let next = app.next_aead(Role::Server, current)?;
        debug!(generation = app.generation(), "server key update");
        Ok(next)
    }

    pub fn is_connected(&self) -> bool {
        self.state == ServerState::Connected
    }

    pub fn is_failed(&self) -> bool {
        self.state == ServerState::Failed
    }

    /// Transport parameters announced by the client.
    pub fn peer_transport_params(&self) -> Option<&TransportParameters> {
        self.peer_params.as_ref()
    }

    /// The negotiated application protocol.
    pub fn alpn(&self) -> Option<&[u8]> {
        self.alpn.as_deref()
    }

    fn expect_state(&self, expected: ServerState) -> Result<(), Error> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState)
        }
    }

    fn track<T>(&mut self, result: Result<T, Error>, next: ServerState) -> Result<T, Error> {
        match &result {
            Ok(_) => {
                debug!(from = ?self.state, to = ?next, "server state");
                self.state = next;
            }
            Err(e) => {
                warn!(state = ?self.state, error = %e, "server handshake failed");
                self.state = ServerState::Failed;
                self.handshake = None;
                self.application = None;
                self.buffer.clear();
            }
        }
        result
    }

    fn check_offer(&self, hello: &ClientHello) -> Result<Offer, Error> {
        // RFC 9001 section 8.4: no middlebox compatibility mode.
        if !hello.session_id.is_empty() {
            return Err(Error::Transport(TransportError::ProtocolViolation));
        }
        if !hello
            .cipher_suites
            .contains(&CipherSuite::TlsAes128GcmSha256.to_u16())
        {
            return Err(HandshakeError::UnsupportedCipherSuite.into());
        }

        let versions = find(&hello.extensions, |e| match e {
            Extension::ClientSupportedVersions(v) => Some(v),
            _ => None,
        });
        if !versions.is_some_and(|v| v.contains(&TLS13)) {
            return Err(HandshakeError::UnsupportedVersion.into());
        }

        let scheme = self.config.identity.signature_scheme();
        let schemes = find(&hello.extensions, |e| match e {
            Extension::SignatureAlgorithms(v) => Some(v),
            _ => None,
        });
        if !schemes.is_some_and(|v| v.contains(&scheme)) {
            return Err(HandshakeError::NoCommonSignatureScheme.into());
        }

        let entry = find(&hello.extensions, |e| match e {
            Extension::ClientKeyShare(entries) => entries.iter().find(|k| k.group == GROUP_X25519),
            _ => None,
        })
        .ok_or(HandshakeError::MissingKeyShare)?;
        let key_share: [u8; 32] = entry
            .key_exchange
            .as_slice()
            .try_into()
            .map_err(|_| HandshakeError::InvalidKeyShare)?;

        let raw = find(&hello.extensions, |e| match e {
            Extension::TransportParameters(raw) => Some(raw),
            _ => None,
        })
        .ok_or(HandshakeError::MissingTransportParameters)?;
        let params = TransportParameters::decode(raw, self.config.framing)?;
        params.check_sent_by_client()?;

        let alpn = if self.config.alpn_protocols.is_empty() {
            None
        } else {
            let offered = find(&hello.extensions, |e| match e {
                Extension::Alpn(protocols) => Some(protocols),
                _ => None,
            })
            .ok_or(HandshakeError::NoApplicationProtocol)?;
            let selected = self
                .config
                .alpn_protocols
                .iter()
                .find(|p| offered.contains(p))
                .ok_or(HandshakeError::NoApplicationProtocol)?;
            Some(selected.clone())
        };

        Ok(Offer {
            key_share,
            params,
            alpn,
        })
    }

    fn respond<R: CryptoRngCore>(&mut self, bytes: &[u8], rng: &mut R) -> Result<ServerFlight, Error> {
        let HandshakeMessage::ClientHello(hello) = HandshakeMessage::decode(bytes)? else {
            return Err(HandshakeError::UnexpectedMessage.into());
        };
        let offer = self.check_offer(&hello)?;
        self.transcript.append(bytes);

        let secret = EphemeralSecret::random_from_rng(&mut *rng);
        let public = PublicKey::from(&secret);
        let shared = secret.diffie_hellman(&PublicKey::from(offer.key_share));
        if !shared.was_contributory() {
            return Err(HandshakeError::InvalidKeyShare.into());
        }

        let mut random = [0u8; 32];
        rng.fill_bytes(&mut random);
        let server_hello = HandshakeMessage::ServerHello(ServerHello {
            random,
            session_id: hello.session_id.clone(),
            cipher_suite: CipherSuite::TlsAes128GcmSha256.to_u16(),
            extensions: vec![
                Extension::ServerSupportedVersion(TLS13),
                Extension::ServerKeyShare(KeyShareEntry {
                    group: GROUP_X25519,
                    key_exchange: public.as_bytes().to_vec(),
                }),
            ],
        })
        .encode()?;
        self.transcript.append(&server_hello);
        let secrets = HandshakeSecrets::derive(shared.as_bytes(), &self.transcript.current_hash())?;

        let mut params = Vec::new();
        self.config
            .transport_params
            .encode(self.config.framing, &mut params)?;
        let mut extensions = Vec::new();
        if let Some(protocol) = &offer.alpn {
            extensions.push(Extension::Alpn(vec![protocol.clone()]));
        }
        extensions.push(Extension::TransportParameters(params));

        let mut handshake =
            HandshakeMessage::EncryptedExtensions(EncryptedExtensions { extensions }).encode()?;
        self.transcript.append(&handshake);

        let identity = self.config.identity.clone();
        let entries = identity
            .certificate_chain()
            .iter()
            .map(|der| CertificateEntry {
                cert_data: der.clone(),
                extensions: Vec::new(),
            })
            .collect::<Vec<_>>();
        if entries.is_empty() {
            return Err(HandshakeError::BadCertificate.into());
        }
        let certificate = HandshakeMessage::Certificate(Certificate {
            context: Vec::new(),
            entries,
        })
        .encode()?;
        self.transcript.append(&certificate);
        handshake.extend_from_slice(&certificate);

        let signature = identity.sign(&self.transcript.current_hash(), rng)?;
        let certificate_verify = HandshakeMessage::CertificateVerify(CertificateVerify {
            algorithm: identity.signature_scheme(),
            signature,
        })
        .encode()?;
        self.transcript.append(&certificate_verify);
        handshake.extend_from_slice(&certificate_verify);

        let verify_data = finished_verify_data(secrets.server(), &self.transcript.current_hash())?;
        let finished = HandshakeMessage::Finished(Finished { verify_data }).encode()?;
        self.transcript.append(&finished);
        handshake.extend_from_slice(&finished);

        let handshake_aead = secrets.aead(Role::Server)?;
        self.application = Some(secrets.application_secrets(&self.transcript.current_hash())?);
        self.handshake = Some(secrets);
        self.peer_params = Some(offer.params);
        self.alpn = offer.alpn;

        debug!(
            server_hello = server_hello.len(),
            handshake = handshake.len(),
            "server flight built"
        );
        Ok(ServerFlight {
            server_hello,
            handshake,
            handshake_aead,
        })
    }

    fn verify_client_finished(&mut self) -> Result<Progress<Aead>, Error> {
        let Some((_, msg, rest)) = split_message(&self.buffer) else {
            return Ok(Progress::Incomplete);
        };
        if !rest.is_empty() {
            return Err(HandshakeError::UnexpectedMessage.into());
        }
        let HandshakeMessage::Finished(fin) = HandshakeMessage::decode(msg)? else {
            return Err(HandshakeError::UnexpectedMessage.into());
        };

        let secrets = self.handshake.take().ok_or(Error::InvalidState)?;
        let expected = finished_verify_data(secrets.client(), &self.transcript.current_hash())?;
        if !ct_eq(&expected, &fin.verify_data) {
            return Err(HandshakeError::InvalidFinished.into());
        }
        let aead = self
            .application
            .as_ref()
            .ok_or(Error::InvalidState)?
            .aead(Role::Server)?;
        let finished = core::mem::take(&mut self.buffer);
        self.transcript.append(&finished);
        debug!("client Finished verified, 1-RTT keys released");
        Ok(Progress::Done(aead))
    }
}

impl core::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServerSession")
            .field("state", &self.state)
            .field("transcript", &self.transcript)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::config::{ClientConfig, RsaIdentity};
    use crate::tls::ClientSession;
    use rand_core::OsRng;
    use std::sync::Arc;

    const CERT: &[u8] = include_bytes!("../../testdata/server.cert.der");
    const KEY: &[u8] = include_bytes!("../../testdata/server.key.der");

    fn server_config() -> ServerConfig {
        let identity = RsaIdentity::from_pkcs8_der(vec![CERT.to_vec()], KEY).unwrap();
        ServerConfig::new(Arc::new(identity)).with_alpn(&[b"h3"])
    }

    fn client_hello_with(config: ClientConfig) -> Vec<u8> {
        ClientSession::new(config).start(&mut OsRng).unwrap()
    }

    fn edit_hello(bytes: &[u8], f: impl FnOnce(&mut ClientHello)) -> Vec<u8> {
        let HandshakeMessage::ClientHello(mut hello) = HandshakeMessage::decode(bytes).unwrap() else {
            panic!("expected ClientHello");
        };
        f(&mut hello);
        HandshakeMessage::ClientHello(hello).encode().unwrap()
    }

    #[test]
    fn answers_client_hello_with_full_flight() {
        let hello = client_hello_with(ClientConfig::new("localhost").with_alpn(&[b"h3"]));
        let mut server = ServerSession::new(server_config());
        let flight = server.handle_client_hello(&hello, &mut OsRng).unwrap();

        let mut rest = flight.handshake.as_slice();
        let mut types = Vec::new();
        while let Some((ty, _, tail)) = split_message(rest) {
            types.push(ty);
            rest = tail;
        }
        assert!(rest.is_empty());
        assert_eq!(types, vec![8, 11, 15, 20]);
        assert_eq!(server.alpn(), Some(&b"h3"[..]));
        assert!(server.peer_transport_params().is_some());
    }

    #[test]
    fn rejects_missing_alpn_match() {
        let hello = client_hello_with(ClientConfig::new("localhost").with_alpn(&[b"hq-interop"]));
        let mut server = ServerSession::new(server_config());
        assert_eq!(
            server.handle_client_hello(&hello, &mut OsRng).unwrap_err(),
            Error::Handshake(HandshakeError::NoApplicationProtocol)
        );
        assert!(server.is_failed());
    }

    #[test]
    fn rejects_unsupported_suite() {
        let hello = edit_hello(&client_hello_with(ClientConfig::new("localhost").with_alpn(&[b"h3"])), |h| {
            h.cipher_suites = vec![0x1302, 0x1303];
        });
        let mut server = ServerSession::new(server_config());
        assert_eq!(
            server.handle_client_hello(&hello, &mut OsRng).unwrap_err(),
            Error::Handshake(HandshakeError::UnsupportedCipherSuite)
        );
    }

    #[test]
    fn rejects_missing_transport_parameters() {
        let hello = edit_hello(&client_hello_with(ClientConfig::new("localhost").with_alpn(&[b"h3"])), |h| {
            h.extensions
                .retain(|e| !matches!(e, Extension::TransportParameters(_)));
        });
        let mut server = ServerSession::new(server_config());
        assert_eq!(
            server.handle_client_hello(&hello, &mut OsRng).unwrap_err(),
            Error::Handshake(HandshakeError::MissingTransportParameters)
        );
    }

    #[test]
    fn rejects_session_id() {
        let hello = edit_hello(&client_hello_with(ClientConfig::new("localhost").with_alpn(&[b"h3"])), |h| {
            h.session_id = vec![9; 32];
        });
        let mut server = ServerSession::new(server_config());
        assert_eq!(
            server.handle_client_hello(&hello, &mut OsRng).unwrap_err(),
            Error::Transport(TransportError::ProtocolViolation)
        );
    }

    #[test]
    fn rejects_missing_signature_scheme() {
        let hello = edit_hello(&client_hello_with(ClientConfig::new("localhost").with_alpn(&[b"h3"])), |h| {
            for ext in h.extensions.iter_mut() {
                if let Extension::SignatureAlgorithms(list) = ext {
                    *list = vec![0x0403];
                }
            }
        });
        let mut server = ServerSession::new(server_config());
        assert_eq!(
            server.handle_client_hello(&hello, &mut OsRng).unwrap_err(),
            Error::Handshake(HandshakeError::NoCommonSignatureScheme)
        );
    }

    #[test]
    fn client_finished_before_hello_is_invalid() {
        let mut server = ServerSession::new(server_config());
        assert_eq!(
            server.handle_client_finished(&[20, 0, 0, 32]).unwrap_err(),
            Error::InvalidState
        );
    }
}
