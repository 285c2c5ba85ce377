//! Client side of the handshake.
//!
//! ```text
//! Start -> WaitServerHello -> WaitHandshake -> Connected
//!                  \________________\______-> Failed
//! ```
//!
//! The ServerHello must be handed over whole. The server's Handshake-level
//! flight (EncryptedExtensions, Certificate, CertificateVerify, Finished)
//! may arrive in pieces and is buffered until complete.

use rand_core::{CryptoRngCore, RngCore};
use tracing::{debug, warn};
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::crypto::rsa_pss::{extract_rsa_public_key, verify_certificate_verify, RSA_PSS_RSAE_SHA256};
use crate::crypto::{Aead, Role};
use crate::error::{Error, HandshakeError, TransportError};
use crate::tls::config::ClientConfig;
use crate::tls::extensions::{
    find, Extension, KeyShareEntry, GROUP_X25519, PSK_DHE_KE, TLS13,
};
use crate::tls::key_schedule_tls::{finished_verify_data, ApplicationSecrets, HandshakeSecrets};
use crate::tls::messages::{
    CipherSuite, ClientHello, EncryptedExtensions, Finished, HandshakeMessage,
};
use crate::tls::transcript::Transcript;
use crate::tls::transport_params::TransportParameters;
use crate::tls::{ct_eq, split_flight, Progress, MAX_HANDSHAKE_BUFFER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    Start,
    WaitServerHello,
    WaitHandshake,
    Connected,
    Failed,
}

/// What the client sends and installs once the server flight checks out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFinished {
    /// Framed client Finished, to be sent at the Handshake level.
    pub finished: Vec<u8>,
    /// 1-RTT keys.
    pub aead: Aead,
}

/// TLS 1.3 client state machine.
pub struct ClientSession {
    config: ClientConfig,
    state: ClientState,
    key_share: Option<EphemeralSecret>,
    session_id: Vec<u8>,
    transcript: Transcript,
    handshake: Option<HandshakeSecrets>,
    application: Option<ApplicationSecrets>,
    buffer: heapless::Vec<u8, MAX_HANDSHAKE_BUFFER>,
    peer_params: Option<TransportParameters>,
    alpn: Option<Vec<u8>>,
    peer_certificate: Option<Vec<u8>>,
}

impl ClientSession {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: ClientState::Start,
            key_share: None,
            // QUIC forbids the middlebox compatibility mode.
            session_id: Vec::new(),
            transcript: Transcript::new(),
            handshake: None,
            application: None,
            buffer: heapless::Vec::new(),
            peer_params: None,
            alpn: None,
            peer_certificate: None,
        }
    }

    /// Generate the ephemeral key share and build the ClientHello. The
    /// returned bytes go out at the Initial level.
    pub fn start<R: CryptoRngCore>(&mut self, rng: &mut R) -> Result<Vec<u8>, Error> {
        self.expect_state(ClientState::Start)?;
        let result = self.build_client_hello(rng);
        self.track(result, ClientState::WaitServerHello)
    }

    /// Process the ServerHello and return the Handshake-level keys.
    pub fn handle_server_hello(&mut self, bytes: &[u8]) -> Result<Aead, Error> {
        self.expect_state(ClientState::WaitServerHello)?;
        let result = self.process_server_hello(bytes);
        self.track(result, ClientState::WaitHandshake)
    }

    /// Feed Handshake-level CRYPTO data from the server.
    ///
    /// Returns [`Progress::Incomplete`] until the whole flight is buffered.
    /// On success the caller sends `finished` and installs the 1-RTT keys.
    pub fn handle_handshake(&mut self, bytes: &[u8]) -> Result<Progress<ClientFinished>, Error> {
        self.expect_state(ClientState::WaitHandshake)?;
        if self.buffer.extend_from_slice(bytes).is_err() {
            let result = Err(Error::Transport(TransportError::CryptoBufferExceeded));
            return self.track(result, ClientState::WaitHandshake);
        }
        let result = self.process_server_flight();
        match result {
            Ok(Progress::Incomplete) => {
                debug!(buffered = self.buffer.len(), "server flight incomplete");
                Ok(Progress::Incomplete)
            }
            other => self.track(other, ClientState::Connected),
        }
    }

    /// Advance the 1-RTT keys one key phase. `current` is the AEAD in use.
    pub fn next_one_rtt_generation(&mut self, current: &Aead) -> Result<Aead, Error> {
        self.expect_state(ClientState::Connected)?;
        let app = self.application.as_mut().ok_or(Error::InvalidState)?;
        let next = app.next_aead(Role::Client, current)?;
        debug!(generation = app.generation(), "client key update");
        Ok(next)
    }

    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    pub fn is_failed(&self) -> bool {
        self.state == ClientState::Failed
    }

    /// Transport parameters announced by the server.
    pub fn peer_transport_params(&self) -> Option<&TransportParameters> {
        self.peer_params.as_ref()
    }

    /// The protocol the server selected from our ALPN offer.
    pub fn alpn(&self) -> Option<&[u8]> {
        self.alpn.as_deref()
    }

    /// DER of the server's leaf certificate.
    pub fn peer_certificate(&self) -> Option<&[u8]> {
        self.peer_certificate.as_deref()
    }

    fn expect_state(&self, expected: ClientState) -> Result<(), Error> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState)
        }
    }

    /// Move to `next` on success; any error is terminal.
    fn track<T>(&mut self, result: Result<T, Error>, next: ClientState) -> Result<T, Error> {
        match &result {
            Ok(_) => {
                debug!(from = ?self.state, to = ?next, "client state");
                self.state = next;
            }
            Err(e) => {
                warn!(state = ?self.state, error = %e, "client handshake failed");
                self.state = ClientState::Failed;
                self.key_share = None;
                self.handshake = None;
                self.application = None;
                self.buffer.clear();
            }
        }
        result
    }

    fn build_client_hello<R: CryptoRngCore>(&mut self, rng: &mut R) -> Result<Vec<u8>, Error> {
        let secret = EphemeralSecret::random_from_rng(&mut *rng);
        let public = PublicKey::from(&secret);
        let mut random = [0u8; 32];
        rng.fill_bytes(&mut random);

        let mut params = Vec::new();
        self.config
            .transport_params
            .encode(self.config.framing, &mut params)?;

        let mut extensions = Vec::new();
        if !self.config.server_name.is_empty() {
            extensions.push(Extension::ServerName(self.config.server_name.clone()));
        }
        extensions.push(Extension::SupportedGroups(vec![GROUP_X25519]));
        extensions.push(Extension::SignatureAlgorithms(vec![RSA_PSS_RSAE_SHA256]));
        if !self.config.alpn_protocols.is_empty() {
            extensions.push(Extension::Alpn(self.config.alpn_protocols.clone()));
        }
        extensions.push(Extension::ClientKeyShare(vec![KeyShareEntry {
            group: GROUP_X25519,
            key_exchange: public.as_bytes().to_vec(),
        }]));
        extensions.push(Extension::PskKeyExchangeModes(vec![PSK_DHE_KE]));
        extensions.push(Extension::ClientSupportedVersions(vec![TLS13]));
        extensions.push(Extension::TransportParameters(params));

        let hello = HandshakeMessage::ClientHello(ClientHello {
            random,
            session_id: self.session_id.clone(),
            cipher_suites: vec![CipherSuite::TlsAes128GcmSha256.to_u16()],
            extensions,
        })
        .encode()?;

        self.transcript.append(&hello);
        self.key_share = Some(secret);
        debug!(len = hello.len(), "built ClientHello");
        Ok(hello)
    }

    fn process_server_hello(&mut self, bytes: &[u8]) -> Result<Aead, Error> {
        let HandshakeMessage::ServerHello(hello) = HandshakeMessage::decode(bytes)? else {
            return Err(HandshakeError::UnexpectedMessage.into());
        };

        if hello.session_id != self.session_id {
            return Err(HandshakeError::IllegalParameter.into());
        }
        if CipherSuite::from_u16(hello.cipher_suite) != Some(CipherSuite::TlsAes128GcmSha256) {
            return Err(HandshakeError::UnsupportedCipherSuite.into());
        }
        let version = find(&hello.extensions, |e| match e {
            Extension::ServerSupportedVersion(v) => Some(*v),
            _ => None,
        });
        if version != Some(TLS13) {
            return Err(HandshakeError::UnsupportedVersion.into());
        }
        let share = find(&hello.extensions, |e| match e {
            Extension::ServerKeyShare(entry) => Some(entry),
            _ => None,
        })
        .ok_or(HandshakeError::MissingKeyShare)?;
        if share.group != GROUP_X25519 {
            return Err(HandshakeError::MissingKeyShare.into());
        }
        let peer: [u8; 32] = share
            .key_exchange
            .as_slice()
            .try_into()
            .map_err(|_| HandshakeError::InvalidKeyShare)?;

        let secret = self.key_share.take().ok_or(Error::InvalidState)?;
        let shared = secret.diffie_hellman(&PublicKey::from(peer));
        if !shared.was_contributory() {
            return Err(HandshakeError::InvalidKeyShare.into());
        }

        self.transcript.append(bytes);
        let secrets = HandshakeSecrets::derive(shared.as_bytes(), &self.transcript.current_hash())?;
        let aead = secrets.aead(Role::Client)?;
        self.handshake = Some(secrets);
        debug!("ServerHello accepted, handshake keys ready");
        Ok(aead)
    }

    fn process_server_flight(&mut self) -> Result<Progress<ClientFinished>, Error> {
        if split_flight::<4>(&self.buffer).is_none() {
            return Ok(Progress::Incomplete);
        }
        let buffer = core::mem::take(&mut self.buffer);
        let Some(([ee, cert, cv, fin], used)) = split_flight::<4>(&buffer) else {
            return Err(Error::InvalidState);
        };
        if used != buffer.len() {
            return Err(HandshakeError::UnexpectedMessage.into());
        }

        let HandshakeMessage::EncryptedExtensions(ee_msg) = HandshakeMessage::decode(ee)? else {
            return Err(HandshakeError::UnexpectedMessage.into());
        };
        self.process_encrypted_extensions(&ee_msg)?;
        self.transcript.append(ee);

        let HandshakeMessage::Certificate(cert_msg) = HandshakeMessage::decode(cert)? else {
            return Err(HandshakeError::UnexpectedMessage.into());
        };
        let leaf = cert_msg
            .entries
            .first()
            .map(|entry| entry.cert_data.as_slice())
            .ok_or(HandshakeError::BadCertificate)?;
        let pins = &self.config.pinned_certificates;
        if !pins.is_empty() && !pins.iter().any(|pin| pin.as_slice() == leaf) {
            return Err(HandshakeError::UntrustedCertificate.into());
        }
        let public_key = extract_rsa_public_key(leaf)?;
        self.peer_certificate = Some(leaf.to_vec());
        self.transcript.append(cert);

        let HandshakeMessage::CertificateVerify(cv_msg) = HandshakeMessage::decode(cv)? else {
            return Err(HandshakeError::UnexpectedMessage.into());
        };
        if cv_msg.algorithm != RSA_PSS_RSAE_SHA256 {
            return Err(HandshakeError::IllegalParameter.into());
        }
        verify_certificate_verify(&public_key, &cv_msg.signature, &self.transcript.current_hash())?;
        self.transcript.append(cv);

        let HandshakeMessage::Finished(server_fin) = HandshakeMessage::decode(fin)? else {
            return Err(HandshakeError::UnexpectedMessage.into());
        };
        let secrets = self.handshake.take().ok_or(Error::InvalidState)?;
        let expected = finished_verify_data(secrets.server(), &self.transcript.current_hash())?;
        if !ct_eq(&expected, &server_fin.verify_data) {
            return Err(HandshakeError::InvalidFinished.into());
        }
        self.transcript.append(fin);

        let hash = self.transcript.current_hash();
        let application = secrets.application_secrets(&hash)?;
        let aead = application.aead(Role::Client)?;
        let verify_data = finished_verify_data(secrets.client(), &hash)?;
        let finished = HandshakeMessage::Finished(Finished { verify_data }).encode()?;
        self.transcript.append(&finished);
        self.application = Some(application);

        debug!(flight_len = used, "server flight verified, 1-RTT keys ready");
        Ok(Progress::Done(ClientFinished { finished, aead }))
    }

    fn process_encrypted_extensions(&mut self, ee: &EncryptedExtensions) -> Result<(), Error> {
        let selected = find(&ee.extensions, |e| match e {
            Extension::Alpn(protocols) => Some(protocols),
            _ => None,
        });
        match selected {
            Some(protocols) => {
                let [protocol] = protocols.as_slice() else {
                    return Err(HandshakeError::IllegalParameter.into());
                };
                if !self.config.alpn_protocols.contains(protocol) {
                    return Err(HandshakeError::IllegalParameter.into());
                }
                self.alpn = Some(protocol.clone());
            }
            None if !self.config.alpn_protocols.is_empty() => {
                return Err(HandshakeError::NoApplicationProtocol.into());
            }
            None => {}
        }

        let raw = find(&ee.extensions, |e| match e {
            Extension::TransportParameters(raw) => Some(raw),
            _ => None,
        })
        .ok_or(HandshakeError::MissingTransportParameters)?;
        self.peer_params = Some(TransportParameters::decode(raw, self.config.framing)?);
        Ok(())
    }
}

impl core::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClientSession")
            .field("state", &self.state)
            .field("transcript", &self.transcript)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::extensions::ExtensionContext;
    use crate::tls::messages::ServerHello;
    use rand_core::OsRng;

    fn started() -> (ClientSession, ClientHello) {
        let mut client = ClientSession::new(ClientConfig::new("example.com").with_alpn(&[b"h3"]));
        let bytes = client.start(&mut OsRng).unwrap();
        let HandshakeMessage::ClientHello(hello) = HandshakeMessage::decode(&bytes).unwrap() else {
            panic!("expected ClientHello");
        };
        (client, hello)
    }

    fn server_hello(key_exchange: Vec<u8>, version: u16) -> Vec<u8> {
        HandshakeMessage::ServerHello(ServerHello {
            random: [7; 32],
            session_id: Vec::new(),
            cipher_suite: CipherSuite::TlsAes128GcmSha256.to_u16(),
            extensions: vec![
                Extension::ServerSupportedVersion(version),
                Extension::ServerKeyShare(KeyShareEntry {
                    group: GROUP_X25519,
                    key_exchange,
                }),
            ],
        })
        .encode()
        .unwrap()
    }

    #[test]
    fn client_hello_carries_required_extensions() {
        let (client, hello) = started();
        assert!(hello.session_id.is_empty());
        assert_eq!(hello.cipher_suites, vec![0x1301]);
        let types: Vec<u16> = hello.extensions.iter().map(Extension::ext_type).collect();
        for ext in [0x0000, 0x000a, 0x000d, 0x0010, 0x0033, 0x002d, 0x002b, 0x0039] {
            assert!(types.contains(&ext), "missing extension {ext:#06x}");
        }
        let raw = find(&hello.extensions, |e| match e {
            Extension::TransportParameters(raw) => Some(raw),
            _ => None,
        })
        .unwrap();
        let params = TransportParameters::decode(raw, Default::default()).unwrap();
        assert_eq!(params, TransportParameters::default_params());
        assert!(!client.transcript.is_empty());
    }

    #[test]
    fn client_hello_reparses_in_client_hello_context() {
        let (_, hello) = started();
        let mut block = Vec::new();
        crate::tls::extensions::encode_extensions(&hello.extensions, &mut block).unwrap();
        let parsed = crate::tls::extensions::parse_extensions(&block[2..], ExtensionContext::ClientHello).unwrap();
        assert_eq!(parsed, hello.extensions);
    }

    #[test]
    fn start_twice_is_invalid() {
        let (mut client, _) = started();
        assert_eq!(client.start(&mut OsRng).unwrap_err(), Error::InvalidState);
    }

    #[test]
    fn accepts_valid_server_hello() {
        let (mut client, _) = started();
        let server = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&server);
        let aead = client
            .handle_server_hello(&server_hello(public.as_bytes().to_vec(), TLS13))
            .unwrap();
        assert_ne!(aead.own(), aead.peer());
        assert_eq!(client.state, ClientState::WaitHandshake);
    }

    #[test]
    fn rejects_wrong_version() {
        let (mut client, _) = started();
        let public = PublicKey::from(&EphemeralSecret::random_from_rng(OsRng));
        let err = client
            .handle_server_hello(&server_hello(public.as_bytes().to_vec(), 0x0303))
            .unwrap_err();
        assert_eq!(err, Error::Handshake(HandshakeError::UnsupportedVersion));
        assert!(client.is_failed());
        assert_eq!(client.handle_handshake(&[]).unwrap_err(), Error::InvalidState);
    }

    #[test]
    fn rejects_low_order_key_share() {
        let (mut client, _) = started();
        let err = client
            .handle_server_hello(&server_hello(vec![0; 32], TLS13))
            .unwrap_err();
        assert_eq!(err, Error::Handshake(HandshakeError::InvalidKeyShare));
    }

    #[test]
    fn rejects_session_id_mismatch() {
        let (mut client, _) = started();
        let public = PublicKey::from(&EphemeralSecret::random_from_rng(OsRng));
        let mut hello = server_hello(public.as_bytes().to_vec(), TLS13);
        let HandshakeMessage::ServerHello(mut sh) = HandshakeMessage::decode(&hello).unwrap() else {
            unreachable!()
        };
        sh.session_id = vec![1; 8];
        hello = HandshakeMessage::ServerHello(sh).encode().unwrap();
        assert_eq!(
            client.handle_server_hello(&hello).unwrap_err(),
            Error::Handshake(HandshakeError::IllegalParameter)
        );
    }

    #[test]
    fn client_hello_is_not_a_server_hello() {
        let (mut client, _) = started();
        let (_, hello) = started();
        let bytes = HandshakeMessage::ClientHello(hello).encode().unwrap();
        assert_eq!(
            client.handle_server_hello(&bytes).unwrap_err(),
            Error::Handshake(HandshakeError::UnexpectedMessage)
        );
    }
}
