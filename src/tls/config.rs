//! Handshake configuration for both endpoints.

use std::sync::Arc;

use rand_core::CryptoRngCore;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;

use crate::crypto::rsa_pss::{extract_rsa_public_key, sign_certificate_verify, RSA_PSS_RSAE_SHA256};
use crate::error::{Error, HandshakeError};
use crate::tls::transport_params::{ParameterFraming, TransportParameters};

/// Supplies the server's certificate chain and CertificateVerify
/// signatures.
pub trait CertificateProvider: Send + Sync {
    /// DER certificates, leaf first. Must not be empty.
    fn certificate_chain(&self) -> &[Vec<u8>];

    /// TLS SignatureScheme used by [`sign`](Self::sign).
    fn signature_scheme(&self) -> u16 {
        RSA_PSS_RSAE_SHA256
    }

    /// Sign the server CertificateVerify content for `transcript_hash`
    /// (the hash through the Certificate message).
    fn sign(&self, transcript_hash: &[u8; 32], rng: &mut dyn CryptoRngCore) -> Result<Vec<u8>, Error>;
}

/// An RSA key and the certificate chain it belongs to.
pub struct RsaIdentity {
    chain: Vec<Vec<u8>>,
    key: RsaPrivateKey,
}

impl RsaIdentity {
    /// Pair a chain with its key. Fails with `BadCertificate` when the
    /// chain is empty or the leaf's RSA key does not match `key`.
    pub fn new(chain: Vec<Vec<u8>>, key: RsaPrivateKey) -> Result<Self, Error> {
        let leaf = chain
            .first()
            .ok_or(Error::Handshake(HandshakeError::BadCertificate))?;
        if extract_rsa_public_key(leaf)? != key.to_public_key() {
            return Err(Error::Handshake(HandshakeError::BadCertificate));
        }
        Ok(Self { chain, key })
    }

    /// Build from a DER chain and a PKCS#8 DER private key.
    pub fn from_pkcs8_der(chain: Vec<Vec<u8>>, key_der: &[u8]) -> Result<Self, Error> {
        let key = RsaPrivateKey::from_pkcs8_der(key_der).map_err(|_| Error::Crypto)?;
        Self::new(chain, key)
    }
}

impl CertificateProvider for RsaIdentity {
    fn certificate_chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    fn sign(&self, transcript_hash: &[u8; 32], mut rng: &mut dyn CryptoRngCore) -> Result<Vec<u8>, Error> {
        sign_certificate_verify(&self.key, transcript_hash, &mut rng)
    }
}

impl core::fmt::Debug for RsaIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RsaIdentity")
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// Client-side handshake configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Sent as SNI when not empty.
    pub server_name: String,
    /// Offered ALPN protocols, in preference order. Empty disables ALPN.
    pub alpn_protocols: Vec<Vec<u8>>,
    pub transport_params: TransportParameters,
    pub framing: ParameterFraming,
    /// DER certificates the server leaf must match. Empty accepts any
    /// certificate whose key verifies the CertificateVerify signature.
    pub pinned_certificates: Vec<Vec<u8>>,
}

impl ClientConfig {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            alpn_protocols: Vec::new(),
            transport_params: TransportParameters::default_params(),
            framing: ParameterFraming::default(),
            pinned_certificates: Vec::new(),
        }
    }

    pub fn with_alpn(mut self, protocols: &[&[u8]]) -> Self {
        self.alpn_protocols = protocols.iter().map(|p| p.to_vec()).collect();
        self
    }

    pub fn with_pinned_certificate(mut self, der: Vec<u8>) -> Self {
        self.pinned_certificates.push(der);
        self
    }
}

/// Server-side handshake configuration.
#[derive(Clone)]
pub struct ServerConfig {
    pub identity: Arc<dyn CertificateProvider>,
    /// Supported ALPN protocols, in preference order. When not empty, a
    /// client must offer one of them.
    pub alpn_protocols: Vec<Vec<u8>>,
    pub transport_params: TransportParameters,
    pub framing: ParameterFraming,
}

impl ServerConfig {
    pub fn new(identity: Arc<dyn CertificateProvider>) -> Self {
        Self {
            identity,
            alpn_protocols: Vec::new(),
            transport_params: TransportParameters::default_params(),
            framing: ParameterFraming::default(),
        }
    }

    pub fn with_alpn(mut self, protocols: &[&[u8]]) -> Self {
        self.alpn_protocols = protocols.iter().map(|p| p.to_vec()).collect();
        self
    }
}

impl core::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("alpn_protocols", &self.alpn_protocols)
            .field("transport_params", &self.transport_params)
            .field("framing", &self.framing)
            .finish_non_exhaustive()
    }
}
