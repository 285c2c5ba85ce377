//! TLS 1.3 key schedule (RFC 8446 section 7.1).
//!
//! The key schedule derives handshake and application traffic secrets
//! from the ECDHE shared secret and transcript hashes.
//!
//! ```text
//!             0
//!             |
//!             v
//!   PSK ->  HKDF-Extract = Early Secret
//!             |
//!             v
//!   ECDHE -> HKDF-Extract = Handshake Secret
//!             |
//!             +-> Derive-Secret(., "c hs traffic", CH..SH)
//!             +-> Derive-Secret(., "s hs traffic", CH..SH)
//!             |
//!             v
//!     0  ->  HKDF-Extract = Master Secret
//!             |
//!             +-> Derive-Secret(., "c ap traffic", CH..SF)
//!             +-> Derive-Secret(., "s ap traffic", CH..SF)
//! ```
//!
//! No PSK is ever used, so the Early Secret and the salt derived from it
//! are constants; they are computed once per process.

use std::sync::LazyLock;

use tracing::trace;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::key_schedule::{
    expand_label, next_application_secret, Secret, TLS13_LABEL_PREFIX,
};
use crate::crypto::rustcrypto::{hkdf_extract, hmac_sha256, sha256, HASH_LEN};
use crate::crypto::{Aead, Role};
use crate::error::Error;

/// Early Secret = HKDF-Extract(salt=0, ikm=0).
static EARLY_SECRET: LazyLock<Secret> =
    LazyLock::new(|| hkdf_extract(&[0u8; HASH_LEN], &[0u8; HASH_LEN]));

/// Derive-Secret(Early Secret, "derived", "").
static DERIVED_SECRET: LazyLock<Result<Secret, Error>> =
    LazyLock::new(|| derive_secret(EARLY_SECRET.as_slice(), b"derived", &sha256(b"")));

pub fn early_secret() -> &'static Secret {
    &EARLY_SECRET
}

/// Salt for the handshake secret extraction.
pub fn derived_secret() -> Result<&'static Secret, Error> {
    DERIVED_SECRET.as_ref().map_err(|e| *e)
}

/// Derive-Secret(secret, label, transcript_hash).
pub fn derive_secret(secret: &[u8], label: &[u8], transcript_hash: &[u8; 32]) -> Result<Secret, Error> {
    let mut out = [0u8; HASH_LEN];
    expand_label(secret, TLS13_LABEL_PREFIX, label, transcript_hash, &mut out)?;
    Ok(out)
}

/// Handshake Secret = HKDF-Extract(salt=derived_secret, ikm=ECDHE).
pub fn calculate_handshake_secret(shared_secret: &[u8; 32]) -> Result<Secret, Error> {
    Ok(hkdf_extract(derived_secret()?, shared_secret))
}

/// finished_key = HKDF-Expand-Label(traffic_secret, "finished", "", 32)
pub fn finished_key(traffic_secret: &Secret) -> Result<Secret, Error> {
    let mut key = [0u8; HASH_LEN];
    expand_label(traffic_secret, TLS13_LABEL_PREFIX, b"finished", &[], &mut key)?;
    Ok(key)
}

/// Finished verify_data = HMAC(finished_key, transcript_hash).
pub fn finished_verify_data(traffic_secret: &Secret, transcript_hash: &[u8; 32]) -> Result<[u8; 32], Error> {
    let mut key = finished_key(traffic_secret)?;
    let verify_data = hmac_sha256(&key, transcript_hash);
    key.zeroize();
    Ok(verify_data)
}

fn aead_for(role: Role, client: &Secret, server: &Secret) -> Result<Aead, Error> {
    match role {
        Role::Client => Aead::from_secrets(client, server),
        Role::Server => Aead::from_secrets(server, client),
    }
}

/// Secrets of the handshake stage. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct HandshakeSecrets {
    handshake_secret: Secret,
    client: Secret,
    server: Secret,
}

impl HandshakeSecrets {
    /// Run the schedule from the ECDHE shared secret to the handshake
    /// traffic secrets. `transcript_hash` covers ClientHello..ServerHello.
    pub fn derive(shared_secret: &[u8; 32], transcript_hash: &[u8; 32]) -> Result<Self, Error> {
        let handshake_secret = calculate_handshake_secret(shared_secret)?;
        let client = derive_secret(&handshake_secret, b"c hs traffic", transcript_hash)?;
        let server = derive_secret(&handshake_secret, b"s hs traffic", transcript_hash)?;
        trace!("derived handshake traffic secrets");
        Ok(Self {
            handshake_secret,
            client,
            server,
        })
    }

    pub fn client(&self) -> &Secret {
        &self.client
    }

    pub fn server(&self) -> &Secret {
        &self.server
    }

    /// The Handshake-level AEAD for `role`.
    pub fn aead(&self, role: Role) -> Result<Aead, Error> {
        aead_for(role, &self.client, &self.server)
    }

    /// Continue to the master secret and the application traffic secrets.
    /// `transcript_hash` covers ClientHello..server Finished.
    pub fn application_secrets(&self, transcript_hash: &[u8; 32]) -> Result<ApplicationSecrets, Error> {
        let mut salt = derive_secret(&self.handshake_secret, b"derived", &sha256(b""))?;
        let mut master = hkdf_extract(&salt, &[0u8; HASH_LEN]);
        salt.zeroize();
        let secrets = ApplicationSecrets::from_master(&master, transcript_hash);
        master.zeroize();
        secrets
    }
}

/// Client and server application traffic secrets of the current 1-RTT
/// key phase. Zeroized on drop and on every update.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ApplicationSecrets {
    client: Secret,
    server: Secret,
    generation: u64,
}

impl ApplicationSecrets {
    fn from_master(master: &Secret, transcript_hash: &[u8; 32]) -> Result<Self, Error> {
        let client = derive_secret(master, b"c ap traffic", transcript_hash)?;
        let server = derive_secret(master, b"s ap traffic", transcript_hash)?;
        trace!("derived application traffic secrets");
        Ok(Self {
            client,
            server,
            generation: 0,
        })
    }

    pub fn client(&self) -> &Secret {
        &self.client
    }

    pub fn server(&self) -> &Secret {
        &self.server
    }

    /// Key phase counter; starts at 0.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The 1-RTT AEAD of the current generation for `role`.
    pub fn aead(&self, role: Role) -> Result<Aead, Error> {
        aead_for(role, &self.client, &self.server)
    }

    /// Advance both secrets one Key Update generation. The superseded
    /// secrets are zeroized.
    pub fn update(&mut self) -> Result<(), Error> {
        let mut client = next_application_secret(&self.client)?;
        let mut server = next_application_secret(&self.server)?;
        self.client.zeroize();
        self.server.zeroize();
        self.client = client;
        self.server = server;
        client.zeroize();
        server.zeroize();
        self.generation += 1;
        Ok(())
    }

    /// Update the secrets and roll `current` into the next key phase,
    /// keeping its header protection keys.
    pub fn next_aead(&mut self, role: Role, current: &Aead) -> Result<Aead, Error> {
        self.update()?;
        match role {
            Role::Client => current.next_generation(&self.client, &self.server),
            Role::Server => current.next_generation(&self.server, &self.client),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    // RFC 8448 section 3, "Simple 1-RTT Handshake".
    const SHARED: [u8; 32] = hex!("8bd4054fb55b9d63fdfbacf9f04b9f0d35e6d63f537563efd46272900f89492d");
    const HASH_CH_SH: [u8; 32] =
        hex!("860c06edc07858ee8e78f0e7428c58edd6b43f2ca3e6e95f02ed063cf0e1cad8");
    const HASH_CH_SF: [u8; 32] =
        hex!("9608102a0f1ccc6db6250b7b7e417b1a000eaada3daae4777a7686c9ff83df13");

    #[test]
    fn rfc8448_early_and_derived() {
        assert_eq!(
            early_secret(),
            &hex!("33ad0a1c607ec03b09e6cd9893680ce210adf300aa1f2660e1b22e10f170f92a")
        );
        assert_eq!(
            derived_secret().unwrap(),
            &hex!("6f2615a108c702c5678f54fc9dbab69716c076189c48250cebeac3576c3611ba")
        );
    }

    #[test]
    fn rfc8448_handshake_secret() {
        assert_eq!(
            calculate_handshake_secret(&SHARED).unwrap(),
            hex!("1dc826e93606aa6fdc0aadc12f741b01046aa6b99f691ed221a9f0ca043fbeac")
        );
    }

    #[test]
    fn rfc8448_traffic_secrets() {
        let hs = HandshakeSecrets::derive(&SHARED, &HASH_CH_SH).unwrap();
        assert_eq!(
            hs.client(),
            &hex!("b3eddb126e067f35a780b3abf45e2d8f3b1a950738f52e9600746a0e27a55a21")
        );
        assert_eq!(
            hs.server(),
            &hex!("b67b7d690cc16c4e75e54213cb2d37b4e9c912bcded9105d42befd59d391ad38")
        );

        let app = hs.application_secrets(&HASH_CH_SF).unwrap();
        assert_eq!(
            app.client(),
            &hex!("9e40646ce79a7f9dc05af8889bce6552875afa0b06df0087f792ebb7c17504a5")
        );
        assert_eq!(
            app.server(),
            &hex!("a11af9f05531f856ad47116b45a950328204b4f44bfb6b3a4b4f1f3fcb631643")
        );
    }

    #[test]
    fn rfc8448_finished() {
        let server_hs = hex!("b67b7d690cc16c4e75e54213cb2d37b4e9c912bcded9105d42befd59d391ad38");
        assert_eq!(
            finished_key(&server_hs).unwrap(),
            hex!("008d3b66f816ea559f96b537e885c31fc068bf492c652f01f288a1d8cdc19fc8")
        );

        let client_hs = hex!("b3eddb126e067f35a780b3abf45e2d8f3b1a950738f52e9600746a0e27a55a21");
        assert_eq!(
            finished_verify_data(&client_hs, &HASH_CH_SF).unwrap(),
            hex!("a8ec436d677634ae525ac1fcebe11a039ec17694fac6e98527b642f2edd5ce61")
        );
    }

    #[test]
    fn handshake_aeads_mirror() {
        let hs = HandshakeSecrets::derive(&SHARED, &HASH_CH_SH).unwrap();
        assert_eq!(hs.aead(Role::Client).unwrap().mirrored(), hs.aead(Role::Server).unwrap());
    }

    #[test]
    fn key_update_advances_generation() {
        let hs = HandshakeSecrets::derive(&SHARED, &HASH_CH_SH).unwrap();
        let mut client = hs.application_secrets(&HASH_CH_SF).unwrap();
        let mut server = hs.application_secrets(&HASH_CH_SF).unwrap();
        let before = *client.client();

        let c0 = client.aead(Role::Client).unwrap();
        let s0 = server.aead(Role::Server).unwrap();
        let c1 = client.next_aead(Role::Client, &c0).unwrap();
        let s1 = server.next_aead(Role::Server, &s0).unwrap();

        assert_eq!(client.generation(), 1);
        assert_eq!(client.client(), &next_application_secret(&before).unwrap());
        assert_eq!(c1.mirrored(), s1);
        assert_ne!(c1, c0);
        assert_eq!(c1.own().hp(), c0.own().hp());
    }
}
