//! TLS 1.3 handshake for QUIC.
//!
//! QUIC carries raw handshake messages in CRYPTO frames: there is no record
//! layer and TLS never encrypts anything itself. The sessions here consume
//! and produce handshake bytes per encryption level and hand back the
//! [`Aead`](crate::crypto::Aead) for each level as it becomes available.
//!
//! ```text
//! client                                     server
//! start()            ClientHello  ------->   handle_client_hello()
//! handle_server_hello()  <-------  ServerHello          (Initial)
//! handle_handshake()     <-------  EE, Cert, CV, Fin    (Handshake)
//!                    Finished     ------->   handle_client_finished()
//! ```
//!
//! Only TLS_AES_128_GCM_SHA256, X25519 and RSA-PSS-RSAE-SHA256 are
//! supported. Resumption, early data and HelloRetryRequest are not.

pub mod alert;
pub mod client;
pub mod codec;
pub mod config;
pub mod extensions;
pub mod key_schedule_tls;
pub mod messages;
pub mod server;
pub mod transcript;
pub mod transport_params;

pub use alert::AlertDescription;
pub use client::{ClientFinished, ClientSession};
pub use config::{CertificateProvider, ClientConfig, RsaIdentity, ServerConfig};
pub use messages::CipherSuite;
pub use server::{ServerFlight, ServerSession};
pub use transcript::Transcript;
pub use transport_params::{ParameterFraming, TransportParameters};

/// Upper bound on buffered handshake bytes for one flight. Exceeding it
/// fails the connection with `CRYPTO_BUFFER_EXCEEDED`.
pub const MAX_HANDSHAKE_BUFFER: usize = 16 * 1024;

/// Outcome of feeding bytes to a session that may need more input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<T> {
    /// The flight is not complete yet. The bytes were buffered; call again
    /// with the rest.
    Incomplete,
    Done(T),
}

impl<T> Progress<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Progress::Done(_))
    }

    pub fn done(self) -> Option<T> {
        match self {
            Progress::Done(v) => Some(v),
            Progress::Incomplete => None,
        }
    }
}

/// Constant-time comparison of two byte slices.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (&x, &y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Split the first `N` framed handshake messages off `buf`. Returns the
/// messages and the number of bytes they span, or `None` on underflow.
pub(crate) fn split_flight<const N: usize>(buf: &[u8]) -> Option<([&[u8]; N], usize)> {
    let mut flight: [&[u8]; N] = [&[]; N];
    let mut rest = buf;
    for slot in flight.iter_mut() {
        let (_, msg, tail) = messages::split_message(rest)?;
        *slot = msg;
        rest = tail;
    }
    Some((flight, buf.len() - rest.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ct_eq_works() {
        assert!(ct_eq(b"hello", b"hello"));
        assert!(!ct_eq(b"hello", b"world"));
        assert!(!ct_eq(b"hello", b"hell"));
        assert!(ct_eq(b"", b""));
    }

    #[test]
    fn split_flight_needs_every_message() {
        let mut buf = vec![20, 0, 0, 2, 0xaa, 0xbb, 8, 0, 0, 0];
        let (msgs, used) = split_flight::<2>(&buf).unwrap();
        assert_eq!(msgs[0], &[20, 0, 0, 2, 0xaa, 0xbb]);
        assert_eq!(msgs[1], &[8, 0, 0, 0]);
        assert_eq!(used, 10);

        assert!(split_flight::<3>(&buf).is_none());
        buf.truncate(9);
        assert!(split_flight::<2>(&buf).is_none());
    }

    #[test]
    fn progress_accessors() {
        assert!(Progress::Done(1).is_done());
        assert_eq!(Progress::<u8>::Incomplete.done(), None);
    }
}
