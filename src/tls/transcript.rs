//! Handshake transcript.
//!
//! Keeps every handshake message in wire order together with a running
//! SHA-256 state. Intermediate hashes are obtained by cloning the state.

use sha2::{Digest, Sha256};

/// Append-only record of the handshake messages exchanged so far.
#[derive(Clone, Default)]
pub struct Transcript {
    messages: Vec<u8>,
    hasher: Sha256,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one or more complete, framed handshake messages.
    pub fn append(&mut self, message: &[u8]) {
        self.messages.extend_from_slice(message);
        self.hasher.update(message);
    }

    /// Hash of everything appended so far. Does not consume the state.
    pub fn current_hash(&self) -> [u8; 32] {
        self.hasher.clone().finalize().into()
    }

    /// The raw concatenation of messages.
    pub fn as_bytes(&self) -> &[u8] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl core::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transcript")
            .field("len", &self.messages.len())
            .finish()
    }
}
