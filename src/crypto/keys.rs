//! Per-level AEAD storage.
//!
//! The packet codec never owns keys; it asks an [`AeadProvider`] for the
//! pair matching a packet's encryption level. [`LevelKeys`] is the
//! straightforward provider: one optional slot per level, filled as the
//! handshake progresses and emptied when a level is discarded.

use tracing::debug;

use crate::crypto::{Aead, EncryptionLevel};

/// Supplies the AEAD for an encryption level, if keys for it exist.
pub trait AeadProvider {
    fn for_level(&self, level: EncryptionLevel) -> Option<&Aead>;
}

/// All AEAD pairs of a connection, by level.
#[derive(Debug, Default, Clone)]
pub struct LevelKeys {
    initial: Option<Aead>,
    handshake: Option<Aead>,
    one_rtt: Option<Aead>,
}

impl LevelKeys {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, level: EncryptionLevel) -> &mut Option<Aead> {
        match level {
            EncryptionLevel::Initial => &mut self.initial,
            EncryptionLevel::Handshake => &mut self.handshake,
            EncryptionLevel::OneRtt => &mut self.one_rtt,
        }
    }

    /// Install (or replace, for Key Update) the pair for `level`.
    pub fn install(&mut self, level: EncryptionLevel, aead: Aead) {
        debug!(?level, "installing packet protection keys");
        *self.slot(level) = Some(aead);
    }

    /// Drop the keys of a level that will not be used again
    /// (RFC 9001 §4.9). Key material is zeroized as it is dropped.
    pub fn discard(&mut self, level: EncryptionLevel) {
        if self.slot(level).take().is_some() {
            debug!(?level, "discarded packet protection keys");
        }
    }

    pub fn has(&self, level: EncryptionLevel) -> bool {
        self.for_level(level).is_some()
    }
}

impl AeadProvider for LevelKeys {
    fn for_level(&self, level: EncryptionLevel) -> Option<&Aead> {
        match level {
            EncryptionLevel::Initial => self.initial.as_ref(),
            EncryptionLevel::Handshake => self.handshake.as_ref(),
            EncryptionLevel::OneRtt => self.one_rtt.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Role;
    use crate::version::Version;

    #[test]
    fn install_and_discard() {
        let mut keys = LevelKeys::new();
        assert!(!keys.has(EncryptionLevel::Initial));

        let initial = Aead::initial(Version::V1, &[1, 2, 3, 4], Role::Client).unwrap();
        keys.install(EncryptionLevel::Initial, initial.clone());
        assert_eq!(keys.for_level(EncryptionLevel::Initial), Some(&initial));
        assert!(keys.for_level(EncryptionLevel::Handshake).is_none());
        assert!(keys.for_level(EncryptionLevel::OneRtt).is_none());

        keys.discard(EncryptionLevel::Initial);
        assert!(!keys.has(EncryptionLevel::Initial));
        // Discarding twice is harmless.
        keys.discard(EncryptionLevel::Initial);
    }

    #[test]
    fn levels_are_independent() {
        let mut keys = LevelKeys::new();
        let a = Aead::initial(Version::V1, &[1], Role::Client).unwrap();
        let b = Aead::initial(Version::V1, &[2], Role::Client).unwrap();
        keys.install(EncryptionLevel::Handshake, a.clone());
        keys.install(EncryptionLevel::OneRtt, b.clone());
        assert_eq!(keys.for_level(EncryptionLevel::Handshake), Some(&a));
        assert_eq!(keys.for_level(EncryptionLevel::OneRtt), Some(&b));
    }
}
