//! QUIC versions and their per-version constants.
//!
//! The Initial salt and the Retry integrity key/nonce differ between
//! QUIC v1 (RFC 9001) and the last interoperable draft (draft-29).

/// QUIC version 1 (RFC 9000).
pub const QUIC_VERSION_1: u32 = 0x0000_0001;

/// QUIC draft-29.
pub const QUIC_VERSION_DRAFT_29: u32 = 0xff00_001d;

/// A QUIC version whose packet protection this crate implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    V1,
    Draft29,
}

impl Version {
    pub fn from_wire(version: u32) -> Option<Self> {
        match version {
            QUIC_VERSION_1 => Some(Version::V1),
            QUIC_VERSION_DRAFT_29 => Some(Version::Draft29),
            _ => None,
        }
    }

    pub const fn to_wire(self) -> u32 {
        match self {
            Version::V1 => QUIC_VERSION_1,
            Version::Draft29 => QUIC_VERSION_DRAFT_29,
        }
    }

    /// Salt for the Initial secret (RFC 9001 §5.2).
    pub const fn initial_salt(self) -> &'static [u8; 20] {
        match self {
            Version::V1 => &[
                0x38, 0x76, 0x2c, 0xf7, 0xf5, 0x59, 0x34, 0xb3, 0x4d, 0x17, 0x9a, 0xe6, 0xa4,
                0xc8, 0x0c, 0xad, 0xcc, 0xbb, 0x7f, 0x0a,
            ],
            Version::Draft29 => &[
                0xaf, 0xbf, 0xec, 0x28, 0x99, 0x93, 0xd2, 0x4c, 0x9e, 0x97, 0x86, 0xf1, 0x9c,
                0x61, 0x11, 0xe0, 0x43, 0x90, 0xa8, 0x99,
            ],
        }
    }

    /// AES-128-GCM key for the Retry integrity tag (RFC 9001 §5.8).
    pub const fn retry_key(self) -> &'static [u8; 16] {
        match self {
            Version::V1 => &[
                0xbe, 0x0c, 0x69, 0x0b, 0x9f, 0x66, 0x57, 0x5a, 0x1d, 0x76, 0x6b, 0x54, 0xe3,
                0x68, 0xc8, 0x4e,
            ],
            Version::Draft29 => &[
                0xcc, 0xce, 0x18, 0x7e, 0xd0, 0x9a, 0x09, 0xd0, 0x57, 0x28, 0x15, 0x5a, 0x6c,
                0xb9, 0x6b, 0xe1,
            ],
        }
    }

    /// Nonce for the Retry integrity tag (RFC 9001 §5.8).
    pub const fn retry_nonce(self) -> &'static [u8; 12] {
        match self {
            Version::V1 => &[
                0x46, 0x15, 0x99, 0xd3, 0x5d, 0x63, 0x2b, 0xf2, 0x23, 0x98, 0x25, 0xbb,
            ],
            Version::Draft29 => &[
                0xe5, 0x49, 0x30, 0xf9, 0x7f, 0x21, 0x36, 0xf0, 0x53, 0x0a, 0x8c, 0x1c,
            ],
        }
    }
}
