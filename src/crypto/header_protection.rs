//! Header protection (RFC 9001 §5.4).
//!
//! A 5-byte mask derived from a 16-byte ciphertext sample is XORed into
//! the low bits of the first byte and into the packet number bytes. The
//! packet number length lives in the protected bits, so the two directions
//! differ in when they read it.

/// Length of the ciphertext sample fed to the mask function.
pub const SAMPLE_LEN: usize = 16;

/// Offset of the sample from the start of the packet number field; the
/// sample always assumes a 4-byte packet number.
pub const SAMPLE_OFFSET: usize = 4;

const LONG_HEADER_BITS: u8 = 0x0f;
const SHORT_HEADER_BITS: u8 = 0x1f;

fn first_byte_bits(is_short_header: bool) -> u8 {
    if is_short_header {
        SHORT_HEADER_BITS
    } else {
        LONG_HEADER_BITS
    }
}

/// Protect `header` = first byte followed by up to four packet number bytes.
///
/// The packet number length comes from the unprotected first byte; bytes
/// beyond it are left untouched.
pub fn protect(mask: &[u8; 5], header: &mut [u8; 5], is_short_header: bool) {
    let pn_len = usize::from(header[0] & 0x03) + 1;
    header[0] ^= mask[0] & first_byte_bits(is_short_header);
    for i in 0..pn_len {
        header[1 + i] ^= mask[1 + i];
    }
}

/// Inverse of [`protect`]: unmask the first byte, then only as many packet
/// number bytes as it declares.
pub fn unprotect(mask: &[u8; 5], header: &mut [u8; 5], is_short_header: bool) {
    header[0] ^= mask[0] & first_byte_bits(is_short_header);
    let pn_len = usize::from(header[0] & 0x03) + 1;
    for i in 0..pn_len {
        header[1 + i] ^= mask[1 + i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    /// RFC 9001 A.2: client Initial, pn length 4.
    #[test]
    fn protect_rfc9001_a2() {
        let mask = hex!("437b9aec36");
        let mut header = hex!("c300000002");
        protect(&mask, &mut header, false);
        assert_eq!(header, hex!("c07b9aec34"));
        unprotect(&mask, &mut header, false);
        assert_eq!(header, hex!("c300000002"));
    }

    #[test]
    fn short_header_masks_five_bits() {
        let mask = [0xff; 5];
        let mut header = [0x40, 0x11, 0x22, 0x33, 0x44];
        protect(&mask, &mut header, true);
        assert_eq!(header[0], 0x5f);
        // pn length 1: only one pn byte is masked.
        assert_eq!(&header[1..], &[0xee, 0x22, 0x33, 0x44]);
        unprotect(&mask, &mut header, true);
        assert_eq!(header, [0x40, 0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn long_header_keeps_type_bits() {
        let mask = [0xff; 5];
        let mut header = [0xe1, 0, 0, 0, 0];
        protect(&mask, &mut header, false);
        assert_eq!(header[0] & 0xf0, 0xe0);
    }
}
