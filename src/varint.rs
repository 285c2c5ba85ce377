/// QUIC variable-length integer encoding (RFC 9000 §16).
///
/// | 2MSB | Length  | Usable Bits | Range                        |
/// |------|---------|-------------|------------------------------|
/// | 00   | 1 byte  | 6           | 0–63                         |
/// | 01   | 2 bytes | 14          | 0–16383                      |
/// | 10   | 4 bytes | 30          | 0–1073741823                 |
/// | 11   | 8 bytes | 62          | 0–4611686018427387903        |

use crate::error::Error;

/// Maximum value representable as a QUIC varint (2^62 - 1).
pub const MAX_VARINT: u64 = (1 << 62) - 1;

/// Minimal number of bytes needed to encode `value`.
pub const fn varint_len(value: u64) -> usize {
    if value <= 63 {
        1
    } else if value <= 16383 {
        2
    } else if value <= 1_073_741_823 {
        4
    } else {
        8
    }
}

/// Decode a QUIC variable-length integer from the front of `buf`.
///
/// Returns `(value, bytes_consumed)`. A varint cut short by the end of
/// the input is a format error. Non-minimal encodings are accepted.
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize), Error> {
    let first = *buf.first().ok_or(Error::Format)?;
    let len = 1usize << (first >> 6);
    if buf.len() < len {
        return Err(Error::Format);
    }

    let mut value = u64::from(first & 0x3f);
    for &b in &buf[1..len] {
        value = (value << 8) | u64::from(b);
    }
    Ok((value, len))
}

/// Encode `value` minimally into `buf`.
///
/// Returns the number of bytes written.
pub fn encode_varint(value: u64, buf: &mut [u8]) -> Result<usize, Error> {
    if value > MAX_VARINT {
        return Err(Error::Format);
    }

    let len = varint_len(value);
    if buf.len() < len {
        return Err(Error::BufferTooSmall { needed: len });
    }

    let bytes = value.to_be_bytes();
    buf[..len].copy_from_slice(&bytes[8 - len..]);
    buf[0] |= match len {
        1 => 0x00,
        2 => 0x40,
        4 => 0x80,
        _ => 0xc0,
    };
    Ok(len)
}

/// Append the minimal encoding of `value` to `out`.
pub fn put_varint(value: u64, out: &mut Vec<u8>) -> Result<(), Error> {
    let mut tmp = [0u8; 8];
    let len = encode_varint(value, &mut tmp)?;
    out.extend_from_slice(&tmp[..len]);
    Ok(())
}

/// Encode `value` using exactly `len` bytes (1, 2, 4 or 8).
///
/// Used where a length field is reserved before its value is known.
pub fn encode_varint_with_len(value: u64, len: usize, buf: &mut [u8]) -> Result<(), Error> {
    let prefix = match len {
        1 => 0x00,
        2 => 0x40,
        4 => 0x80,
        8 => 0xc0,
        _ => return Err(Error::Format),
    };
    if varint_len(value) > len || value > MAX_VARINT {
        return Err(Error::Format);
    }
    if buf.len() < len {
        return Err(Error::BufferTooSmall { needed: len });
    }
    let bytes = value.to_be_bytes();
    buf[..len].copy_from_slice(&bytes[8 - len..]);
    buf[0] |= prefix;
    Ok(())
}
