#![no_main]

use libfuzzer_sys::fuzz_target;
use milli_quic_core::varint::{decode_varint, encode_varint, varint_len};

fuzz_target!(|data: &[u8]| {
    if let Ok((value, consumed)) = decode_varint(data) {
        let mut buf = [0u8; 8];
        let written = encode_varint(value, &mut buf).unwrap();
        let (again, consumed_again) = decode_varint(&buf[..written]).unwrap();
        assert_eq!(value, again);
        assert_eq!(consumed_again, written);
        // Non-minimal encodings are accepted on read.
        assert!(consumed >= varint_len(value));
    }
});
