#![no_main]

use libfuzzer_sys::fuzz_target;
use milli_quic_core::tls::messages::{split_message, HandshakeMessage};

fuzz_target!(|data: &[u8]| {
    let mut rest = data;
    while let Some((_, msg, tail)) = split_message(rest) {
        if let Ok(decoded) = HandshakeMessage::decode(msg) {
            // Anything that decodes must encode again.
            let encoded = decoded.encode().unwrap();
            assert_eq!(HandshakeMessage::decode(&encoded).unwrap(), decoded);
        }
        rest = tail;
    }
    let _ = HandshakeMessage::decode(data);
});
