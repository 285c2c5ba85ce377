#![no_main]

use libfuzzer_sys::fuzz_target;
use milli_quic_core::packet::{parse, CoalescedPackets, ParsedPacket};
use milli_quic_core::{Aead, Role, Version};

fuzz_target!(|data: &[u8]| {
    for dcid_len in [0, 8, 20] {
        let _ = parse(data, dcid_len);
    }

    // Phase 2 must fail cleanly on arbitrary bytes too.
    for packet in CoalescedPackets::new(data, 8) {
        let Ok(ParsedPacket::Protected(half)) = packet else {
            continue;
        };
        if let Ok(aead) = Aead::initial(Version::V1, half.dcid(), Role::Server) {
            let _ = half.complete(&aead, None);
        }
    }
});
