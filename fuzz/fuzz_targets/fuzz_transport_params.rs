#![no_main]

use libfuzzer_sys::fuzz_target;
use milli_quic_core::tls::transport_params::{ParameterFraming, TransportParameters};

fuzz_target!(|data: &[u8]| {
    for framing in [ParameterFraming::Varint, ParameterFraming::Fixed16] {
        if let Ok(params) = TransportParameters::decode(data, framing) {
            let mut out = Vec::new();
            params.encode(framing, &mut out).unwrap();
            assert_eq!(TransportParameters::decode(&out, framing).unwrap(), params);
        }
    }
});
