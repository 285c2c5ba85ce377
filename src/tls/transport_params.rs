//! QUIC transport parameters (RFC 9000 section 18).
//!
//! Carried in the quic_transport_parameters TLS extension (0x39) as a
//! sequence of (id, length, value) entries where integer values are
//! varint-encoded. Two framings of id and length exist:
//!
//! - [`ParameterFraming::Varint`]: id and length are varints (QUIC v1).
//! - [`ParameterFraming::Fixed16`]: id and length are 2-byte big-endian
//!   integers, as used by earlier drafts.

use tracing::debug;

use crate::error::{Error, TransportError};
use crate::packet::ConnectionId;
use crate::tls::codec::Reader;
use crate::varint::{decode_varint, put_varint, varint_len};

const PARAM_ERROR: Error = Error::Transport(TransportError::TransportParameterError);

/// How parameter ids and lengths are framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterFraming {
    #[default]
    Varint,
    Fixed16,
}

/// QUIC transport parameters exchanged during the TLS handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportParameters {
    /// Server only: DCID of the client's first Initial.
    pub original_destination_connection_id: Option<ConnectionId>,
    /// Maximum idle timeout in milliseconds (0 = disabled).
    pub max_idle_timeout: u64,
    /// Server only.
    pub stateless_reset_token: Option<[u8; 16]>,
    /// Maximum UDP payload size (default 65527, at least 1200).
    pub max_udp_payload_size: u64,
    /// Maximum total data the peer may send (flow control).
    pub initial_max_data: u64,
    /// Initial max data on locally-initiated bidi streams.
    pub initial_max_stream_data_bidi_local: u64,
    /// Initial max data on remotely-initiated bidi streams.
    pub initial_max_stream_data_bidi_remote: u64,
    /// Initial max data on unidirectional streams.
    pub initial_max_stream_data_uni: u64,
    /// Maximum number of bidi streams the peer may open.
    pub initial_max_streams_bidi: u64,
    /// Maximum number of uni streams the peer may open.
    pub initial_max_streams_uni: u64,
    /// ACK delay exponent (default 3, at most 20).
    pub ack_delay_exponent: u64,
    /// Maximum ACK delay in milliseconds (default 25, below 2^14).
    pub max_ack_delay: u64,
    pub disable_active_migration: bool,
    /// Active connection ID limit (default 2, at least 2).
    pub active_connection_id_limit: u64,
    pub initial_source_connection_id: Option<ConnectionId>,
    /// Server only, after a Retry.
    pub retry_source_connection_id: Option<ConnectionId>,
}

// Parameter IDs
const PARAM_ORIGINAL_DESTINATION_CONNECTION_ID: u64 = 0x00;
const PARAM_MAX_IDLE_TIMEOUT: u64 = 0x01;
const PARAM_STATELESS_RESET_TOKEN: u64 = 0x02;
const PARAM_MAX_UDP_PAYLOAD_SIZE: u64 = 0x03;
const PARAM_INITIAL_MAX_DATA: u64 = 0x04;
const PARAM_INITIAL_MAX_STREAM_DATA_BIDI_LOCAL: u64 = 0x05;
const PARAM_INITIAL_MAX_STREAM_DATA_BIDI_REMOTE: u64 = 0x06;
const PARAM_INITIAL_MAX_STREAM_DATA_UNI: u64 = 0x07;
const PARAM_INITIAL_MAX_STREAMS_BIDI: u64 = 0x08;
const PARAM_INITIAL_MAX_STREAMS_UNI: u64 = 0x09;
const PARAM_ACK_DELAY_EXPONENT: u64 = 0x0a;
const PARAM_MAX_ACK_DELAY: u64 = 0x0b;
const PARAM_DISABLE_ACTIVE_MIGRATION: u64 = 0x0c;
const PARAM_ACTIVE_CONNECTION_ID_LIMIT: u64 = 0x0e;
const PARAM_INITIAL_SOURCE_CONNECTION_ID: u64 = 0x0f;
const PARAM_RETRY_SOURCE_CONNECTION_ID: u64 = 0x10;

impl Default for TransportParameters {
    /// The values a peer assumes for absent parameters.
    fn default() -> Self {
        Self {
            original_destination_connection_id: None,
            max_idle_timeout: 0,
            stateless_reset_token: None,
            max_udp_payload_size: 65527,
            initial_max_data: 0,
            initial_max_stream_data_bidi_local: 0,
            initial_max_stream_data_bidi_remote: 0,
            initial_max_stream_data_uni: 0,
            initial_max_streams_bidi: 0,
            initial_max_streams_uni: 0,
            ack_delay_exponent: 3,
            max_ack_delay: 25,
            disable_active_migration: false,
            active_connection_id_limit: 2,
            initial_source_connection_id: None,
            retry_source_connection_id: None,
        }
    }
}

/// Appends entries in one framing.
struct Writer<'a> {
    out: &'a mut Vec<u8>,
    framing: ParameterFraming,
}

impl Writer<'_> {
    fn header(&mut self, id: u64, len: usize) -> Result<(), Error> {
        match self.framing {
            ParameterFraming::Varint => {
                put_varint(id, self.out)?;
                put_varint(len as u64, self.out)
            }
            ParameterFraming::Fixed16 => {
                let id = u16::try_from(id).map_err(|_| Error::Format)?;
                let len = u16::try_from(len).map_err(|_| Error::Format)?;
                self.out.extend_from_slice(&id.to_be_bytes());
                self.out.extend_from_slice(&len.to_be_bytes());
                Ok(())
            }
        }
    }

    fn int(&mut self, id: u64, value: u64) -> Result<(), Error> {
        self.header(id, varint_len(value))?;
        put_varint(value, self.out)
    }

    /// Integer parameter, omitted when it equals the default.
    fn int_unless(&mut self, id: u64, value: u64, default: u64) -> Result<(), Error> {
        if value == default {
            return Ok(());
        }
        self.int(id, value)
    }

    fn bytes(&mut self, id: u64, value: &[u8]) -> Result<(), Error> {
        self.header(id, value.len())?;
        self.out.extend_from_slice(value);
        Ok(())
    }
}

fn read_entry<'a>(
    r: &mut Reader<'a>,
    data: &'a [u8],
    framing: ParameterFraming,
) -> Result<(u64, &'a [u8]), Error> {
    match framing {
        ParameterFraming::Varint => {
            let (id, n) = decode_varint(&data[r.position()..]).map_err(|_| PARAM_ERROR)?;
            r.bytes(n)?;
            let (len, n) = decode_varint(&data[r.position()..]).map_err(|_| PARAM_ERROR)?;
            r.bytes(n)?;
            let len = usize::try_from(len).map_err(|_| PARAM_ERROR)?;
            Ok((id, r.bytes(len).map_err(|_| PARAM_ERROR)?))
        }
        ParameterFraming::Fixed16 => {
            let id = r.u16().map_err(|_| PARAM_ERROR)?;
            let value = r.vec16().map_err(|_| PARAM_ERROR)?;
            Ok((u64::from(id), value))
        }
    }
}

/// An integer parameter must be exactly one varint.
fn int_value(value: &[u8]) -> Result<u64, Error> {
    let (v, n) = decode_varint(value).map_err(|_| PARAM_ERROR)?;
    if n != value.len() {
        return Err(PARAM_ERROR);
    }
    Ok(v)
}

fn cid_value(value: &[u8]) -> Result<ConnectionId, Error> {
    ConnectionId::new(value).map_err(|_| PARAM_ERROR)
}

impl TransportParameters {
    /// Create transport parameters with sensible defaults.
    pub fn default_params() -> Self {
        Self {
            max_idle_timeout: 30_000,
            initial_max_data: 1_048_576,
            initial_max_stream_data_bidi_local: 262_144,
            initial_max_stream_data_bidi_remote: 262_144,
            initial_max_stream_data_uni: 262_144,
            initial_max_streams_bidi: 100,
            initial_max_streams_uni: 100,
            ..Self::default()
        }
    }

    /// Append the encoded parameters to `out`. Parameters equal to their
    /// default are omitted.
    pub fn encode(&self, framing: ParameterFraming, out: &mut Vec<u8>) -> Result<(), Error> {
        let d = Self::default();
        let mut w = Writer { out, framing };

        if let Some(cid) = &self.original_destination_connection_id {
            w.bytes(PARAM_ORIGINAL_DESTINATION_CONNECTION_ID, cid)?;
        }
        w.int_unless(PARAM_MAX_IDLE_TIMEOUT, self.max_idle_timeout, d.max_idle_timeout)?;
        if let Some(token) = &self.stateless_reset_token {
            w.bytes(PARAM_STATELESS_RESET_TOKEN, token)?;
        }
        w.int_unless(
            PARAM_MAX_UDP_PAYLOAD_SIZE,
            self.max_udp_payload_size,
            d.max_udp_payload_size,
        )?;
        w.int_unless(PARAM_INITIAL_MAX_DATA, self.initial_max_data, d.initial_max_data)?;
        w.int_unless(
            PARAM_INITIAL_MAX_STREAM_DATA_BIDI_LOCAL,
            self.initial_max_stream_data_bidi_local,
            d.initial_max_stream_data_bidi_local,
        )?;
        w.int_unless(
            PARAM_INITIAL_MAX_STREAM_DATA_BIDI_REMOTE,
            self.initial_max_stream_data_bidi_remote,
            d.initial_max_stream_data_bidi_remote,
        )?;
        w.int_unless(
            PARAM_INITIAL_MAX_STREAM_DATA_UNI,
            self.initial_max_stream_data_uni,
            d.initial_max_stream_data_uni,
        )?;
        w.int_unless(
            PARAM_INITIAL_MAX_STREAMS_BIDI,
            self.initial_max_streams_bidi,
            d.initial_max_streams_bidi,
        )?;
        w.int_unless(
            PARAM_INITIAL_MAX_STREAMS_UNI,
            self.initial_max_streams_uni,
            d.initial_max_streams_uni,
        )?;
        w.int_unless(PARAM_ACK_DELAY_EXPONENT, self.ack_delay_exponent, d.ack_delay_exponent)?;
        w.int_unless(PARAM_MAX_ACK_DELAY, self.max_ack_delay, d.max_ack_delay)?;
        if self.disable_active_migration {
            w.bytes(PARAM_DISABLE_ACTIVE_MIGRATION, &[])?;
        }
        w.int_unless(
            PARAM_ACTIVE_CONNECTION_ID_LIMIT,
            self.active_connection_id_limit,
            d.active_connection_id_limit,
        )?;
        if let Some(cid) = &self.initial_source_connection_id {
            w.bytes(PARAM_INITIAL_SOURCE_CONNECTION_ID, cid)?;
        }
        if let Some(cid) = &self.retry_source_connection_id {
            w.bytes(PARAM_RETRY_SOURCE_CONNECTION_ID, cid)?;
        }
        Ok(())
    }

    /// Decode transport parameters. Unknown ids are skipped; a repeated
    /// id, a malformed value or an out-of-range value is a
    /// `TRANSPORT_PARAMETER_ERROR`.
    pub fn decode(buf: &[u8], framing: ParameterFraming) -> Result<Self, Error> {
        let mut params = Self::default();
        let mut seen = 0u32;
        let mut r = Reader::new(buf);

        while !r.is_empty() {
            let (id, value) = read_entry(&mut r, buf, framing)?;

            if id <= PARAM_RETRY_SOURCE_CONNECTION_ID {
                let bit = 1u32 << id;
                if seen & bit != 0 {
                    debug!(id, "duplicate transport parameter");
                    return Err(PARAM_ERROR);
                }
                seen |= bit;
            }

            match id {
                PARAM_ORIGINAL_DESTINATION_CONNECTION_ID => {
                    params.original_destination_connection_id = Some(cid_value(value)?)
                }
                PARAM_MAX_IDLE_TIMEOUT => params.max_idle_timeout = int_value(value)?,
                PARAM_STATELESS_RESET_TOKEN => {
                    let token = <[u8; 16]>::try_from(value).map_err(|_| PARAM_ERROR)?;
                    params.stateless_reset_token = Some(token);
                }
                PARAM_MAX_UDP_PAYLOAD_SIZE => params.max_udp_payload_size = int_value(value)?,
                PARAM_INITIAL_MAX_DATA => params.initial_max_data = int_value(value)?,
                PARAM_INITIAL_MAX_STREAM_DATA_BIDI_LOCAL => {
                    params.initial_max_stream_data_bidi_local = int_value(value)?
                }
                PARAM_INITIAL_MAX_STREAM_DATA_BIDI_REMOTE => {
                    params.initial_max_stream_data_bidi_remote = int_value(value)?
                }
                PARAM_INITIAL_MAX_STREAM_DATA_UNI => {
                    params.initial_max_stream_data_uni = int_value(value)?
                }
                PARAM_INITIAL_MAX_STREAMS_BIDI => params.initial_max_streams_bidi = int_value(value)?,
                PARAM_INITIAL_MAX_STREAMS_UNI => params.initial_max_streams_uni = int_value(value)?,
                PARAM_ACK_DELAY_EXPONENT => params.ack_delay_exponent = int_value(value)?,
                PARAM_MAX_ACK_DELAY => params.max_ack_delay = int_value(value)?,
                PARAM_DISABLE_ACTIVE_MIGRATION => {
                    if !value.is_empty() {
                        return Err(PARAM_ERROR);
                    }
                    params.disable_active_migration = true;
                }
                PARAM_ACTIVE_CONNECTION_ID_LIMIT => {
                    params.active_connection_id_limit = int_value(value)?
                }
                PARAM_INITIAL_SOURCE_CONNECTION_ID => {
                    params.initial_source_connection_id = Some(cid_value(value)?)
                }
                PARAM_RETRY_SOURCE_CONNECTION_ID => {
                    params.retry_source_connection_id = Some(cid_value(value)?)
                }
                // Unknown parameters (including preferred_address) are ignored.
                _ => {}
            }
        }

        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.max_udp_payload_size < 1200
            || self.ack_delay_exponent > 20
            || self.max_ack_delay >= 1 << 14
            || self.active_connection_id_limit < 2
        {
            return Err(PARAM_ERROR);
        }
        Ok(())
    }

    /// Reject parameters only a server may send (RFC 9000 section 18.2).
    pub fn check_sent_by_client(&self) -> Result<(), Error> {
        if self.original_destination_connection_id.is_some()
            || self.stateless_reset_token.is_some()
            || self.retry_source_connection_id.is_some()
        {
            return Err(PARAM_ERROR);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn roundtrip(params: &TransportParameters, framing: ParameterFraming) -> TransportParameters {
        let mut buf = Vec::new();
        params.encode(framing, &mut buf).unwrap();
        TransportParameters::decode(&buf, framing).unwrap()
    }

    #[test]
    fn roundtrip_default_params() {
        let params = TransportParameters::default_params();
        assert_eq!(roundtrip(&params, ParameterFraming::Varint), params);
        assert_eq!(roundtrip(&params, ParameterFraming::Fixed16), params);
    }

    #[test]
    fn roundtrip_every_field() {
        let params = TransportParameters {
            original_destination_connection_id: Some(ConnectionId::new(&[1; 8]).unwrap()),
            max_idle_timeout: 60_000,
            stateless_reset_token: Some([0xee; 16]),
            max_udp_payload_size: 1200,
            initial_max_data: 500_000,
            initial_max_stream_data_bidi_local: 100_000,
            initial_max_stream_data_bidi_remote: 100_001,
            initial_max_stream_data_uni: 50_000,
            initial_max_streams_bidi: 10,
            initial_max_streams_uni: 5,
            ack_delay_exponent: 4,
            max_ack_delay: 50,
            disable_active_migration: true,
            active_connection_id_limit: 4,
            initial_source_connection_id: Some(ConnectionId::EMPTY),
            retry_source_connection_id: Some(ConnectionId::new(&[2; 4]).unwrap()),
        };
        assert_eq!(roundtrip(&params, ParameterFraming::Varint), params);
        assert_eq!(roundtrip(&params, ParameterFraming::Fixed16), params);
        assert_eq!(params.check_sent_by_client(), Err(PARAM_ERROR));
    }

    #[test]
    fn framings_differ_on_the_wire() {
        let params = TransportParameters {
            max_idle_timeout: 1000,
            ..Default::default()
        };
        let mut varint = Vec::new();
        params.encode(ParameterFraming::Varint, &mut varint).unwrap();
        assert_eq!(varint, hex!("01 02 43e8"));

        let mut fixed = Vec::new();
        params.encode(ParameterFraming::Fixed16, &mut fixed).unwrap();
        assert_eq!(fixed, hex!("0001 0002 43e8"));
    }

    #[test]
    fn unknown_params_ignored() {
        // max_idle_timeout = 1000, then unknown id 0xff with one byte.
        let buf = hex!("01 02 43e8 40ff 01 42");
        let params = TransportParameters::decode(&buf, ParameterFraming::Varint).unwrap();
        assert_eq!(params.max_idle_timeout, 1000);
    }

    #[test]
    fn duplicate_is_rejected() {
        let buf = hex!("01 01 05 01 01 06");
        assert_eq!(
            TransportParameters::decode(&buf, ParameterFraming::Varint),
            Err(PARAM_ERROR)
        );
    }

    #[test]
    fn malformed_values_are_rejected() {
        // Integer value with trailing garbage.
        let buf = hex!("01 02 05 00");
        assert_eq!(
            TransportParameters::decode(&buf, ParameterFraming::Varint),
            Err(PARAM_ERROR)
        );
        // Length runs past the end.
        let buf = hex!("0001 0009 05");
        assert_eq!(
            TransportParameters::decode(&buf, ParameterFraming::Fixed16),
            Err(PARAM_ERROR)
        );
        // max_udp_payload_size below 1200.
        let buf = hex!("03 02 4100");
        assert_eq!(
            TransportParameters::decode(&buf, ParameterFraming::Varint),
            Err(PARAM_ERROR)
        );
    }
}
