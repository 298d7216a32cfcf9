//! OpenVPN control channel probe packet.
//!
//! The probe is a `P_CONTROL_HARD_RESET_CLIENT_V2` packet with an empty ACK
//! array and no TLS payload. With tls-auth enabled the HMAC sits between the
//! session id and the packet id.
//!
//! Wire format (datagram form):
//! ```text
//! +--------+------------------+------------------+-----------+-----------+-----+-------------+
//! | type   | session id       | HMAC (optional)  | packet id | timestamp | ack | message id  |
//! | 1 byte | 8 bytes          | digest length    | 4 bytes   | 4 bytes   | 1   | 4 bytes     |
//! +--------+------------------+------------------+-----------+-----------+-----+-------------+
//! ```
//!
//! Over TCP every packet is preceded by a 2-byte big-endian length.
//!
//! The HMAC covers the fields in replay-protection-first order:
//! packet id, timestamp, type, session id, ack length, message id.

use thiserror::Error;

use crate::{
    crypto::HmacKey,
    digest::{DigestAlgorithm, DigestSpec},
    session::{SessionId, SESSION_ID_LEN},
    time::generate_timestamp,
};

/// Key id used by the probe (always the first key slot).
pub const KEY_ID: u8 = 0;

/// Packet id of the first (and only) control packet of the probe.
pub const PROBE_PACKET_ID: u32 = 1;

/// Length of the TCP framing prefix.
pub const STREAM_LENGTH_PREFIX: usize = 2;

/// Packet size without the HMAC field.
pub const UNAUTH_PACKET_SIZE: usize = 1 + SESSION_ID_LEN + 4 + 4 + 1 + 4;

/// Errors raised when parsing a probe packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Buffer too small for probe packet: {actual} bytes, {expected} expected")]
    TooShort { expected: usize, actual: usize },

    #[error("Stream length prefix {prefix} does not match payload length {payload}")]
    LengthMismatch { prefix: usize, payload: usize },
}

/// OpenVPN packet opcodes (upper five bits of the type byte).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    ControlHardResetClientV1 = 1,
    ControlHardResetServerV1 = 2,
    ControlSoftResetV1 = 3,
    ControlV1 = 4,
    AckV1 = 5,
    DataV1 = 6,
    ControlHardResetClientV2 = 7,
    ControlHardResetServerV2 = 8,
    DataV2 = 9,
    ControlHardResetClientV3 = 10,
    ControlWkcV1 = 11,
}

impl Opcode {
    /// Decodes the opcode of a type byte, ignoring the key id bits.
    pub fn from_type_byte(byte: u8) -> Option<Opcode> {
        let opcode = match byte >> 3 {
            1 => Opcode::ControlHardResetClientV1,
            2 => Opcode::ControlHardResetServerV1,
            3 => Opcode::ControlSoftResetV1,
            4 => Opcode::ControlV1,
            5 => Opcode::AckV1,
            6 => Opcode::DataV1,
            7 => Opcode::ControlHardResetClientV2,
            8 => Opcode::ControlHardResetServerV2,
            9 => Opcode::DataV2,
            10 => Opcode::ControlHardResetClientV3,
            11 => Opcode::ControlWkcV1,
            _ => return None,
        };
        Some(opcode)
    }

    /// Builds the type byte for this opcode and `key_id`.
    pub fn type_byte(self, key_id: u8) -> u8 {
        ((self as u8) << 3) | (key_id & 0x07)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Opcode::ControlHardResetClientV1 => "P_CONTROL_HARD_RESET_CLIENT_V1",
            Opcode::ControlHardResetServerV1 => "P_CONTROL_HARD_RESET_SERVER_V1",
            Opcode::ControlSoftResetV1 => "P_CONTROL_SOFT_RESET_V1",
            Opcode::ControlV1 => "P_CONTROL_V1",
            Opcode::AckV1 => "P_ACK_V1",
            Opcode::DataV1 => "P_DATA_V1",
            Opcode::ControlHardResetClientV2 => "P_CONTROL_HARD_RESET_CLIENT_V2",
            Opcode::ControlHardResetServerV2 => "P_CONTROL_HARD_RESET_SERVER_V2",
            Opcode::DataV2 => "P_DATA_V2",
            Opcode::ControlHardResetClientV3 => "P_CONTROL_HARD_RESET_CLIENT_V3",
            Opcode::ControlWkcV1 => "P_CONTROL_WKC_V1",
        }
    }
}

/// Type byte of the probe: hard reset client v2, key id 0 (`0x38`).
pub const HARD_RESET_CLIENT_TYPE: u8 = ((Opcode::ControlHardResetClientV2 as u8) << 3) | KEY_ID;

/// The hard reset probe packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePacket {
    /// Opcode and key id.
    pub packet_type: u8,
    /// Random client session id.
    pub session_id: SessionId,
    /// tls-auth HMAC, present only when a key is used.
    pub hmac: Option<Vec<u8>>,
    /// Replay protection packet id.
    pub packet_id: u32,
    /// Replay protection timestamp (UNIX seconds).
    pub timestamp: u32,
    /// Number of acknowledged packet ids (always 0 for the probe).
    pub message_array_length: u8,
    /// Control channel message packet id.
    pub message_packet_id: u32,
}

impl ProbePacket {
    /// Creates an unsigned probe packet.
    pub fn new(session_id: SessionId, timestamp: u32) -> Self {
        Self {
            packet_type: HARD_RESET_CLIENT_TYPE,
            session_id,
            hmac: None,
            packet_id: PROBE_PACKET_ID,
            timestamp,
            message_array_length: 0,
            message_packet_id: 0,
        }
    }

    /// Bytes covered by the HMAC, in signing order.
    pub fn hmac_input(&self) -> Vec<u8> {
        let mut input = Vec::with_capacity(UNAUTH_PACKET_SIZE);
        input.extend_from_slice(&self.packet_id.to_be_bytes());
        input.extend_from_slice(&self.timestamp.to_be_bytes());
        input.push(self.packet_type);
        input.extend_from_slice(self.session_id.as_bytes());
        input.push(self.message_array_length);
        input.extend_from_slice(&self.message_packet_id.to_be_bytes());
        input
    }

    /// Computes the HMAC over the signed fields and stores it in the packet.
    ///
    /// The stored digest has the algorithm's natural length.
    pub fn sign(&mut self, key: &HmacKey, algorithm: DigestAlgorithm) {
        self.hmac = Some(key.compute(algorithm, &[self.hmac_input().as_slice()]));
    }

    fn encoded_len(&self) -> usize {
        UNAUTH_PACKET_SIZE + self.hmac.as_ref().map_or(0, Vec::len)
    }

    /// Serializes the packet in datagram form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(self.packet_type);
        buf.extend_from_slice(self.session_id.as_bytes());
        if let Some(ref hmac) = self.hmac {
            buf.extend_from_slice(hmac);
        }
        buf.extend_from_slice(&self.packet_id.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.push(self.message_array_length);
        buf.extend_from_slice(&self.message_packet_id.to_be_bytes());
        buf
    }

    /// Serializes the packet with the TCP length prefix.
    pub fn to_stream_bytes(&self) -> Vec<u8> {
        let body = self.to_bytes();
        let mut buf = Vec::with_capacity(STREAM_LENGTH_PREFIX + body.len());
        buf.extend_from_slice(&(body.len() as u16).to_be_bytes());
        buf.extend_from_slice(&body);
        buf
    }

    /// Deserializes a datagram-form packet carrying an HMAC of `hmac_len` bytes.
    ///
    /// # Errors
    /// Returns `PacketError::TooShort` if `buf` cannot hold the packet.
    pub fn from_bytes(buf: &[u8], hmac_len: usize) -> Result<Self, PacketError> {
        let expected = UNAUTH_PACKET_SIZE + hmac_len;
        if buf.len() < expected {
            return Err(PacketError::TooShort {
                expected,
                actual: buf.len(),
            });
        }

        let mut session_id = [0u8; SESSION_ID_LEN];
        session_id.copy_from_slice(&buf[1..1 + SESSION_ID_LEN]);

        let mut offset = 1 + SESSION_ID_LEN;
        let hmac = if hmac_len > 0 {
            let hmac = buf[offset..offset + hmac_len].to_vec();
            offset += hmac_len;
            Some(hmac)
        } else {
            None
        };

        let read_u32 =
            |at: usize| u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        Ok(Self {
            packet_type: buf[0],
            session_id: SessionId::new(session_id),
            hmac,
            packet_id: read_u32(offset),
            timestamp: read_u32(offset + 4),
            message_array_length: buf[offset + 8],
            message_packet_id: read_u32(offset + 9),
        })
    }

    /// Deserializes a TCP-framed packet, checking the length prefix.
    ///
    /// # Errors
    /// Returns `PacketError::TooShort` or `PacketError::LengthMismatch`.
    pub fn from_stream_bytes(buf: &[u8], hmac_len: usize) -> Result<Self, PacketError> {
        if buf.len() < STREAM_LENGTH_PREFIX {
            return Err(PacketError::TooShort {
                expected: STREAM_LENGTH_PREFIX,
                actual: buf.len(),
            });
        }
        let prefix = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        let payload = &buf[STREAM_LENGTH_PREFIX..];
        if prefix != payload.len() {
            return Err(PacketError::LengthMismatch {
                prefix,
                payload: payload.len(),
            });
        }
        Self::from_bytes(payload, hmac_len)
    }
}

/// Builds a fresh probe packet ready to be sent.
///
/// A new random session id and the current time are used. When `key` is
/// given the packet is signed with `digest.algorithm`. Stream transports get
/// the 2-byte length prefix.
pub fn build(transport_is_stream: bool, key: Option<&HmacKey>, digest: DigestSpec) -> Vec<u8> {
    let mut packet = ProbePacket::new(SessionId::random(), generate_timestamp());

    if let Some(key) = key {
        packet.sign(key, digest.algorithm);
    }

    log::debug!(
        "Built probe packet: session {:?}, timestamp {}, hmac {} bytes",
        packet.session_id,
        packet.timestamp,
        packet.hmac.as_ref().map_or(0, Vec::len)
    );

    if transport_is_stream {
        packet.to_stream_bytes()
    } else {
        packet.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> ProbePacket {
        ProbePacket::new(
            SessionId::new([0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]),
            0x6553_F100,
        )
    }

    #[test]
    fn test_hard_reset_type_byte() {
        assert_eq!(HARD_RESET_CLIENT_TYPE, 0x38);
        assert_eq!(Opcode::ControlHardResetClientV2.type_byte(KEY_ID), 0x38);
        assert_eq!(
            Opcode::from_type_byte(0x38),
            Some(Opcode::ControlHardResetClientV2)
        );
    }

    #[test]
    fn test_opcode_ignores_key_id() {
        assert_eq!(
            Opcode::from_type_byte(0x40),
            Some(Opcode::ControlHardResetServerV2)
        );
        assert_eq!(
            Opcode::from_type_byte(0x45),
            Some(Opcode::ControlHardResetServerV2)
        );
        assert_eq!(Opcode::from_type_byte(0x00), None);
        assert_eq!(Opcode::from_type_byte(0xF8), None);
    }

    #[test]
    fn test_unsigned_layout() {
        let bytes = sample_packet().to_bytes();
        assert_eq!(
            bytes,
            vec![
                0x38, // type
                0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, // session id
                0x00, 0x00, 0x00, 0x01, // packet id
                0x65, 0x53, 0xF1, 0x00, // timestamp
                0x00, // ack array length
                0x00, 0x00, 0x00, 0x00, // message packet id
            ]
        );
        assert_eq!(bytes.len(), UNAUTH_PACKET_SIZE);
    }

    #[test]
    fn test_hmac_input_order() {
        let input = sample_packet().hmac_input();
        assert_eq!(
            input,
            vec![
                0x00, 0x00, 0x00, 0x01, // packet id
                0x65, 0x53, 0xF1, 0x00, // timestamp
                0x38, // type
                0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, // session id
                0x00, // ack array length
                0x00, 0x00, 0x00, 0x00, // message packet id
            ]
        );
    }

    #[test]
    fn test_signed_layout_places_hmac_after_session_id() {
        let key = HmacKey::new(vec![0xab; 20]).unwrap();
        let mut packet = sample_packet();
        packet.sign(&key, DigestAlgorithm::Sha1);

        let bytes = packet.to_bytes();
        let expected_hmac =
            DigestAlgorithm::Sha1.hmac(&[0xab; 20], &[packet.hmac_input().as_slice()]);

        assert_eq!(bytes.len(), UNAUTH_PACKET_SIZE + 20);
        assert_eq!(&bytes[..9], &sample_packet().to_bytes()[..9]);
        assert_eq!(&bytes[9..29], expected_hmac.as_slice());
        assert_eq!(&bytes[29..], &sample_packet().to_bytes()[9..]);
    }

    #[test]
    fn test_sign_covers_fields_in_replay_protection_order() {
        let key = HmacKey::new(vec![0x42; 32]).unwrap();
        let mut packet = sample_packet();
        packet.sign(&key, DigestAlgorithm::Sha256);

        let fields: [&[u8]; 6] = [
            &[0x00, 0x00, 0x00, 0x01],
            &[0x65, 0x53, 0xF1, 0x00],
            &[0x38],
            &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88],
            &[0x00],
            &[0x00, 0x00, 0x00, 0x00],
        ];
        let expected = DigestAlgorithm::Sha256.hmac(&[0x42; 32], &fields);
        assert_eq!(packet.hmac, Some(expected));
    }

    #[test]
    fn test_hmac_matches_independent_computation_for_all_digests() {
        let key = HmacKey::new(vec![0x5a; 64]).unwrap();
        for alg in DigestAlgorithm::ALL {
            let bytes = build(false, Some(&key), DigestSpec::natural(alg));
            let parsed = ProbePacket::from_bytes(&bytes, alg.output_size()).unwrap();

            let recomputed = alg.hmac(&[0x5a; 64], &[parsed.hmac_input().as_slice()]);
            assert_eq!(parsed.hmac, Some(recomputed), "digest {}", alg);
        }
    }

    #[test]
    fn test_hmac_not_truncated_to_digest_size_override() {
        let key = HmacKey::new(vec![0x01; 16]).unwrap();
        let spec = DigestSpec::new(DigestAlgorithm::Sha256, Some(16)).unwrap();
        let bytes = build(false, Some(&key), spec);
        assert_eq!(bytes.len(), UNAUTH_PACKET_SIZE + 32);
    }

    #[test]
    fn test_datagram_lengths() {
        assert_eq!(build(false, None, DigestSpec::default()).len(), 22);

        let key = HmacKey::new(vec![0x01; 20]).unwrap();
        for alg in DigestAlgorithm::ALL {
            let bytes = build(false, Some(&key), DigestSpec::natural(alg));
            assert_eq!(bytes.len(), 1 + 8 + alg.output_size() + 4 + 4 + 1 + 4);
        }
    }

    #[test]
    fn test_stream_length_prefix() {
        let key = HmacKey::new(vec![0x01; 20]).unwrap();
        for key in [None, Some(&key)] {
            let bytes = build(true, key, DigestSpec::default());
            let prefix = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
            assert_eq!(prefix, bytes.len() - STREAM_LENGTH_PREFIX);
            assert_eq!(bytes[2], HARD_RESET_CLIENT_TYPE);
        }
    }

    #[test]
    fn test_build_uses_fresh_session_ids() {
        let spec = DigestSpec::default();
        let first = ProbePacket::from_bytes(&build(false, None, spec), 0).unwrap();
        let second = ProbePacket::from_bytes(&build(false, None, spec), 0).unwrap();
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(first.packet_id, PROBE_PACKET_ID);
        assert_eq!(first.message_array_length, 0);
        assert_eq!(first.message_packet_id, 0);
    }

    #[test]
    fn test_from_bytes_too_short() {
        assert_eq!(
            ProbePacket::from_bytes(&[0x38; 21], 0),
            Err(PacketError::TooShort {
                expected: 22,
                actual: 21,
            })
        );
        assert!(ProbePacket::from_bytes(&[0x38; 22], 20).is_err());
    }

    #[test]
    fn test_from_stream_bytes() {
        let packet = sample_packet();
        let parsed = ProbePacket::from_stream_bytes(&packet.to_stream_bytes(), 0).unwrap();
        assert_eq!(parsed, packet);

        let mut broken = packet.to_stream_bytes();
        broken[1] += 1;
        assert_eq!(
            ProbePacket::from_stream_bytes(&broken, 0),
            Err(PacketError::LengthMismatch {
                prefix: 23,
                payload: 22,
            })
        );
    }
}
