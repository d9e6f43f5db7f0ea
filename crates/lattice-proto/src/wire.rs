// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Deterministic framing and CBOR helpers for Lattice submissions.
//!
//! Packet layout:
//!
//! ``MAGIC(4) || VERSION(2) || FLAGS(2) || LENGTH(4) || PAYLOAD || CHECKSUM(32)``
//!
//! * PAYLOAD is a CBOR [`OpEnvelope`]
//! * CHECKSUM = blake3-256 over HEADER (first 12 bytes) || PAYLOAD

use blake3::Hasher;
use ciborium::value::Value;
use serde::{de::DeserializeOwned, Serialize};

use crate::{Message, OpEnvelope};

/// Protocol magic constant "LTC!".
pub const MAGIC: [u8; 4] = [0x4c, 0x54, 0x43, 0x21];
/// Wire protocol version (big-endian u16).
pub const VERSION: u16 = 0x0001;
/// Reserved flags (set to zero for v1).
pub const FLAGS: u16 = 0x0000;
/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 12;
/// Checksum size in bytes (blake3-256).
pub const CHECKSUM_SIZE: usize = 32;

/// Framing and codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// CBOR serialization failed.
    #[error("cbor encode: {0}")]
    Encode(String),
    /// CBOR deserialization failed.
    #[error("cbor decode: {0}")]
    Decode(String),
    /// Input too short for the declared frame.
    #[error("incomplete packet: need {needed} bytes, got {got}")]
    Incomplete {
        /// Bytes required by the frame.
        needed: usize,
        /// Bytes available.
        got: usize,
    },
    /// Magic bytes did not match ["LTC!"](MAGIC).
    #[error("bad magic")]
    BadMagic,
    /// Unsupported wire version.
    #[error("unsupported version {0:#06x}")]
    UnsupportedVersion(u16),
    /// blake3 checksum over header||payload did not verify.
    #[error("checksum mismatch")]
    ChecksumMismatch,
    /// Envelope named an op this codec does not know.
    #[error("unknown op {0:?}")]
    UnknownOp(String),
}

/// Encode to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes).map_err(|e| WireError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Decode from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    ciborium::de::from_reader(bytes).map_err(|e| WireError::Decode(e.to_string()))
}

/// A full packet (header + payload + checksum).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Raw header (12 bytes).
    pub header: [u8; HEADER_SIZE],
    /// CBOR payload bytes.
    pub payload: Vec<u8>,
    /// blake3 checksum over header||payload.
    pub checksum: [u8; CHECKSUM_SIZE],
}

impl Packet {
    /// Build a packet from a CBOR payload.
    pub fn from_payload(payload: Vec<u8>) -> Self {
        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&MAGIC);
        header[4..6].copy_from_slice(&VERSION.to_be_bytes());
        header[6..8].copy_from_slice(&FLAGS.to_be_bytes());
        header[8..12].copy_from_slice(&(payload.len() as u32).to_be_bytes());

        let mut hasher = Hasher::new();
        hasher.update(&header);
        hasher.update(&payload);
        let checksum = *hasher.finalize().as_bytes();

        Packet {
            header,
            payload,
            checksum,
        }
    }

    /// Encode an [`OpEnvelope`] into a full packet byte vector.
    pub fn encode_envelope<P: Serialize>(env: &OpEnvelope<P>) -> Result<Vec<u8>, WireError> {
        let payload = to_cbor(env)?;
        let packet = Packet::from_payload(payload);
        let mut out =
            Vec::with_capacity(HEADER_SIZE + packet.payload.len() + CHECKSUM_SIZE);
        out.extend_from_slice(&packet.header);
        out.extend_from_slice(&packet.payload);
        out.extend_from_slice(&packet.checksum);
        Ok(out)
    }

    /// Decode a packet from a byte slice, returning the envelope and bytes consumed.
    pub fn decode_envelope<P: DeserializeOwned>(
        bytes: &[u8],
    ) -> Result<(OpEnvelope<P>, usize), WireError> {
        if bytes.len() < HEADER_SIZE + CHECKSUM_SIZE {
            return Err(WireError::Incomplete {
                needed: HEADER_SIZE + CHECKSUM_SIZE,
                got: bytes.len(),
            });
        }
        if bytes[0..4] != MAGIC {
            return Err(WireError::BadMagic);
        }
        let version = u16::from_be_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        let len = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let frame_len = HEADER_SIZE + len + CHECKSUM_SIZE;
        if bytes.len() < frame_len {
            return Err(WireError::Incomplete {
                needed: frame_len,
                got: bytes.len(),
            });
        }
        let header = &bytes[0..HEADER_SIZE];
        let payload = &bytes[HEADER_SIZE..HEADER_SIZE + len];
        let checksum = &bytes[HEADER_SIZE + len..frame_len];

        let mut hasher = Hasher::new();
        hasher.update(header);
        hasher.update(payload);
        if hasher.finalize().as_bytes() != checksum {
            return Err(WireError::ChecksumMismatch);
        }

        let env: OpEnvelope<P> = from_cbor(payload)?;
        Ok((env, frame_len))
    }
}

/// Encode a [`Message`] into a packet with the provided logical timestamp.
pub fn encode_message(msg: &Message, ts: u64) -> Result<Vec<u8>, WireError> {
    let payload = match msg {
        Message::Submit(r) => Value::serialized(r),
        Message::Reply(r) => Value::serialized(r),
        Message::Error(e) => Value::serialized(e),
    }
    .map_err(|e| WireError::Encode(e.to_string()))?;

    let env = OpEnvelope {
        op: msg.op_name().to_string(),
        ts,
        payload,
    };
    Packet::encode_envelope(&env)
}

/// Decode bytes into (Message, ts, bytes_consumed).
pub fn decode_message(bytes: &[u8]) -> Result<(Message, u64, usize), WireError> {
    let (env, used) = Packet::decode_envelope::<Value>(bytes)?;
    let ts = env.ts;
    let decode = |v: &Value| -> Result<Message, WireError> {
        match env.op.as_str() {
            "submit" => Ok(Message::Submit(
                v.deserialized()
                    .map_err(|e| WireError::Decode(e.to_string()))?,
            )),
            "reply" => Ok(Message::Reply(
                v.deserialized()
                    .map_err(|e| WireError::Decode(e.to_string()))?,
            )),
            "error" => Ok(Message::Error(
                v.deserialized()
                    .map_err(|e| WireError::Decode(e.to_string()))?,
            )),
            other => Err(WireError::UnknownOp(other.to_string())),
        }
    };
    Ok((decode(&env.payload)?, ts, used))
}

// --- Unit tests -----------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Mutation, NQuad, Object, Request, Response, ResultNode, ScalarValue, Subject};
    use std::collections::BTreeMap;

    fn sample_request() -> Request {
        Request {
            mutation: Mutation {
                set: vec![NQuad {
                    subject: Subject::Blank("person1".into()),
                    predicate: "name".into(),
                    object: Object::Value(ScalarValue::Str("Steven Spielberg".into())),
                    facets: BTreeMap::from([("since".into(), "2006-01-02".into())]),
                }],
                delete: vec![],
            },
            schema: Some("name: string @index(exact) .".into()),
            query: None,
            vars: BTreeMap::new(),
        }
    }

    #[test]
    fn magic_spells_ltc() {
        assert_eq!(hex::encode(MAGIC), "4c544321");
    }

    #[test]
    fn submit_round_trips() {
        let msg = Message::Submit(sample_request());
        let bytes = encode_message(&msg, 7).unwrap();
        let (decoded, ts, used) = decode_message(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(ts, 7);
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn reply_round_trips_with_tree() {
        let mut tree = ResultNode::default();
        tree.attrs
            .insert("name".into(), ScalarValue::Str("Alice".into()));
        tree.children
            .insert("friend".into(), vec![ResultNode::default()]);
        let msg = Message::Reply(Response {
            assigned: BTreeMap::from([("person1".into(), 0x2a)]),
            tree: Some(tree),
        });
        let bytes = encode_message(&msg, 1).unwrap();
        let (decoded, _, _) = decode_message(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn truncation_magic_and_checksum_corruption_fail() {
        let msg = Message::Submit(sample_request());
        let mut bytes = encode_message(&msg, 0).unwrap();

        // 1. Truncation
        assert!(matches!(
            decode_message(&bytes[..bytes.len() - 1]),
            Err(WireError::Incomplete { .. })
        ));

        // 2. Magic corruption
        bytes[0] = b'X';
        assert_eq!(decode_message(&bytes).unwrap_err(), WireError::BadMagic);
        bytes[0] = MAGIC[0];

        // 3. Version corruption
        bytes[5] = 99;
        assert!(matches!(
            decode_message(&bytes),
            Err(WireError::UnsupportedVersion(_))
        ));
        bytes[5] = 0x01;

        // 4. Payload corruption breaks the checksum
        bytes[HEADER_SIZE] ^= 0xff;
        assert_eq!(
            decode_message(&bytes).unwrap_err(),
            WireError::ChecksumMismatch
        );
    }

    #[test]
    fn unknown_op_is_rejected() {
        let env = OpEnvelope {
            op: "mystery".to_string(),
            ts: 0,
            payload: Value::serialized(&Response::default()).unwrap(),
        };
        let bytes = Packet::encode_envelope(&env).unwrap();
        assert_eq!(
            decode_message(&bytes).unwrap_err(),
            WireError::UnknownOp("mystery".into())
        );
    }
}
