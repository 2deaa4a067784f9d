//! Wire protocol messages
//!
//! Hand-derived prost types rather than protoc codegen, so the build needs no
//! external toolchain. Field tags are the wire contract; unknown payload tags
//! decode to `None` and are ignored by the router.

/// Transport envelope carried inside every gossip message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    /// Address of the sender within the execution layer (not the peer id).
    #[prost(bytes = "vec", tag = "1")]
    pub address: Vec<u8>,
    #[prost(oneof = "Payload", tags = "2, 3, 4, 5, 6, 7")]
    pub payload: Option<Payload>,
}

/// Tagged payload union. New message kinds get new tags; decoders that do not
/// know a tag see `None` and skip the message.
#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum Payload {
    #[prost(message, tag = "2")]
    ClockFrame(ClockFrame),
    #[prost(message, tag = "3")]
    ClockFramesRequest(ClockFramesRequest),
    #[prost(message, tag = "4")]
    ClockFramesResponse(ClockFramesResponse),
    #[prost(message, tag = "5")]
    ProvingKeyAnnouncement(ProvingKeyAnnouncement),
    #[prost(message, tag = "6")]
    KeyBundleAnnouncement(KeyBundleAnnouncement),
    #[prost(message, tag = "7")]
    ProvingKeyRequest(ProvingKeyRequest),
}

/// A signed, verifiable unit of the ceremony clock at a given height.
///
/// `input` carries an opaque 516-byte header followed by one 74-byte
/// compressed G1 point per aggregate commitment; `aggregate_proofs[i]`
/// proves the i-th of those commitments.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClockFrame {
    #[prost(bytes = "vec", tag = "1")]
    pub filter: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub frame_number: u64,
    #[prost(int64, tag = "3")]
    pub timestamp: i64,
    #[prost(uint32, tag = "4")]
    pub difficulty: u32,
    /// Big-endian big-integer selector of the parent frame.
    #[prost(bytes = "vec", tag = "5")]
    pub parent_selector: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub input: Vec<u8>,
    /// Content the frame's own selector is derived from.
    #[prost(bytes = "vec", tag = "7")]
    pub output: Vec<u8>,
    #[prost(message, repeated, tag = "8")]
    pub aggregate_proofs: Vec<AggregateProof>,
    #[prost(message, optional, tag = "9")]
    pub public_key_signature: Option<Ed25519Signature>,
}

/// Aggregate KZG-style proof over a set of inclusion commitments.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AggregateProof {
    #[prost(bytes = "vec", tag = "1")]
    pub filter: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub frame_number: u64,
    #[prost(message, repeated, tag = "3")]
    pub inclusion_commitments: Vec<InclusionCommitment>,
    /// Compressed G1 point.
    #[prost(bytes = "vec", tag = "4")]
    pub proof: Vec<u8>,
}

/// One committed datum inside an aggregate proof.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InclusionCommitment {
    #[prost(string, tag = "1")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    /// Compressed G1 point committing to `data`.
    #[prost(bytes = "vec", tag = "3")]
    pub commitment: Vec<u8>,
}

/// Ed25519 signature with its public key, over a frame's signable bytes.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ed25519Signature {
    #[prost(bytes = "vec", tag = "1")]
    pub public_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
}

/// Request for a range of historical frames on a filter.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClockFramesRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub filter: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub from_frame_number: u64,
    #[prost(uint64, tag = "3")]
    pub to_frame_number: u64,
}

/// Response header for a frame range. `(0, 0)` with no frames is the
/// sentinel for "requested base frame is undiscovered", never a valid range.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClockFramesResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub filter: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub from_frame_number: u64,
    #[prost(uint64, tag = "3")]
    pub to_frame_number: u64,
    #[prost(message, repeated, tag = "4")]
    pub clock_frames: Vec<ClockFrame>,
}

/// Announces a proving key to the network.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProvingKeyAnnouncement {
    #[prost(bytes = "vec", tag = "1")]
    pub proving_key_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub key_commitment: Vec<u8>,
}

/// Announces a key bundle bound to a previously announced proving key.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyBundleAnnouncement {
    #[prost(bytes = "vec", tag = "1")]
    pub proving_key_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub bundle: Vec<u8>,
}

/// Asks peers to republish a proving key announcement.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProvingKeyRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub proving_key_bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn envelope_roundtrip() {
        let envelope = Envelope {
            address: vec![0xAA; 32],
            payload: Some(Payload::ClockFramesRequest(ClockFramesRequest {
                filter: vec![1, 2, 3],
                from_frame_number: 10,
                to_frame_number: 14,
            })),
        };

        let bytes = envelope.encode_to_vec();
        let decoded = Envelope::decode(&bytes[..]).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn unknown_payload_tag_decodes_to_none() {
        // Build an envelope whose payload field uses a tag outside the oneof.
        // Field 15, length-delimited, empty body.
        let mut bytes = Envelope {
            address: vec![0x01],
            payload: None,
        }
        .encode_to_vec();
        bytes.extend_from_slice(&[0x7A, 0x00]); // tag 15, wire type 2, len 0

        let decoded = Envelope::decode(&bytes[..]).unwrap();
        assert_eq!(decoded.address, vec![0x01]);
        assert!(decoded.payload.is_none());
    }

    #[test]
    fn clock_frame_roundtrip_preserves_proofs() {
        let frame = ClockFrame {
            filter: vec![9; 4],
            frame_number: 77,
            timestamp: 1_700_000_000,
            difficulty: 10,
            parent_selector: vec![0x42; 32],
            input: vec![0; 516],
            output: vec![7; 64],
            aggregate_proofs: vec![AggregateProof {
                filter: vec![9; 4],
                frame_number: 77,
                inclusion_commitments: vec![InclusionCommitment {
                    type_url: "cadence.KeyBundleAnnouncement".into(),
                    data: vec![1, 2, 3],
                    commitment: vec![0x55; 74],
                }],
                proof: vec![0x66; 74],
            }],
            public_key_signature: None,
        };

        let bytes = frame.encode_to_vec();
        let decoded = ClockFrame::decode(&bytes[..]).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.aggregate_proofs.len(), 1);
    }
}
