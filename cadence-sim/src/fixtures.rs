//! Frame fixtures
//!
//! Mints clock frames that pass the full verification pipeline against
//! [`MockProver`]: signed headers, a well-formed input layout, and aggregate
//! proofs the mock oracle accepts. Chains are built by pointing each frame's
//! parent selector at the previous frame's selector.

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;

use cadence_crypto::testing::MockProver;
use cadence_model::{
    AggregateProof, ClockFrame, Ed25519Signature, InclusionCommitment, FRAME_HEADER_LEN,
    INTRINSIC_EXECUTION_OUTPUT_TYPE,
};

/// A test prover identity: an Ed25519 keypair plus its derived address.
pub struct TestProver {
    signing_key: SigningKey,
}

impl TestProver {
    pub fn random() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair for reproducible fixtures.
    pub fn from_seed(seed: u8) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&[seed; 32]),
        }
    }

    /// The prover address frames signed by this identity carry.
    pub fn address(&self) -> Vec<u8> {
        blake3::hash(self.signing_key.verifying_key().as_bytes())
            .as_bytes()
            .to_vec()
    }
}

/// Builder for verifiable clock frames.
pub struct FrameFixture<'a> {
    prover: &'a TestProver,
    filter: Vec<u8>,
    frame_number: u64,
    timestamp: i64,
    difficulty: u32,
    parent_selector: Vec<u8>,
    output: Vec<u8>,
    commitments: Vec<InclusionCommitment>,
}

impl<'a> FrameFixture<'a> {
    pub fn new(filter: impl Into<Vec<u8>>, frame_number: u64, prover: &'a TestProver) -> Self {
        Self {
            prover,
            filter: filter.into(),
            frame_number,
            timestamp: 1_700_000_000,
            difficulty: 1,
            parent_selector: vec![0],
            // Distinct default output per height so selectors never collide.
            output: frame_number.to_be_bytes().to_vec(),
            commitments: Vec::new(),
        }
    }

    /// Chain onto `parent`: parent selector becomes the parent's selector.
    pub fn parent(mut self, parent: &ClockFrame) -> Self {
        self.parent_selector = parent.selector().to_bytes_be();
        self
    }

    pub fn parent_selector(mut self, parent_selector: Vec<u8>) -> Self {
        self.parent_selector = parent_selector;
        self
    }

    pub fn output(mut self, output: Vec<u8>) -> Self {
        self.output = output;
        self
    }

    /// Add a default-path inclusion commitment over `data`.
    pub fn commitment(mut self, data: &[u8]) -> Self {
        let commitment = MockProver::default().commitment_for(data).to_vec();
        self.commitments.push(InclusionCommitment {
            type_url: "cadence.KeyBundleAnnouncement".into(),
            data: data.to_vec(),
            commitment,
        });
        self
    }

    /// Add an intrinsic-execution-output commitment over `data`.
    pub fn intrinsic_commitment(mut self, data: &[u8]) -> Self {
        let commitment = MockProver::default().commitment_for(data).to_vec();
        self.commitments.push(InclusionCommitment {
            type_url: INTRINSIC_EXECUTION_OUTPUT_TYPE.into(),
            data: data.to_vec(),
            commitment,
        });
        self
    }

    /// Assemble and sign the frame. Frames with no commitments carry an
    /// empty aggregate region and no proofs, which still verifies.
    pub fn build(self) -> ClockFrame {
        let prover = MockProver::default();
        let mut input = vec![0u8; FRAME_HEADER_LEN];
        let mut aggregate_proofs = Vec::new();

        if !self.commitments.is_empty() {
            let (aggregate_commitment, proof) = prover
                .prove_inclusion_commitments(&self.commitments)
                .expect("mock prover accepts fixture commitments");
            input.extend_from_slice(&aggregate_commitment);
            aggregate_proofs.push(AggregateProof {
                filter: self.filter.clone(),
                frame_number: self.frame_number,
                inclusion_commitments: self.commitments,
                proof: proof.to_vec(),
            });
        }

        let mut frame = ClockFrame {
            filter: self.filter,
            frame_number: self.frame_number,
            timestamp: self.timestamp,
            difficulty: self.difficulty,
            parent_selector: self.parent_selector,
            input,
            output: self.output,
            aggregate_proofs,
            public_key_signature: None,
        };

        let signature = self.prover.signing_key.sign(&frame.signable_bytes());
        frame.public_key_signature = Some(Ed25519Signature {
            public_key: self.prover.signing_key.verifying_key().to_bytes().to_vec(),
            signature: signature.to_bytes().to_vec(),
        });
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_crypto::FrameVerifier;
    use std::sync::Arc;

    #[test]
    fn fixture_frames_pass_verification() {
        let prover = TestProver::from_seed(1);
        let frame = FrameFixture::new(b"test-filter".to_vec(), 5, &prover)
            .commitment(b"bundle data")
            .intrinsic_commitment(b"execution output")
            .build();

        let verifier = FrameVerifier::new(Arc::new(MockProver::default()));
        verifier.verify(&frame).unwrap();
        assert_eq!(frame.address().unwrap(), prover.address());
    }

    #[test]
    fn chained_fixture_points_at_parent_selector() {
        let prover = TestProver::from_seed(2);
        let parent = FrameFixture::new(b"f".to_vec(), 1, &prover).build();
        let child = FrameFixture::new(b"f".to_vec(), 2, &prover)
            .parent(&parent)
            .build();

        assert_eq!(child.parent_selector, parent.selector().to_bytes_be());
    }
}
