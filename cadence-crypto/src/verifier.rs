//! Frame-verification pipeline
//!
//! Step A: structural self-verify (signature over header + content hashes).
//! Step B: parse the packed aggregate-commitment points from `input`.
//! Step C: per proof, rebuild the evaluated polynomials from the inclusion
//! commitments and check the aggregate proof against the matching commitment.
//!
//! Every failure is fatal to the frame; there is no partial accept.

use sha3::{
    digest::{ExtendableOutput, Update, XofReader},
    Shake256,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use cadence_model::{
    ClockFrame, FrameError, COMMITMENT_POINT_LEN, FRAME_HEADER_LEN,
    INTRINSIC_EXECUTION_OUTPUT_TYPE,
};

use crate::prover::{FrameProver, ProverError};
use crate::{DEFAULT_DOMAIN, INTRINSIC_DOMAIN, INTRINSIC_EXPANSION_LEN};

/// Why a frame failed verification.
#[derive(Error, Debug)]
pub enum VerificationError {
    /// Structural failure: missing or bad signature, or a trie-membership
    /// violation detected by the caller.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Commitment or point decode failure, including input-layout violations.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// An aggregate proof did not verify.
    #[error("invalid proof")]
    InvalidProof,

    /// The oracle failed outside of point decoding.
    #[error("prover error: {0}")]
    Prover(#[from] ProverError),
}

impl From<FrameError> for VerificationError {
    fn from(err: FrameError) -> Self {
        VerificationError::InvalidFrame(err.to_string())
    }
}

/// Verifies clock frames against a curve oracle.
pub struct FrameVerifier<P: FrameProver> {
    prover: Arc<P>,
}

impl<P: FrameProver> Clone for FrameVerifier<P> {
    fn clone(&self) -> Self {
        Self {
            prover: self.prover.clone(),
        }
    }
}

impl<P: FrameProver> FrameVerifier<P> {
    pub fn new(prover: Arc<P>) -> Self {
        Self { prover }
    }

    pub fn prover(&self) -> &Arc<P> {
        &self.prover
    }

    /// Decode the packed 74-byte commitment points following the 516-byte
    /// header of `input`.
    pub fn parse_aggregate_commitments(
        &self,
        frame: &ClockFrame,
    ) -> Result<Vec<P::Point>, VerificationError> {
        let input = &frame.input;
        if input.len() < FRAME_HEADER_LEN {
            return Err(VerificationError::InvalidEncoding(format!(
                "input of {} bytes is shorter than the {}-byte header",
                input.len(),
                FRAME_HEADER_LEN
            )));
        }
        let tail = input.len() - FRAME_HEADER_LEN;
        if tail % COMMITMENT_POINT_LEN != 0 {
            return Err(VerificationError::InvalidEncoding(format!(
                "commitment region of {} bytes is not a multiple of {}",
                tail, COMMITMENT_POINT_LEN
            )));
        }

        let mut commitments = Vec::with_capacity(tail / COMMITMENT_POINT_LEN);
        for chunk in input[FRAME_HEADER_LEN..].chunks_exact(COMMITMENT_POINT_LEN) {
            let point = self.prover.point_from_compressed(chunk).map_err(|_| {
                VerificationError::InvalidEncoding("bad aggregate commitment point".into())
            })?;
            commitments.push(point);
        }
        Ok(commitments)
    }

    /// Full verification of a frame. Fatal on the first failing step.
    pub fn verify(&self, frame: &ClockFrame) -> Result<(), VerificationError> {
        frame.verify_signature()?;

        let aggregate_commitments = self.parse_aggregate_commitments(frame)?;
        if frame.aggregate_proofs.len() != aggregate_commitments.len() {
            return Err(VerificationError::InvalidEncoding(format!(
                "{} aggregate proofs for {} commitments",
                frame.aggregate_proofs.len(),
                aggregate_commitments.len()
            )));
        }

        for (index, proof) in frame.aggregate_proofs.iter().enumerate() {
            let mut aggregate_poly = Vec::with_capacity(proof.inclusion_commitments.len());
            let mut commitments = Vec::with_capacity(proof.inclusion_commitments.len());

            for commit in &proof.inclusion_commitments {
                let eval_poly = if commit.type_url == INTRINSIC_EXECUTION_OUTPUT_TYPE {
                    debug!(frame_number = frame.frame_number, "confirming inclusion in aggregate");
                    let mut digest = Shake256::default();
                    digest.update(&commit.data);
                    let mut expand = vec![0u8; INTRINSIC_EXPANSION_LEN];
                    digest.finalize_xof().read(&mut expand);

                    let poly = self.prover.bytes_to_polynomial(&expand)?;
                    self.prover.fft(poly, INTRINSIC_DOMAIN, false)?
                } else {
                    let mut poly = self.prover.bytes_to_polynomial(&commit.data)?;
                    if poly.len() > DEFAULT_DOMAIN as usize {
                        return Err(VerificationError::Prover(ProverError::DomainOverflow {
                            len: poly.len(),
                            domain: DEFAULT_DOMAIN,
                        }));
                    }
                    poly.resize(DEFAULT_DOMAIN as usize, self.prover.scalar_zero());
                    self.prover.fft(poly, DEFAULT_DOMAIN, false)?
                };
                aggregate_poly.push(eval_poly);

                let point = self.prover.point_from_compressed(&commit.commitment).map_err(|_| {
                    VerificationError::InvalidEncoding("bad inclusion commitment point".into())
                })?;
                commitments.push(point);
            }

            let proof_point = self
                .prover
                .point_from_compressed(&proof.proof)
                .map_err(|_| VerificationError::InvalidEncoding("bad proof point".into()))?;

            match self.prover.verify_aggregate_proof(
                &aggregate_poly,
                &commitments,
                &aggregate_commitments[index],
                &proof_point,
            ) {
                Ok(true) => {}
                Ok(false) | Err(_) => return Err(VerificationError::InvalidProof),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProver;
    use cadence_model::{AggregateProof, Ed25519Signature, InclusionCommitment};
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn verifier() -> FrameVerifier<MockProver> {
        FrameVerifier::new(Arc::new(MockProver::default()))
    }

    /// Builds a fully valid single-proof frame against the mock oracle.
    fn valid_frame() -> ClockFrame {
        let prover = MockProver::default();
        let key = SigningKey::generate(&mut OsRng);

        let commitments = vec![
            InclusionCommitment {
                type_url: INTRINSIC_EXECUTION_OUTPUT_TYPE.into(),
                data: b"intrinsic execution output".to_vec(),
                commitment: prover.commitment_for(b"intrinsic execution output").to_vec(),
            },
            InclusionCommitment {
                type_url: "cadence.KeyBundleAnnouncement".into(),
                data: b"a key bundle".to_vec(),
                commitment: prover.commitment_for(b"a key bundle").to_vec(),
            },
        ];

        let (aggregate_commitment, proof_point) = prover
            .prove_inclusion_commitments(&commitments)
            .expect("mock prove");

        let mut input = vec![0u8; FRAME_HEADER_LEN];
        input.extend_from_slice(&aggregate_commitment);

        let mut frame = ClockFrame {
            filter: vec![1, 2, 3, 4],
            frame_number: 9,
            timestamp: 1_700_000_000,
            difficulty: 4,
            parent_selector: vec![0x22; 32],
            input,
            output: vec![5u8; 48],
            aggregate_proofs: vec![AggregateProof {
                filter: vec![1, 2, 3, 4],
                frame_number: 9,
                inclusion_commitments: commitments,
                proof: proof_point.to_vec(),
            }],
            public_key_signature: None,
        };
        let signature = key.sign(&frame.signable_bytes());
        frame.public_key_signature = Some(Ed25519Signature {
            public_key: key.verifying_key().to_bytes().to_vec(),
            signature: signature.to_bytes().to_vec(),
        });
        frame
    }

    #[test]
    fn valid_frame_verifies() {
        verifier().verify(&valid_frame()).unwrap();
    }

    #[test]
    fn short_input_is_invalid_encoding() {
        let mut frame = valid_frame();
        frame.input.truncate(100);
        resign(&mut frame);
        assert!(matches!(
            verifier().verify(&frame),
            Err(VerificationError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn ragged_commitment_region_is_invalid_encoding() {
        let mut frame = valid_frame();
        frame.input.push(0xFF);
        resign(&mut frame);
        assert!(matches!(
            verifier().verify(&frame),
            Err(VerificationError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn proof_count_mismatch_is_invalid_encoding() {
        let mut frame = valid_frame();
        frame.aggregate_proofs.clear();
        resign(&mut frame);
        assert!(matches!(
            verifier().verify(&frame),
            Err(VerificationError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn corrupted_proof_is_invalid_proof() {
        let mut frame = valid_frame();
        frame.aggregate_proofs[0].proof[0] ^= 0xFF;
        assert!(matches!(
            verifier().verify(&frame),
            Err(VerificationError::InvalidProof)
        ));
    }

    #[test]
    fn corrupted_inclusion_data_is_invalid_proof() {
        let mut frame = valid_frame();
        frame.aggregate_proofs[0].inclusion_commitments[1].data[0] ^= 0xFF;
        assert!(matches!(
            verifier().verify(&frame),
            Err(VerificationError::InvalidProof)
        ));
    }

    #[test]
    fn tampered_header_is_invalid_frame() {
        let mut frame = valid_frame();
        frame.frame_number += 1;
        assert!(matches!(
            verifier().verify(&frame),
            Err(VerificationError::InvalidFrame(_))
        ));
    }

    fn resign(frame: &mut ClockFrame) {
        let key = SigningKey::generate(&mut OsRng);
        let signature = key.sign(&frame.signable_bytes());
        frame.public_key_signature = Some(Ed25519Signature {
            public_key: key.verifying_key().to_bytes().to_vec(),
            signature: signature.to_bytes().to_vec(),
        });
    }
}
