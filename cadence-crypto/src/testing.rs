//! Deterministic stand-in for the pairing oracle
//!
//! `MockProver` implements [`FrameProver`] over blake3 instead of a pairing
//! curve: points are opaque 74-byte blobs and an aggregate proof verifies
//! exactly when it equals the keyed digest of its inputs. The prove side is
//! exposed so fixtures can mint frames the verifier accepts, and corrupting
//! any byte of the inputs breaks verification, which is what the tests need.
//! Not cryptography; do not use outside tests and local simulation.

use cadence_model::{InclusionCommitment, COMMITMENT_POINT_LEN, INTRINSIC_EXECUTION_OUTPUT_TYPE};

use crate::prover::{FrameProver, ProverError};
use crate::{DEFAULT_DOMAIN, INTRINSIC_DOMAIN, INTRINSIC_EXPANSION_LEN};

use sha3::{
    digest::{ExtendableOutput, Update, XofReader},
    Shake256,
};

/// 64-byte scalar, matching the width of the production field.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MockScalar(pub [u8; 64]);

/// Opaque 74-byte "compressed point".
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MockPoint(pub [u8; COMMITMENT_POINT_LEN]);

#[derive(Clone, Copy, Debug, Default)]
pub struct MockProver;

const SCALAR_LEN: usize = 64;

fn digest74(domain_tag: &str, parts: &[&[u8]]) -> [u8; COMMITMENT_POINT_LEN] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain_tag.as_bytes());
    for part in parts {
        hasher.update(&(part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    let mut out = [0u8; COMMITMENT_POINT_LEN];
    hasher.finalize_xof().fill(&mut out);
    out
}

fn flatten_polys(aggregate_poly: &[Vec<MockScalar>]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for poly in aggregate_poly {
        bytes.extend_from_slice(&(poly.len() as u64).to_be_bytes());
        for scalar in poly {
            bytes.extend_from_slice(&scalar.0);
        }
    }
    bytes
}

fn flatten_points(points: &[MockPoint]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(points.len() * COMMITMENT_POINT_LEN);
    for point in points {
        bytes.extend_from_slice(&point.0);
    }
    bytes
}

impl MockProver {
    /// Deterministic 74-byte commitment blob for arbitrary data.
    pub fn commitment_for(&self, data: &[u8]) -> [u8; COMMITMENT_POINT_LEN] {
        digest74("cadence.mock.commit", &[data])
    }

    /// Prove-side digest matching [`FrameProver::verify_aggregate_proof`].
    pub fn prove_aggregate(
        &self,
        aggregate_poly: &[Vec<MockScalar>],
        commitments: &[MockPoint],
        aggregate_commitment: &MockPoint,
    ) -> MockPoint {
        MockPoint(digest74(
            "cadence.mock.proof",
            &[
                &flatten_polys(aggregate_poly),
                &flatten_points(commitments),
                &aggregate_commitment.0,
            ],
        ))
    }

    /// Run the verifier's polynomial pipeline over a set of inclusion
    /// commitments and return `(aggregate_commitment, proof)` bytes that
    /// will verify. The aggregate commitment belongs in `ClockFrame.input`
    /// after the header; the proof in `AggregateProof.proof`.
    pub fn prove_inclusion_commitments(
        &self,
        inclusion_commitments: &[InclusionCommitment],
    ) -> Result<([u8; COMMITMENT_POINT_LEN], [u8; COMMITMENT_POINT_LEN]), ProverError> {
        let mut aggregate_poly = Vec::with_capacity(inclusion_commitments.len());
        let mut commitments = Vec::with_capacity(inclusion_commitments.len());

        for commit in inclusion_commitments {
            let eval_poly = if commit.type_url == INTRINSIC_EXECUTION_OUTPUT_TYPE {
                let mut digest = Shake256::default();
                digest.update(&commit.data);
                let mut expand = vec![0u8; INTRINSIC_EXPANSION_LEN];
                digest.finalize_xof().read(&mut expand);

                let poly = self.bytes_to_polynomial(&expand)?;
                self.fft(poly, INTRINSIC_DOMAIN, false)?
            } else {
                let mut poly = self.bytes_to_polynomial(&commit.data)?;
                if poly.len() > DEFAULT_DOMAIN as usize {
                    return Err(ProverError::DomainOverflow {
                        len: poly.len(),
                        domain: DEFAULT_DOMAIN,
                    });
                }
                poly.resize(DEFAULT_DOMAIN as usize, self.scalar_zero());
                self.fft(poly, DEFAULT_DOMAIN, false)?
            };
            aggregate_poly.push(eval_poly);
            commitments.push(self.point_from_compressed(&commit.commitment)?);
        }

        let aggregate_commitment = MockPoint(digest74(
            "cadence.mock.aggregate",
            &[&flatten_polys(&aggregate_poly), &flatten_points(&commitments)],
        ));
        let proof = self.prove_aggregate(&aggregate_poly, &commitments, &aggregate_commitment);
        Ok((aggregate_commitment.0, proof.0))
    }
}

impl FrameProver for MockProver {
    type Scalar = MockScalar;
    type Point = MockPoint;

    fn bytes_to_polynomial(&self, data: &[u8]) -> Result<Vec<MockScalar>, ProverError> {
        let mut poly = Vec::with_capacity(data.len().div_ceil(SCALAR_LEN));
        for chunk in data.chunks(SCALAR_LEN) {
            let mut scalar = [0u8; SCALAR_LEN];
            scalar[..chunk.len()].copy_from_slice(chunk);
            poly.push(MockScalar(scalar));
        }
        Ok(poly)
    }

    fn scalar_zero(&self) -> MockScalar {
        MockScalar([0u8; SCALAR_LEN])
    }

    fn fft(
        &self,
        poly: Vec<MockScalar>,
        domain_size: u64,
        inverse: bool,
    ) -> Result<Vec<MockScalar>, ProverError> {
        if poly.len() > domain_size as usize {
            return Err(ProverError::DomainOverflow {
                len: poly.len(),
                domain: domain_size,
            });
        }

        // Every output scalar depends on every input byte, which is all the
        // sensitivity the mock needs.
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"cadence.mock.fft");
        hasher.update(&domain_size.to_be_bytes());
        hasher.update(&[inverse as u8]);
        hasher.update(&flatten_polys(std::slice::from_ref(&poly)));
        let mut reader = hasher.finalize_xof();

        let mut out = Vec::with_capacity(domain_size as usize);
        for _ in 0..domain_size {
            let mut scalar = [0u8; SCALAR_LEN];
            reader.fill(&mut scalar);
            out.push(MockScalar(scalar));
        }
        Ok(out)
    }

    fn point_from_compressed(&self, bytes: &[u8]) -> Result<MockPoint, ProverError> {
        let raw: [u8; COMMITMENT_POINT_LEN] =
            bytes.try_into().map_err(|_| ProverError::InvalidPoint)?;
        Ok(MockPoint(raw))
    }

    fn verify_aggregate_proof(
        &self,
        aggregate_poly: &[Vec<MockScalar>],
        commitments: &[MockPoint],
        aggregate_commitment: &MockPoint,
        proof: &MockPoint,
    ) -> Result<bool, ProverError> {
        let expected = self.prove_aggregate(aggregate_poly, commitments, aggregate_commitment);
        Ok(expected == *proof)
    }
}
