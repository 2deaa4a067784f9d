//! Pairing-oracle seam
//!
//! The production curve backend is an external library; the core consumes it
//! through this trait only. Implementations must be pure: the verifier may be
//! parallelized across frames.

use thiserror::Error;

/// Errors surfaced by a [`FrameProver`] backend.
#[derive(Error, Debug)]
pub enum ProverError {
    #[error("invalid compressed point")]
    InvalidPoint,

    #[error("polynomial of {len} scalars does not fit domain of size {domain}")]
    DomainOverflow { len: usize, domain: u64 },

    #[error("backend error: {0}")]
    Backend(String),
}

/// Curve oracle consumed by the frame verifier.
pub trait FrameProver: Send + Sync + 'static {
    type Scalar: Clone + Send + Sync + 'static;
    type Point: Clone + PartialEq + Send + Sync + 'static;

    /// Interpret raw bytes as a polynomial over the scalar field.
    fn bytes_to_polynomial(&self, data: &[u8]) -> Result<Vec<Self::Scalar>, ProverError>;

    /// The additive identity of the scalar field, used for domain padding.
    fn scalar_zero(&self) -> Self::Scalar;

    /// Evaluate (or invert) the polynomial over a domain of the given size.
    fn fft(
        &self,
        poly: Vec<Self::Scalar>,
        domain_size: u64,
        inverse: bool,
    ) -> Result<Vec<Self::Scalar>, ProverError>;

    /// Decode a compressed G1 point.
    fn point_from_compressed(&self, bytes: &[u8]) -> Result<Self::Point, ProverError>;

    /// Verify an aggregate KZG-style proof binding the evaluated polynomials
    /// and their commitments to the aggregate commitment.
    fn verify_aggregate_proof(
        &self,
        aggregate_poly: &[Vec<Self::Scalar>],
        commitments: &[Self::Point],
        aggregate_commitment: &Self::Point,
        proof: &Self::Point,
    ) -> Result<bool, ProverError>;
}
