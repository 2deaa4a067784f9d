//! Frame verification for the Cadence ceremony clock
//!
//! The pairing-curve primitives (polynomial conversion, FFT, aggregate KZG
//! verification, compressed-point decoding) live behind the [`FrameProver`]
//! trait; this crate owns everything around them: commitment parsing, the
//! SHAKE-256 intrinsic expansion, domain padding, and the per-proof
//! verification loop.

mod prover;
pub mod testing;
mod verifier;

pub use prover::{FrameProver, ProverError};
pub use verifier::{FrameVerifier, VerificationError};

/// Polynomial domain size for intrinsic-execution-output commitments.
pub const INTRINSIC_DOMAIN: u64 = 16;

/// Polynomial domain size for all other inclusion commitments.
pub const DEFAULT_DOMAIN: u64 = 128;

/// SHAKE-256 expansion length for intrinsic commitments, in bytes.
pub const INTRINSIC_EXPANSION_LEN: usize = 1024;
