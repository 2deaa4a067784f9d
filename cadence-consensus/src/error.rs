use thiserror::Error;

use cadence_crypto::VerificationError;
use cadence_model::FrameError;
use cadence_pubsub::PubSubError;
use cadence_store::StoreError;

/// Errors surfaced by the consensus engine's handlers and lifecycle.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed envelope or payload. The router logs and drops these.
    #[error("transport decode: {0}")]
    Transport(#[from] prost::DecodeError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("verification: {0}")]
    Verification(#[from] VerificationError),

    #[error("frame: {0}")]
    Frame(#[from] FrameError),

    #[error("pubsub: {0}")]
    PubSub(#[from] PubSubError),

    /// The frame's prover is absent from the trie, or its earliest
    /// recorded frame is not older than the frame it signed.
    #[error("prover not eligible to extend frame {frame_number}")]
    ProverNotEligible { frame_number: u64 },

    /// The engine is shutting down and can no longer accept work.
    #[error("engine stopped")]
    Stopped,
}
