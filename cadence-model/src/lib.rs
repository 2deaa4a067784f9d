//! Wire messages and domain types for the Cadence ceremony clock
//!
//! Everything the consensus core and its collaborators exchange or persist:
//! prost wire messages, frame identity derivations, and the small strong
//! types shared across crates.

pub mod frame;
pub mod proto;
pub mod types;

pub use frame::{FrameError, FrameIdentity};
pub use proto::{
    AggregateProof, ClockFrame, ClockFramesRequest, ClockFramesResponse, Ed25519Signature,
    Envelope, InclusionCommitment, KeyBundleAnnouncement, Payload, ProvingKeyAnnouncement,
    ProvingKeyRequest,
};
pub use types::{PeerId, SyncStatus};

/// Opaque frame header length in bytes; aggregate commitments follow it.
pub const FRAME_HEADER_LEN: usize = 516;

/// Length of one compressed G1 commitment point in `ClockFrame.input`.
pub const COMMITMENT_POINT_LEN: usize = 74;

/// Inclusion commitments of this type carry intrinsic execution output and
/// are expanded through SHAKE-256 before polynomial conversion.
pub const INTRINSIC_EXECUTION_OUTPUT_TYPE: &str = "cadence.IntrinsicExecutionOutput";
