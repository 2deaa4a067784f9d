//! Persistent stores for the Cadence ceremony clock
//!
//! Backed by redb. The clock store holds finalized frames (unique per
//! `(filter, frame_number)`) and candidate frames (many per parent, ordered
//! by distance); the key store holds proving keys and key bundles, staged and
//! finalized. `StoreError::NotFound` is a distinguished error: callers branch
//! on it, so it is never folded into another variant.

mod clock_store;
mod error;
mod key_store;

pub use clock_store::{CandidateFrameIter, ClockStore, ClockTransaction};
pub use error::StoreError;
pub use key_store::KeyStore;
