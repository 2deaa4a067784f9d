//! In-memory transport and fixtures for Cadence tests
//!
//! `MemoryPubSub` is an all-to-all broker over tokio broadcast channels,
//! mirroring what a gossip mesh delivers (loopback included; the engine is
//! the one that drops self-originated traffic). `fixtures` mints clock frames
//! that verify against the mock pairing oracle.

pub mod fixtures;
mod memory;

pub use memory::{MemoryNetwork, MemoryPubSub};
