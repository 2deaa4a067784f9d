//! Engine configuration

/// Static configuration for a [`DataClockEngine`](crate::DataClockEngine).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Byte-string topic identifying the sub-chain this engine follows.
    /// Per-peer response topics are `filter || peer_id`.
    pub filter: Vec<u8>,
    /// Execution-layer address stamped into outgoing envelopes.
    pub local_address: Vec<u8>,
}

impl EngineConfig {
    pub fn new(filter: impl Into<Vec<u8>>) -> Self {
        Self {
            filter: filter.into(),
            local_address: Vec::new(),
        }
    }

    pub fn with_local_address(mut self, address: impl Into<Vec<u8>>) -> Self {
        self.local_address = address.into();
        self
    }
}
