//! Strong types shared across the workspace

use std::fmt;

/// Opaque transport peer identifier.
///
/// Peer ids are produced by the pub/sub layer and treated as raw bytes;
/// no length is assumed.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct PeerId(Vec<u8>);

impl PeerId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.clone()
    }

    /// Short hex form for logs.
    pub fn fmt_short(&self) -> String {
        let n = self.0.len().min(4);
        hex::encode(&self.0[..n])
    }
}

impl From<Vec<u8>> for PeerId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for PeerId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl AsRef<[u8]> for PeerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", hex::encode(&self.0))
    }
}

/// Where the engine currently is in its sync exchange.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SyncStatus {
    /// No exchange in flight.
    #[default]
    NotSyncing,
    /// A request was sent; the target has not answered yet.
    AwaitingResponse,
    /// A response batch is being verified and applied.
    Synchronizing,
}
