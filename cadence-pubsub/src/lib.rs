//! Pub/sub abstraction for Cadence networking
//!
//! Pure transport-level gossip: subscribe to byte-string topics and exchange
//! raw envelopes. Message encoding and dispatch live in `cadence-consensus`;
//! implementations deal only in bytes and peer identity. Topics compose as
//! `filter || peer_id` for per-peer response channels.

use cadence_model::PeerId;
use tokio::sync::broadcast;

/// Error type for pub/sub operations.
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("publish failed: {0}")]
    Publish(String),
}

/// One message as delivered by the transport.
///
/// `signature` is the transport-level signature over `data`; the core treats
/// it as opaque (gossip authentication is the transport's concern).
#[derive(Clone, Debug)]
pub struct TransportMessage {
    pub from: PeerId,
    pub data: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Transport-level pub/sub interface.
///
/// Subscribing yields a broadcast receiver; the consumer drives it from a
/// single task so handler invocations for one topic stay serialized.
/// Loopback is included: subscribers see their own publishes, and the
/// consumer is responsible for dropping self-originated traffic.
#[async_trait::async_trait]
pub trait PubSub: Send + Sync + 'static {
    /// The local peer identity, as embedded in outgoing messages.
    fn peer_id(&self) -> PeerId;

    /// Subscribe to a topic. Each call returns a fresh receiver; callers
    /// that need idempotency keep their own membership set.
    async fn subscribe(
        &self,
        topic: &[u8],
    ) -> Result<broadcast::Receiver<TransportMessage>, PubSubError>;

    /// Publish raw bytes to every subscriber of a topic.
    async fn publish(&self, topic: &[u8], payload: Vec<u8>) -> Result<(), PubSubError>;

    /// Drop local interest in a topic.
    async fn unsubscribe(&self, topic: &[u8]);
}
