//! MemoryPubSub - in-memory PubSub implementation
//!
//! A shared `MemoryNetwork` broker connects multiple `MemoryPubSub`
//! instances; each topic gets one broadcast channel that every subscribed
//! node shares. Delivery is loopback-inclusive and unordered across topics,
//! like a real gossip mesh.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use cadence_model::PeerId;
use cadence_pubsub::{PubSub, PubSubError, TransportMessage};

const CHANNEL_CAPACITY: usize = 256;

/// Shared broker routing raw bytes between MemoryPubSub instances.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    channels: Arc<RwLock<HashMap<Vec<u8>, broadcast::Sender<TransportMessage>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get_or_create(&self, topic: &[u8]) -> broadcast::Sender<TransportMessage> {
        let mut channels = self.channels.write().await;
        channels
            .entry(topic.to_vec())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

/// One node's handle onto the broker.
pub struct MemoryPubSub {
    peer_id: PeerId,
    network: MemoryNetwork,
}

impl MemoryPubSub {
    pub fn new(peer_id: PeerId, network: &MemoryNetwork) -> Self {
        Self {
            peer_id,
            network: network.clone(),
        }
    }
}

#[async_trait::async_trait]
impl PubSub for MemoryPubSub {
    fn peer_id(&self) -> PeerId {
        self.peer_id.clone()
    }

    async fn subscribe(
        &self,
        topic: &[u8],
    ) -> Result<broadcast::Receiver<TransportMessage>, PubSubError> {
        let sender = self.network.get_or_create(topic).await;
        Ok(sender.subscribe())
    }

    async fn publish(&self, topic: &[u8], payload: Vec<u8>) -> Result<(), PubSubError> {
        let sender = self.network.get_or_create(topic).await;
        // No subscribers yet is not an error; gossip to nobody is a no-op.
        let _ = sender.send(TransportMessage {
            from: self.peer_id.clone(),
            data: payload,
            signature: Vec::new(),
        });
        Ok(())
    }

    async fn unsubscribe(&self, _topic: &[u8]) {
        // Receivers drop with their tasks; the broker keeps the channel for
        // other nodes.
    }
}
