//! Key-announcement handlers
//!
//! Announced proving keys and bundles are staged until the consensus layer
//! sees them committed in a frame. A proving-key request publishes only when
//! a key positively resolves from the main or staged store; an unknown key
//! is a silent drop.

use tracing::debug;

use cadence_crypto::FrameProver;
use cadence_model::{
    KeyBundleAnnouncement, Payload, PeerId, ProvingKeyAnnouncement, ProvingKeyRequest,
};
use cadence_pubsub::PubSub;
use cadence_store::StoreError;

use crate::engine::DataClockEngine;
use crate::error::EngineError;

impl<P: FrameProver, PS: PubSub> DataClockEngine<P, PS> {
    pub(crate) fn handle_proving_key(
        &self,
        peer_id: &PeerId,
        announcement: ProvingKeyAnnouncement,
    ) -> Result<(), EngineError> {
        if announcement.proving_key_bytes.is_empty() {
            debug!(peer_id = %peer_id, "received proving key announcement with empty key");
            return Ok(());
        }

        debug!(
            peer_id = %peer_id,
            proving_key = %hex::encode(&announcement.proving_key_bytes),
            "staging announced proving key",
        );
        self.key_store.put_staged_proving_key(&announcement)?;
        Ok(())
    }

    pub(crate) fn handle_key_bundle(
        &self,
        peer_id: &PeerId,
        announcement: KeyBundleAnnouncement,
    ) -> Result<(), EngineError> {
        if announcement.proving_key_bytes.is_empty() {
            debug!(peer_id = %peer_id, "received key bundle with empty proving key");
            return Ok(());
        }

        match self
            .key_store
            .get_proving_key(&announcement.proving_key_bytes)
        {
            Ok(_) => {
                self.key_store.put_key_bundle(&announcement)?;
            }
            Err(StoreError::NotFound) => {
                debug!(
                    peer_id = %peer_id,
                    proving_key = %hex::encode(&announcement.proving_key_bytes),
                    "staging key bundle for unknown proving key",
                );
                self.key_store.put_staged_key_bundle(&announcement)?;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    /// Republish a proving key on the requester's topic, but only when one
    /// positively resolves; "not found anywhere" is a silent drop.
    pub(crate) async fn handle_proving_key_request(
        &self,
        peer_id: &PeerId,
        request: ProvingKeyRequest,
    ) -> Result<(), EngineError> {
        if request.proving_key_bytes.is_empty() {
            debug!(peer_id = %peer_id, "received proving key request for empty key");
            return Ok(());
        }

        let response_topic = self.response_topic(peer_id);
        self.subscribe_topic(response_topic.clone())?;

        debug!(
            peer_id = %peer_id,
            proving_key = %hex::encode(&request.proving_key_bytes),
            "received proving key request",
        );

        let announcement = match self.key_store.get_proving_key(&request.proving_key_bytes) {
            Ok(announcement) => Some(announcement),
            Err(StoreError::NotFound) => {
                match self
                    .key_store
                    .get_staged_proving_key(&request.proving_key_bytes)
                {
                    Ok(announcement) => Some(announcement),
                    Err(StoreError::NotFound) => None,
                    Err(err) => {
                        debug!(
                            peer_id = %peer_id,
                            error = %err,
                            "peer asked for proving key that returned error",
                        );
                        None
                    }
                }
            }
            Err(err) => {
                debug!(
                    peer_id = %peer_id,
                    error = %err,
                    "peer asked for proving key that returned error",
                );
                None
            }
        };

        let Some(announcement) = announcement else {
            debug!(
                peer_id = %peer_id,
                proving_key = %hex::encode(&request.proving_key_bytes),
                "peer asked for unknown proving key",
            );
            return Ok(());
        };

        self.publish_payload(&response_topic, Payload::ProvingKeyAnnouncement(announcement))
            .await
    }
}
