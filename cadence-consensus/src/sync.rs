//! Sync state machine - response batches and gossiped frame extensions
//!
//! Response batches are only accepted from the current sync target and are
//! verified against a snapshot of the prover trie taken at batch start, so
//! the verification loop never observes its own mutations. Frames apply
//! strictly in array order; a failure at position k leaves `[0, k)`
//! persisted, which is sound because candidates are not binding until
//! finalization selects among them.

use tracing::{debug, error, info};

use cadence_crypto::FrameProver;
use cadence_model::{ClockFrame, ClockFramesResponse, PeerId, SyncStatus};
use cadence_pubsub::PubSub;
use cadence_tries::Frecency;

use crate::engine::{DataClockEngine, SyncStatusGuard};
use crate::error::EngineError;

impl<P: FrameProver, PS: PubSub> DataClockEngine<P, PS> {
    /// Accept a response batch from the sync target.
    pub(crate) fn handle_clock_frames_response(
        &self,
        peer_id: &PeerId,
        address: &[u8],
        response: ClockFramesResponse,
    ) -> Result<(), EngineError> {
        if *peer_id == self.pubsub.peer_id() {
            return Ok(());
        }

        {
            let mut state = self.state();
            match &state.syncing_target {
                Some(target) if target == peer_id => {}
                expected => {
                    debug!(
                        peer_id = %peer_id,
                        expected_peer_id = ?expected,
                        "received clock frames response from unexpected target",
                    );
                    return Ok(());
                }
            }
            state.syncing_status = SyncStatus::Synchronizing;
        }
        let _status = SyncStatusGuard::new(self);

        // The snapshot is the authority for this batch: accepted frames
        // extend it, but concurrent live mutations stay invisible.
        let mut trie_snapshot = self.state().frame_prover_trie.snapshot();

        for frame in &response.clock_frames {
            let prover = frame.address()?;

            let Frecency {
                earliest_frame,
                count,
                ..
            } = trie_snapshot.get(&prover);
            if count == 0 || earliest_frame >= frame.frame_number {
                return Err(EngineError::ProverNotEligible {
                    frame_number: frame.frame_number,
                });
            }

            info!(
                sender_address = %hex::encode(address),
                prover_address = %hex::encode(&prover),
                filter = %hex::encode(&frame.filter),
                frame_number = frame.frame_number,
                "processing clock frame",
            );

            if let Err(err) = self.verifier.verify(frame) {
                error!(error = %err, "could not verify clock frame");
                return Err(err.into());
            }

            info!(
                sender_address = %hex::encode(address),
                prover_address = %hex::encode(&prover),
                filter = %hex::encode(&frame.filter),
                frame_number = frame.frame_number,
                "clock frame was valid",
            );

            self.persist_candidate_frame(frame)?;
            self.record_frame_seen(&prover, frame.frame_number);
            trie_snapshot.add(&prover, frame.frame_number);
        }

        Ok(())
    }

    /// Accept a single gossiped frame as a broadcast extension. Same
    /// verification path as a batch, but gated on the live prover trie and
    /// without the sync-target discipline.
    pub(crate) fn handle_clock_frame_data(
        &self,
        peer_id: &PeerId,
        address: &[u8],
        frame: ClockFrame,
    ) -> Result<(), EngineError> {
        if *peer_id == self.pubsub.peer_id() {
            return Ok(());
        }

        let prover = frame.address()?;
        let Frecency {
            earliest_frame,
            count,
            ..
        } = self.state().frame_prover_trie.get(&prover);
        if count == 0 || earliest_frame >= frame.frame_number {
            return Err(EngineError::ProverNotEligible {
                frame_number: frame.frame_number,
            });
        }

        debug!(
            sender_address = %hex::encode(address),
            prover_address = %hex::encode(&prover),
            frame_number = frame.frame_number,
            "processing gossiped clock frame",
        );

        if let Err(err) = self.verifier.verify(&frame) {
            error!(error = %err, "could not verify clock frame");
            return Err(err.into());
        }

        self.persist_candidate_frame(&frame)?;
        self.record_frame_seen(&prover, frame.frame_number);
        Ok(())
    }

    /// Persist one verified frame as a candidate inside its own transaction.
    fn persist_candidate_frame(&self, frame: &ClockFrame) -> Result<(), EngineError> {
        let identity = frame.identity()?;
        debug!(
            difference = %hex::encode(identity.distance_bytes()),
            "difference between selector/discriminator",
        );

        let txn = self.clock_store.new_transaction()?;
        if let Err(err) = self.clock_store.put_candidate_data_clock_frame(
            &identity.parent_selector_bytes(),
            &identity.distance_bytes(),
            &identity.selector_bytes(),
            frame,
            &txn,
        ) {
            error!(error = %err, "could not save candidate clock frame");
            let _ = txn.abort();
            return Err(err.into());
        }
        txn.commit()?;
        Ok(())
    }

    /// Fold a freshly accepted frame into head tracking and the live
    /// seen-prover trie.
    fn record_frame_seen(&self, prover: &[u8], frame_number: u64) {
        let now = self.clock.now_ms();
        let mut state = self.state();
        if state.frame < frame_number {
            state.latest_frame_received = frame_number;
            state.last_frame_received_at = now;
        }
        state.frame_seen_prover_trie.add(prover, frame_number);
    }
}
