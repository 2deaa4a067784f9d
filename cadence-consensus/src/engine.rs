//! DataClockEngine - state, lifecycle, and message routing
//!
//! Handlers for one subscription run serialized on that subscription's task.
//! Engine state (sync target/status, heads, tries) sits behind one mutex with
//! short critical sections; nothing holds it across an await.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use prost::Message;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use cadence_crypto::{FrameProver, FrameVerifier};
use cadence_model::{Envelope, Payload, PeerId, SyncStatus};
use cadence_pubsub::{PubSub, TransportMessage};
use cadence_store::{ClockStore, KeyStore};
use cadence_tries::{Frecency, RollingFrecencyCritbitTrie};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::EngineError;

/// Hard ceiling on frames published per range request.
pub(crate) const MAX_RANGE_SPAN: u64 = 32;

pub(crate) struct EngineState {
    pub(crate) syncing_target: Option<PeerId>,
    pub(crate) syncing_status: SyncStatus,
    /// Locally observed head height.
    pub(crate) frame: u64,
    pub(crate) latest_frame_received: u64,
    pub(crate) last_frame_received_at: u64,
    /// Authorized provers; source of per-batch snapshots.
    pub(crate) frame_prover_trie: RollingFrecencyCritbitTrie,
    /// Provers observed extending the clock.
    pub(crate) frame_seen_prover_trie: RollingFrecencyCritbitTrie,
}

/// Consensus engine for one data clock filter.
pub struct DataClockEngine<P: FrameProver, PS: PubSub> {
    pub(crate) config: EngineConfig,
    pub(crate) pubsub: Arc<PS>,
    pub(crate) verifier: FrameVerifier<P>,
    pub(crate) clock_store: Arc<ClockStore>,
    pub(crate) key_store: Arc<KeyStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) state: Mutex<EngineState>,
    subscriptions: Mutex<HashSet<Vec<u8>>>,
    subscribe_tx: mpsc::UnboundedSender<Vec<u8>>,
    subscribe_rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl<P: FrameProver, PS: PubSub> DataClockEngine<P, PS> {
    pub fn new(
        config: EngineConfig,
        pubsub: Arc<PS>,
        prover: Arc<P>,
        clock_store: Arc<ClockStore>,
        key_store: Arc<KeyStore>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let (subscribe_tx, subscribe_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            config,
            pubsub,
            verifier: FrameVerifier::new(prover),
            clock_store,
            key_store,
            clock,
            state: Mutex::new(EngineState {
                syncing_target: None,
                syncing_status: SyncStatus::NotSyncing,
                frame: 0,
                latest_frame_received: 0,
                last_frame_received_at: 0,
                frame_prover_trie: RollingFrecencyCritbitTrie::new(),
                frame_seen_prover_trie: RollingFrecencyCritbitTrie::new(),
            }),
            subscriptions: Mutex::new(HashSet::new()),
            subscribe_tx,
            subscribe_rx: Mutex::new(Some(subscribe_rx)),
            tasks: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        })
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ==================== Lifecycle ====================

    /// Start the engine: subscribe the broadcast filter topic and begin
    /// serving. The returned handle resolves once the engine is live (or
    /// failed to come up). Start errors are fatal to the node.
    pub fn start(self: Arc<Self>) -> oneshot::Receiver<Result<(), EngineError>> {
        let (tx, rx) = oneshot::channel();
        let engine = self.clone();
        tokio::spawn(async move {
            let result = engine.bootstrap().await;
            let _ = tx.send(result);
        });
        rx
    }

    async fn bootstrap(self: Arc<Self>) -> Result<(), EngineError> {
        // Supervisor drains deferred subscription requests from handlers.
        let receiver = self
            .subscribe_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(EngineError::Stopped)?;
        let supervisor = tokio::spawn(self.clone().run_supervisor(receiver));
        self.track_task(supervisor);

        let filter = self.config.filter.clone();
        self.mark_subscribed(&filter);
        let receiver = self.pubsub.subscribe(&filter).await?;
        let loop_task = tokio::spawn(self.clone().run_subscription_loop(filter, receiver));
        self.track_task(loop_task);
        Ok(())
    }

    /// Stop the engine. Graceful stops drain in-flight handlers; otherwise
    /// tasks are aborted. Either way all topics are unsubscribed.
    pub fn stop(self: Arc<Self>, graceful: bool) -> oneshot::Receiver<Result<(), EngineError>> {
        let (tx, rx) = oneshot::channel();
        let engine = self;
        tokio::spawn(async move {
            engine.cancel.cancel();

            let handles = std::mem::take(
                &mut *engine.tasks.lock().unwrap_or_else(PoisonError::into_inner),
            );
            for handle in handles {
                if graceful {
                    let _ = handle.await;
                } else {
                    handle.abort();
                }
            }

            let topics: Vec<Vec<u8>> = engine
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain()
                .collect();
            for topic in topics {
                engine.pubsub.unsubscribe(&topic).await;
            }

            let _ = tx.send(Ok(()));
        });
        rx
    }

    fn track_task(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    fn mark_subscribed(&self, topic: &[u8]) -> bool {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic.to_vec())
    }

    /// Idempotent topic subscription: the first request queues a real
    /// subscribe on the supervisor, repeats are no-ops.
    pub(crate) fn subscribe_topic(&self, topic: Vec<u8>) -> Result<(), EngineError> {
        if !self.mark_subscribed(&topic) {
            return Ok(());
        }
        self.subscribe_tx
            .send(topic)
            .map_err(|_| EngineError::Stopped)
    }

    async fn run_supervisor(self: Arc<Self>, mut requests: mpsc::UnboundedReceiver<Vec<u8>>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                request = requests.recv() => match request {
                    Some(topic) => match self.pubsub.subscribe(&topic).await {
                        Ok(receiver) => {
                            let task = tokio::spawn(
                                self.clone().run_subscription_loop(topic, receiver),
                            );
                            self.track_task(task);
                        }
                        Err(error) => {
                            warn!(topic = %hex::encode(&topic), %error, "subscribe failed");
                        }
                    },
                    None => break,
                },
            }
        }
    }

    async fn run_subscription_loop(
        self: Arc<Self>,
        topic: Vec<u8>,
        mut receiver: broadcast::Receiver<TransportMessage>,
    ) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = receiver.recv() => match received {
                    Ok(message) => {
                        if let Err(error) = self.handle_message(message).await {
                            debug!(
                                topic = %hex::encode(&topic),
                                %error,
                                "message handler failed",
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(topic = %hex::encode(&topic), skipped, "subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    // ==================== Message router ====================

    /// Demultiplex one inbound transport message. Self-loopback is dropped,
    /// unknown payload tags are ignored; handler errors are returned to the
    /// caller wrapped in [`EngineError`].
    pub async fn handle_message(&self, message: TransportMessage) -> Result<(), EngineError> {
        debug!(
            from = %message.from,
            bytes = message.data.len(),
            "received message",
        );
        if message.from == self.pubsub.peer_id() {
            return Ok(());
        }

        let envelope = Envelope::decode(message.data.as_slice())?;
        match envelope.payload {
            Some(Payload::ClockFrame(frame)) => {
                self.handle_clock_frame_data(&message.from, &envelope.address, frame)?;
            }
            Some(Payload::ClockFramesResponse(response)) => {
                self.handle_clock_frames_response(&message.from, &envelope.address, response)?;
            }
            Some(Payload::ClockFramesRequest(request)) => {
                self.handle_clock_frames_request(&message.from, &envelope.address, request)
                    .await?;
            }
            Some(Payload::ProvingKeyAnnouncement(announcement)) => {
                self.handle_proving_key(&message.from, announcement)?;
            }
            Some(Payload::KeyBundleAnnouncement(announcement)) => {
                self.handle_key_bundle(&message.from, announcement)?;
            }
            Some(Payload::ProvingKeyRequest(request)) => {
                self.handle_proving_key_request(&message.from, request).await?;
            }
            None => {
                // Unknown tag: forward compatibility, not an error.
            }
        }
        Ok(())
    }

    // ==================== Sync driver ====================

    /// Ask `target` for frames `[from, to]` on the engine's filter. Sets the
    /// sync target and awaits the response batch on the per-peer topic.
    /// No-op while another exchange is in flight.
    pub async fn request_frames(
        self: Arc<Self>,
        target: PeerId,
        from: u64,
        to: u64,
    ) -> Result<(), EngineError> {
        {
            let mut state = self.state();
            if state.syncing_status != SyncStatus::NotSyncing {
                debug!(peer = %target, "sync already in flight, ignoring request");
                return Ok(());
            }
            state.syncing_target = Some(target);
            state.syncing_status = SyncStatus::AwaitingResponse;
        }

        // Subscribe our own response topic up front so the target's reply
        // cannot outrun the subscription.
        let response_topic = self.response_topic(&self.pubsub.peer_id());
        if self.mark_subscribed(&response_topic) {
            let receiver = self.pubsub.subscribe(&response_topic).await?;
            let task = tokio::spawn(self.clone().run_subscription_loop(response_topic, receiver));
            self.track_task(task);
        }

        let request = cadence_model::ClockFramesRequest {
            filter: self.config.filter.clone(),
            from_frame_number: from,
            to_frame_number: to,
        };
        self.publish_payload(&self.config.filter, Payload::ClockFramesRequest(request))
            .await
    }

    // ==================== Shared helpers ====================

    pub(crate) fn response_topic(&self, peer: &PeerId) -> Vec<u8> {
        let mut topic = self.config.filter.clone();
        topic.extend_from_slice(peer.as_bytes());
        topic
    }

    pub(crate) async fn publish_payload(
        &self,
        topic: &[u8],
        payload: Payload,
    ) -> Result<(), EngineError> {
        let envelope = Envelope {
            address: self.config.local_address.clone(),
            payload: Some(payload),
        };
        self.pubsub
            .publish(topic, envelope.encode_to_vec())
            .await
            .map_err(Into::into)
    }

    // ==================== Observation & governance ====================

    pub fn sync_status(&self) -> SyncStatus {
        self.state().syncing_status
    }

    /// Set (or clear) the only peer whose response batches will be trusted.
    pub fn set_syncing_target(&self, target: Option<PeerId>) {
        self.state().syncing_target = target;
    }

    /// Abandon the in-flight exchange, if any. Callers enforcing batch
    /// timeouts use this after cancelling the wait.
    pub fn reset_sync(&self) {
        let mut state = self.state();
        state.syncing_target = None;
        state.syncing_status = SyncStatus::NotSyncing;
    }

    pub fn head(&self) -> u64 {
        self.state().frame
    }

    pub fn latest_frame_received(&self) -> u64 {
        self.state().latest_frame_received
    }

    pub fn last_frame_received_at(&self) -> u64 {
        self.state().last_frame_received_at
    }

    /// Authorize a prover to extend the clock from `frame_number` onward.
    /// Normally driven by governance events.
    pub fn register_prover(&self, address: &[u8], frame_number: u64) {
        self.state().frame_prover_trie.add(address, frame_number);
    }

    /// Observed recency for a prover address.
    pub fn seen_prover(&self, address: &[u8]) -> Frecency {
        self.state().frame_seen_prover_trie.get(address)
    }

    /// Number of distinct topics this engine has subscribed.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Restores `NotSyncing` on every exit path of a response batch.
pub(crate) struct SyncStatusGuard<'a, P: FrameProver, PS: PubSub> {
    engine: &'a DataClockEngine<P, PS>,
}

impl<'a, P: FrameProver, PS: PubSub> SyncStatusGuard<'a, P, PS> {
    pub(crate) fn new(engine: &'a DataClockEngine<P, PS>) -> Self {
        Self { engine }
    }
}

impl<P: FrameProver, PS: PubSub> Drop for SyncStatusGuard<'_, P, PS> {
    fn drop(&mut self) {
        self.engine.state().syncing_status = SyncStatus::NotSyncing;
    }
}
