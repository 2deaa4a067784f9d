// Pulled in via `mod common;` by every integration-test binary; helpers
// unused by a given binary would otherwise trip dead_code.
#![allow(dead_code)]
//! Shared harness for consensus integration tests.

use std::sync::Arc;

use prost::Message;
use tokio::sync::broadcast;

use cadence_consensus::{DataClockEngine, EngineConfig, MockClock};
use cadence_crypto::testing::MockProver;
use cadence_model::{ClockFrame, Envelope, Payload, PeerId};
use cadence_pubsub::TransportMessage;
use cadence_sim::{MemoryNetwork, MemoryPubSub};
use cadence_store::{ClockStore, KeyStore, StoreError};

pub const FILTER: &[u8] = b"cadence-test-filter";
pub const TEST_TIME_MS: u64 = 1_700_000_000_000;

pub type TestEngine = DataClockEngine<MockProver, MemoryPubSub>;

/// One engine with its backing stores and broker, on temp storage.
pub struct Harness {
    pub engine: Arc<TestEngine>,
    pub clock_store: Arc<ClockStore>,
    pub key_store: Arc<KeyStore>,
    pub net: MemoryNetwork,
    pub peer_id: PeerId,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(peer_byte: u8) -> Self {
        Self::on_network(peer_byte, &MemoryNetwork::new())
    }

    pub fn on_network(peer_byte: u8, net: &MemoryNetwork) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let clock_store =
            Arc::new(ClockStore::open(dir.path().join("clock.redb")).expect("clock store"));
        let key_store = Arc::new(KeyStore::open(dir.path().join("keys.redb")).expect("key store"));

        let peer_id = PeerId::new(vec![peer_byte; 8]);
        let pubsub = Arc::new(MemoryPubSub::new(peer_id.clone(), net));

        let engine = DataClockEngine::new(
            EngineConfig::new(FILTER).with_local_address(vec![peer_byte; 32]),
            pubsub,
            Arc::new(MockProver::default()),
            clock_store.clone(),
            key_store.clone(),
            Arc::new(MockClock::new(TEST_TIME_MS)),
        );

        Self {
            engine,
            clock_store,
            key_store,
            net: net.clone(),
            peer_id,
            _dir: dir,
        }
    }

    /// A transport message carrying `payload`, as sent by `from`.
    pub fn message(&self, from: &PeerId, payload: Payload) -> TransportMessage {
        TransportMessage {
            from: from.clone(),
            data: envelope_bytes(payload),
            signature: Vec::new(),
        }
    }

    /// Finalize a frame directly in the clock store.
    pub fn finalize(&self, frame: &ClockFrame) {
        let txn = self.clock_store.new_transaction().expect("txn");
        self.clock_store
            .put_data_clock_frame(frame, None, &txn)
            .expect("put finalized");
        txn.commit().expect("commit");
    }

    /// Persist a candidate directly in the clock store.
    pub fn add_candidate(&self, frame: &ClockFrame) {
        let identity = frame.identity().expect("identity");
        let txn = self.clock_store.new_transaction().expect("txn");
        self.clock_store
            .put_candidate_data_clock_frame(
                &identity.parent_selector_bytes(),
                &identity.distance_bytes(),
                &identity.selector_bytes(),
                frame,
                &txn,
            )
            .expect("put candidate");
        txn.commit().expect("commit");
    }

    /// All candidates under `frame`'s own parent bucket at its height.
    pub fn candidate_bucket_of(&self, frame: &ClockFrame) -> Vec<ClockFrame> {
        let mut iter = self
            .clock_store
            .range_candidate_data_clock_frames(
                &frame.filter,
                &frame.identity().expect("identity").parent_selector_bytes(),
                frame.frame_number,
            )
            .expect("range");
        let mut frames = Vec::new();
        iter.first().expect("first");
        while iter.valid() {
            frames.push(iter.value().expect("value").clone());
            iter.next();
        }
        iter.close().expect("close");
        frames
    }

    pub fn candidate_exists(&self, frame: &ClockFrame) -> bool {
        self.candidate_bucket_of(frame).iter().any(|f| f == frame)
    }

    pub fn finalized_exists(&self, frame_number: u64) -> bool {
        match self.clock_store.get_data_clock_frame(FILTER, frame_number) {
            Ok(_) => true,
            Err(StoreError::NotFound) => false,
            Err(err) => panic!("store error: {err}"),
        }
    }
}

pub fn envelope_bytes(payload: Payload) -> Vec<u8> {
    Envelope {
        address: vec![0xEE; 32],
        payload: Some(payload),
    }
    .encode_to_vec()
}

/// The response topic the engine publishes range answers on.
pub fn response_topic(peer: &PeerId) -> Vec<u8> {
    let mut topic = FILTER.to_vec();
    topic.extend_from_slice(peer.as_bytes());
    topic
}

/// Drain every payload currently buffered on a subscription.
pub fn drain_payloads(rx: &mut broadcast::Receiver<TransportMessage>) -> Vec<Payload> {
    let mut payloads = Vec::new();
    while let Ok(message) = rx.try_recv() {
        let envelope = Envelope::decode(message.data.as_slice()).expect("decode envelope");
        if let Some(payload) = envelope.payload {
            payloads.push(payload);
        }
    }
    payloads
}

/// Frame numbers of the ClockFrame payloads in a drained sequence.
pub fn published_frame_numbers(payloads: &[Payload]) -> Vec<u64> {
    payloads
        .iter()
        .filter_map(|payload| match payload {
            Payload::ClockFrame(frame) => Some(frame.frame_number),
            _ => None,
        })
        .collect()
}

/// Outputs of the ClockFrame payloads in a drained sequence.
pub fn published_outputs(payloads: &[Payload]) -> Vec<Vec<u8>> {
    payloads
        .iter()
        .filter_map(|payload| match payload {
            Payload::ClockFrame(frame) => Some(frame.output.clone()),
            _ => None,
        })
        .collect()
}
