//! Sync state machine scenarios: loopback, target discipline, batch
//! acceptance, and mid-batch failure semantics.

mod common;

use common::{Harness, FILTER, TEST_TIME_MS};

use cadence_consensus::EngineError;
use cadence_crypto::VerificationError;
use cadence_model::{ClockFramesResponse, Payload, PeerId, SyncStatus};
use cadence_sim::fixtures::{FrameFixture, TestProver};

fn response(frames: Vec<cadence_model::ClockFrame>) -> Payload {
    let from = frames.first().map(|f| f.frame_number).unwrap_or(0);
    let to = frames.last().map(|f| f.frame_number).unwrap_or(0);
    Payload::ClockFramesResponse(ClockFramesResponse {
        filter: FILTER.to_vec(),
        from_frame_number: from,
        to_frame_number: to,
        clock_frames: frames,
    })
}

#[tokio::test]
async fn self_loopback_is_dropped() {
    let harness = Harness::new(1);
    let prover = TestProver::from_seed(10);
    harness.engine.register_prover(&prover.address(), 2);
    harness.engine.set_syncing_target(Some(harness.peer_id.clone()));

    let frame = FrameFixture::new(FILTER, 5, &prover).commitment(b"data").build();
    let self_id = harness.peer_id.clone();
    let message = harness.message(&self_id, response(vec![frame.clone()]));

    harness.engine.handle_message(message).await.unwrap();

    assert!(!harness.candidate_exists(&frame));
    assert_eq!(harness.engine.sync_status(), SyncStatus::NotSyncing);
    assert_eq!(harness.engine.seen_prover(&prover.address()).count, 0);
}

#[tokio::test]
async fn off_target_response_is_dropped() {
    let harness = Harness::new(1);
    let prover = TestProver::from_seed(11);
    harness.engine.register_prover(&prover.address(), 2);
    harness.engine.set_syncing_target(Some(PeerId::new(vec![2; 8])));

    let frame = FrameFixture::new(FILTER, 5, &prover).commitment(b"data").build();
    let off_target = PeerId::new(vec![3; 8]);
    let message = harness.message(&off_target, response(vec![frame.clone()]));

    harness.engine.handle_message(message).await.unwrap();

    assert_eq!(harness.engine.sync_status(), SyncStatus::NotSyncing);
    assert!(!harness.candidate_exists(&frame));
    assert_eq!(harness.engine.seen_prover(&prover.address()).count, 0);
}

#[tokio::test]
async fn no_target_set_drops_response() {
    let harness = Harness::new(1);
    let prover = TestProver::from_seed(12);
    harness.engine.register_prover(&prover.address(), 2);

    let frame = FrameFixture::new(FILTER, 5, &prover).commitment(b"data").build();
    let message = harness.message(&PeerId::new(vec![2; 8]), response(vec![frame.clone()]));

    harness.engine.handle_message(message).await.unwrap();
    assert!(!harness.candidate_exists(&frame));
}

#[tokio::test]
async fn valid_single_frame_batch_is_accepted() {
    let harness = Harness::new(1);
    let prover = TestProver::from_seed(13);
    harness.engine.register_prover(&prover.address(), 2);

    let target = PeerId::new(vec![2; 8]);
    harness.engine.set_syncing_target(Some(target.clone()));

    let frame = FrameFixture::new(FILTER, 5, &prover)
        .commitment(b"bundle")
        .intrinsic_commitment(b"execution output")
        .build();
    let message = harness.message(&target, response(vec![frame.clone()]));

    harness.engine.handle_message(message).await.unwrap();

    assert!(harness.candidate_exists(&frame));
    assert_eq!(harness.engine.latest_frame_received(), 5);
    assert_eq!(harness.engine.last_frame_received_at(), TEST_TIME_MS);
    assert_eq!(harness.engine.seen_prover(&prover.address()).count, 1);
    assert_eq!(harness.engine.seen_prover(&prover.address()).latest_frame, 5);
    assert_eq!(harness.engine.sync_status(), SyncStatus::NotSyncing);
}

#[tokio::test]
async fn mid_batch_failure_preserves_prefix_only() {
    let harness = Harness::new(1);
    let prover = TestProver::from_seed(14);
    harness.engine.register_prover(&prover.address(), 2);

    let target = PeerId::new(vec![2; 8]);
    harness.engine.set_syncing_target(Some(target.clone()));

    let f1 = FrameFixture::new(FILTER, 5, &prover).commitment(b"one").build();
    let mut f2 = FrameFixture::new(FILTER, 6, &prover).commitment(b"two").build();
    f2.aggregate_proofs[0].proof[0] ^= 0xFF;
    let f3 = FrameFixture::new(FILTER, 7, &prover).commitment(b"three").build();

    let message = harness.message(&target, response(vec![f1.clone(), f2.clone(), f3.clone()]));
    let err = harness.engine.handle_message(message).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Verification(VerificationError::InvalidProof)
    ));

    // Prefix persisted, failing frame and its successors absent.
    assert!(harness.candidate_exists(&f1));
    assert!(!harness.candidate_exists(&f2));
    assert!(!harness.candidate_exists(&f3));

    // Trie gained exactly the prefix; status restored on the error path.
    assert_eq!(harness.engine.seen_prover(&prover.address()).count, 1);
    assert_eq!(harness.engine.sync_status(), SyncStatus::NotSyncing);
}

#[tokio::test]
async fn unknown_prover_rejects_batch() {
    let harness = Harness::new(1);
    let prover = TestProver::from_seed(15);
    // Not registered in the prover trie.

    let target = PeerId::new(vec![2; 8]);
    harness.engine.set_syncing_target(Some(target.clone()));

    let frame = FrameFixture::new(FILTER, 5, &prover).commitment(b"data").build();
    let message = harness.message(&target, response(vec![frame.clone()]));

    let err = harness.engine.handle_message(message).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::ProverNotEligible { frame_number: 5 }
    ));
    assert!(!harness.candidate_exists(&frame));
    assert_eq!(harness.engine.sync_status(), SyncStatus::NotSyncing);
}

#[tokio::test]
async fn prover_recency_must_predate_frame() {
    let harness = Harness::new(1);
    let prover = TestProver::from_seed(16);
    // earliest == frame_number violates the strict inequality.
    harness.engine.register_prover(&prover.address(), 5);

    let target = PeerId::new(vec![2; 8]);
    harness.engine.set_syncing_target(Some(target.clone()));

    let frame = FrameFixture::new(FILTER, 5, &prover).commitment(b"data").build();
    let message = harness.message(&target, response(vec![frame]));

    let err = harness.engine.handle_message(message).await.unwrap_err();
    assert!(matches!(err, EngineError::ProverNotEligible { .. }));
}

#[tokio::test]
async fn batch_snapshot_extends_within_batch() {
    // A prover registered at 2 can ship heights 5 and 6 in one batch: the
    // snapshot folds height 5 in, and earliest stays 2 < 6.
    let harness = Harness::new(1);
    let prover = TestProver::from_seed(17);
    harness.engine.register_prover(&prover.address(), 2);

    let target = PeerId::new(vec![2; 8]);
    harness.engine.set_syncing_target(Some(target.clone()));

    let f5 = FrameFixture::new(FILTER, 5, &prover).commitment(b"five").build();
    let f6 = FrameFixture::new(FILTER, 6, &prover)
        .parent(&f5)
        .commitment(b"six")
        .build();

    let message = harness.message(&target, response(vec![f5.clone(), f6.clone()]));
    harness.engine.handle_message(message).await.unwrap();

    assert!(harness.candidate_exists(&f5));
    assert!(harness.candidate_exists(&f6));
    assert_eq!(harness.engine.seen_prover(&prover.address()).count, 2);
    assert_eq!(harness.engine.latest_frame_received(), 6);
}

#[tokio::test]
async fn gossiped_frame_extends_without_target() {
    let harness = Harness::new(1);
    let prover = TestProver::from_seed(18);
    harness.engine.register_prover(&prover.address(), 2);

    let frame = FrameFixture::new(FILTER, 5, &prover).commitment(b"gossip").build();
    let message = harness.message(
        &PeerId::new(vec![9; 8]),
        Payload::ClockFrame(frame.clone()),
    );

    harness.engine.handle_message(message).await.unwrap();

    assert!(harness.candidate_exists(&frame));
    assert_eq!(harness.engine.seen_prover(&prover.address()).count, 1);
}

#[tokio::test]
async fn gossiped_frame_from_unknown_prover_is_rejected() {
    let harness = Harness::new(1);
    let prover = TestProver::from_seed(19);

    let frame = FrameFixture::new(FILTER, 5, &prover).commitment(b"gossip").build();
    let message = harness.message(
        &PeerId::new(vec![9; 8]),
        Payload::ClockFrame(frame.clone()),
    );

    let err = harness.engine.handle_message(message).await.unwrap_err();
    assert!(matches!(err, EngineError::ProverNotEligible { .. }));
    assert!(!harness.candidate_exists(&frame));
}

#[tokio::test]
async fn malformed_envelope_is_a_transport_error() {
    let harness = Harness::new(1);
    let message = cadence_pubsub::TransportMessage {
        from: PeerId::new(vec![2; 8]),
        data: vec![0xFF, 0xFF, 0xFF, 0x01],
        signature: Vec::new(),
    };

    let err = harness.engine.handle_message(message).await.unwrap_err();
    assert!(matches!(err, EngineError::Transport(_)));
}

#[tokio::test]
async fn unknown_payload_tag_is_ignored() {
    let harness = Harness::new(1);
    // An envelope whose payload field carries an unrecognized tag.
    let mut raw = prost::Message::encode_to_vec(&cadence_model::Envelope {
        address: vec![1],
        payload: None,
    });
    raw.extend_from_slice(&[0x7A, 0x00]); // field 15, length-delimited, empty

    let message = cadence_pubsub::TransportMessage {
        from: PeerId::new(vec![2; 8]),
        data: raw,
        signature: Vec::new(),
    };
    harness.engine.handle_message(message).await.unwrap();
}
