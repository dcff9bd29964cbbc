//! # Integration Test Flows
//!
//! Events emitted on the in-memory chain travel through the collector, the
//! aggregator and the finalizer, and end up as signed `submitAttestation`
//! transactions.
//!
//! ## Flow Tested
//!
//! ```text
//! InMemoryChain logs ──→ EventCollector ──closed Buffer──→ BufferFinalizer
//!                                                              │
//!                        InMemoryChain ←──signed tx── SubmissionDriver
//! ```

use std::time::Duration;

use attestation_relay::adapters::{function_selector, REQUEST_ATTESTATIONS_SELECTOR};
use attestation_relay::domain::{u256_word, InstructionKind, ZERO_LEAF_HASH};
use attestation_relay::{
    build_merkle_proof, compute_merkle_root, verify_merkle_proof, AttestationRequest, BufferState,
    CloseReason, Hash, PayloadKey, PollOutcome, RelayConfig, SubmissionApi, SubmissionStatus,
    TransactionSigner,
};
use tokio::sync::{mpsc, watch};

use super::fixtures::{self, Pipeline, GENESIS};

fn root_of(data: &[u8]) -> Hash {
    let mut root = [0u8; 32];
    root.copy_from_slice(&data[36..68]);
    root
}

// =============================================================================
// BUFFER COMMITMENT
// =============================================================================

#[tokio::test]
async fn test_rollover_3_3_4_commits_buffer_3() {
    let mut p = Pipeline::new();
    p.chain.mine_block(270);
    p.emit(270, 1);
    p.emit(275, 2);
    p.chain.mine_block(360);
    p.emit(360, 3);

    let outcome = p.collector.poll_once().await;
    assert!(matches!(
        outcome,
        PollOutcome::Ingested {
            leaves: 3,
            closed: 1,
            ..
        }
    ));

    let finalized = p.drain().await;
    assert_eq!(finalized.len(), 1);
    let buffer = &finalized[0];
    assert_eq!(buffer.index, 3);
    assert_eq!(buffer.leaf_count(), 2);
    assert_eq!(buffer.state, BufferState::Submitted);
    assert_eq!(buffer.close_reason, Some(CloseReason::Rollover));

    let open = p.collector.aggregator().open_buffer().unwrap();
    assert_eq!(open.index(), 4);
    assert_eq!(open.len(), 1);

    let sent = p.chain.sent_transactions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from, p.collector_account);
    assert_eq!(sent[0].to, p.contract());
    assert_eq!(
        &sent[0].data[..4],
        &function_selector("submitAttestation(uint256,bytes32)")[..]
    );
    assert_eq!(&sent[0].data[4..36], &u256_word(3)[..]);
    assert_eq!(root_of(&sent[0].data), buffer.root);
}

#[tokio::test]
async fn test_submitted_root_proves_every_leaf() {
    let mut p = Pipeline::new();
    p.chain.mine_block(270);
    for id in 1..=5 {
        p.emit(270, id);
    }
    p.chain.mine_block(360);
    p.emit(360, 9);

    p.collector.poll_once().await;
    let finalized = p.drain().await;
    let buffer = &finalized[0];
    assert_eq!(buffer.leaf_count(), 5);

    let on_chain_root = root_of(&p.chain.sent_transactions()[0].data);
    assert_eq!(on_chain_root, compute_merkle_root(&buffer.leaf_hashes));
    for (i, leaf) in buffer.leaf_hashes.iter().enumerate() {
        let proof = build_merkle_proof(&buffer.leaf_hashes, i).unwrap();
        assert!(verify_merkle_proof(leaf, &proof, &on_chain_root));
    }
}

#[tokio::test]
async fn test_unrecognized_instruction_commits_zero_leaf() {
    let mut p = Pipeline::new();
    p.chain.mine_block(270);
    p.emit(270, 1);
    p.emit_raw(attestation_relay::algorithms::encode_event(
        270,
        &[0x42; 32],
        &[2; 32],
        &[0; 32],
    ));
    p.chain.mine_block(360);
    p.emit(360, 3);

    p.collector.poll_once().await;
    let finalized = p.drain().await;
    assert_eq!(finalized[0].leaf_count(), 2);
    assert_ne!(finalized[0].leaf_hashes[0], ZERO_LEAF_HASH);
    assert_eq!(finalized[0].leaf_hashes[1], ZERO_LEAF_HASH);
}

#[tokio::test]
async fn test_window_elapsed_commits_without_next_leaf() {
    let mut p = Pipeline::new();
    p.chain.mine_block(270);
    p.emit(270, 1);
    p.collector.poll_once().await;
    assert!(p.drain().await.is_empty());

    p.chain.mine_block(365);
    assert!(matches!(
        p.collector.poll_once().await,
        PollOutcome::EmptyRange { .. }
    ));

    let finalized = p.drain().await;
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].index, 3);
    assert_eq!(finalized[0].close_reason, Some(CloseReason::WindowElapsed));
    assert_eq!(finalized[0].state, BufferState::Submitted);
}

#[tokio::test]
async fn test_stalled_chain_commits_open_buffer() {
    let mut p = Pipeline::new();
    p.chain.mine_block(270);
    p.emit(270, 1);
    p.wall.set(270);
    p.collector.poll_once().await;

    p.wall.advance(91);
    assert_eq!(p.collector.poll_once().await, PollOutcome::NoNewBlocks);

    let finalized = p.drain().await;
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].close_reason, Some(CloseReason::ChainStalled));
    assert_eq!(p.chain.sent_transactions().len(), 1);
}

#[tokio::test]
async fn test_gap_emits_empty_buffers_without_transactions() {
    let mut p = Pipeline::new();
    p.chain.mine_block(270);
    p.emit(270, 1);
    p.chain.mine_block(540);
    p.emit(540, 2);

    p.collector.poll_once().await;
    let finalized = p.drain().await;

    let indices: Vec<u64> = finalized.iter().map(|b| b.index).collect();
    assert_eq!(indices, vec![3, 4, 5]);
    assert_eq!(finalized[0].state, BufferState::Submitted);
    for empty in &finalized[1..] {
        assert_eq!(empty.close_reason, Some(CloseReason::Gap));
        assert_eq!(empty.state, BufferState::Finalized);
        assert_eq!(empty.leaf_count(), 0);
    }
    assert_eq!(p.chain.sent_transactions().len(), 1);
    assert_eq!(p.collector.aggregator().open_index(), Some(6));
}

#[tokio::test]
async fn test_consecutive_buffers_use_consecutive_nonces() {
    let mut p = Pipeline::new();
    p.chain.mine_block(270);
    p.emit(270, 1);
    p.chain.mine_block(360);
    p.emit(360, 2);
    p.chain.mine_block(450);
    p.emit(450, 3);

    p.collector.poll_once().await;
    let finalized = p.drain().await;
    assert_eq!(finalized.len(), 2);

    let nonces: Vec<u64> = p.chain.sent_transactions().iter().map(|tx| tx.nonce).collect();
    assert_eq!(nonces, vec![0, 1]);
    assert_eq!(p.chain.nonce_of(&p.collector_account), 2);
    assert!(p.driver.in_flight().is_empty());
    assert_eq!(
        p.driver.record(&PayloadKey::Buffer(4)).unwrap().status,
        SubmissionStatus::Confirmed
    );
}

#[tokio::test]
async fn test_polling_across_batches_keeps_log_order() {
    let mut p = Pipeline::new();
    p.chain.mine_block(270);
    p.emit(270, 1);
    p.collector.poll_once().await;

    p.chain.mine_block(280);
    p.emit(280, 2);
    p.collector.poll_once().await;

    p.chain.mine_block(360);
    p.emit(360, 3);
    p.collector.poll_once().await;

    let finalized = p.drain().await;
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].leaf_count(), 2);
    assert_eq!(p.chain.log_queries(), vec![(1, 1), (2, 2), (3, 3)]);
}

// =============================================================================
// RUNNING SERVICE
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_run_collector_end_to_end() {
    let p = Pipeline::new();
    p.chain.mine_block(270);
    p.emit(270, 1);
    p.emit(271, 2);
    p.chain.mine_block(360);
    p.emit(360, 3);
    p.wall.set(360);

    let service = fixtures::service(&p.chain, &p.wall, p.config.clone());
    let (stop_tx, stop_rx) = watch::channel(false);
    let (finalized_tx, mut finalized_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        service
            .run_collector(fixtures::signer(0), stop_rx, Some(finalized_tx))
            .await
    });

    let buffer = tokio::time::timeout(Duration::from_secs(5), finalized_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(buffer.index, 3);
    assert_eq!(buffer.state, BufferState::Submitted);

    stop_tx.send(true).unwrap();
    assert_eq!(handle.await.unwrap().unwrap(), 1);
    assert_eq!(p.chain.sent_transactions().len(), 1);
}

// =============================================================================
// REQUEST ISSUING
// =============================================================================

#[tokio::test]
async fn test_request_and_collection_use_separate_accounts() {
    let p = Pipeline::new();
    let service = fixtures::service(&p.chain, &p.wall, p.config.clone());
    let requester = fixtures::signer(1);
    let (_stop_tx, stop_rx) = watch::channel(false);

    let request = AttestationRequest::from_hex(
        &format!("0x{}", hex::encode([0xff; 32])),
        &format!("0x{}", hex::encode([7; 32])),
        &format!("0x{}", hex::encode([8; 32])),
    )
    .unwrap();
    service
        .run_requester(requester.clone(), request, true, stop_rx)
        .await
        .unwrap();

    let sent = p.chain.sent_transactions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from, requester.address());
    assert_ne!(sent[0].from, p.collector_account);
    assert_eq!(
        &sent[0].data[..4],
        &REQUEST_ATTESTATIONS_SELECTOR[..]
    );
    assert_eq!(&sent[0].data[36..68], &[7u8; 32][..]);
    assert_eq!(p.chain.nonce_of(&p.collector_account), 0);
}

#[test]
fn test_mock_selector_is_recognized() {
    let leaf = attestation_relay::algorithms::decode(
        &attestation_relay::algorithms::encode_event(
            GENESIS,
            &attestation_relay::domain::MOCK_INSTRUCTION_SELECTOR,
            &[1; 32],
            &[2; 32],
        ),
        1,
        &fixtures::test_config().buffer_clock().unwrap(),
    )
    .unwrap();
    assert_eq!(leaf.kind(), InstructionKind::Mock);
    assert_eq!(leaf.buffer_index, GENESIS / 90);
}

// =============================================================================
// CONFIGURATION
// =============================================================================

#[tokio::test]
async fn test_pipeline_built_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let rendered = serde_json::to_string_pretty(&fixtures::test_config()).unwrap();
    std::fs::write(&path, rendered).unwrap();

    let config = RelayConfig::from_file(&path).unwrap();
    assert_eq!(config.start_block, Some(1));
    assert_eq!(config.buffer_window, 90);

    let mut p = Pipeline::with_config(config);
    p.chain.mine_block(270);
    p.emit(270, 1);
    p.chain.mine_block(360);
    p.emit(360, 2);

    p.collector.poll_once().await;
    let finalized = p.drain().await;
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].index, 3);
    assert_eq!(finalized[0].state, BufferState::Submitted);
    assert_eq!(p.chain.sent_transactions().len(), 1);
}
