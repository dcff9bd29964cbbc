//! # Failure Mode Tests
//!
//! Bad events, empty ranges, read failures and rejected submissions must
//! never stop the pipeline or corrupt buffer state.

use std::time::Duration;

use attestation_relay::algorithms::{decode_hex, EVENT_HEX_LEN};
use attestation_relay::{
    BufferState, ChainError, PayloadKey, PollOutcome, RelayError, SendOutcome, SubmissionApi,
    SubmissionPayload, SubmissionStatus,
};
use tokio::sync::watch;

use super::fixtures::{Pipeline, GENESIS};

// =============================================================================
// COLLECTION
// =============================================================================

#[tokio::test]
async fn test_malformed_payload_is_dropped_and_next_leaf_processed() {
    let mut p = Pipeline::new();
    p.chain.mine_block(270);
    p.emit(270, 1);
    p.emit_raw(vec![0u8; 100]);
    p.emit(275, 2);

    let outcome = p.collector.poll_once().await;
    assert!(matches!(
        outcome,
        PollOutcome::Ingested {
            leaves: 2,
            malformed: 1,
            stale: 0,
            ..
        }
    ));
    let open = p.collector.aggregator().open_buffer().unwrap();
    assert_eq!(open.index(), 3);
    assert_eq!(open.len(), 2);
    assert_eq!(open.state(), BufferState::Open);
}

#[test]
fn test_short_hex_payload_is_malformed() {
    let clock = super::fixtures::test_config().buffer_clock().unwrap();
    let short = format!("0x{}", "0".repeat(EVENT_HEX_LEN - 3));
    assert!(matches!(
        decode_hex(&short, 12, &clock),
        Err(RelayError::MalformedEvent { block: 12, .. })
    ));
}

#[tokio::test]
async fn test_undecodable_log_entries_do_not_block_the_batch() {
    let mut p = Pipeline::new();
    p.chain.mine_block(270);
    let block = p.chain.head().number;
    p.emit(270, 1);
    p.chain.push_raw_log(p.contract(), "0xabc", None);
    let short = format!("0x{}", "0".repeat(EVENT_HEX_LEN - 3));
    p.chain.push_raw_log(p.contract(), &short, Some(block));

    let outcome = p.collector.poll_once().await;
    assert!(matches!(
        outcome,
        PollOutcome::Ingested {
            leaves: 1,
            malformed: 2,
            ..
        }
    ));
    assert_eq!(p.collector.next_block(), Some(block + 1));
    assert_eq!(p.collector.aggregator().open_buffer().unwrap().len(), 1);

    p.chain.mine_block(360);
    p.emit(360, 2);
    p.collector.poll_once().await;
    let finalized = p.drain().await;
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].index, 3);
    assert_eq!(finalized[0].state, BufferState::Submitted);
}

#[tokio::test]
async fn test_empty_logs_advance_cursor_without_buffer_change() {
    let mut p = Pipeline::new();
    p.chain.mine_block(GENESIS + 1);
    p.chain.mine_block(GENESIS + 2);

    let outcome = p.collector.poll_once().await;
    assert_eq!(outcome, PollOutcome::EmptyRange { from: 1, to: 2 });
    assert!(outcome.should_back_off());
    assert_eq!(p.collector.next_block(), Some(3));
    assert!(p.collector.aggregator().open_buffer().is_none());
    assert!(p.drain().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_empty_range_backs_off_before_next_query() {
    let p = Pipeline::new();
    p.chain.mine_block(GENESIS + 1);
    let chain = p.chain.clone();
    let mut collector = p.collector;
    let (stop_tx, stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        collector.run(stop_rx).await;
        collector
    });

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(chain.log_queries(), vec![(1, 1)]);

    chain.mine_block(GENESIS + 2);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(chain.log_queries(), vec![(1, 1), (2, 2)]);

    stop_tx.send(true).unwrap();
    let collector = task.await.unwrap();
    assert_eq!(collector.next_block(), Some(3));
}

#[tokio::test]
async fn test_read_failure_retries_same_range() {
    let mut p = Pipeline::new();
    p.chain.mine_block(270);
    p.emit(270, 1);
    p.collector.bootstrap().await.unwrap();

    p.chain.fail_next_reads(1);
    assert_eq!(p.collector.poll_once().await, PollOutcome::FetchFailed);
    assert_eq!(p.collector.next_block(), Some(1));
    assert!(p.collector.aggregator().open_buffer().is_none());

    assert!(matches!(
        p.collector.poll_once().await,
        PollOutcome::Ingested { from: 1, to: 1, leaves: 1, .. }
    ));
}

#[tokio::test]
async fn test_late_event_for_committed_buffer_is_stale() {
    let mut p = Pipeline::new();
    p.chain.mine_block(270);
    p.emit(270, 1);
    p.chain.mine_block(360);
    p.emit(360, 2);
    p.collector.poll_once().await;
    let committed = p.drain().await;
    assert_eq!(committed[0].index, 3);

    p.chain.mine_block(361);
    p.emit(280, 3);
    p.emit(361, 4);
    assert!(matches!(
        p.collector.poll_once().await,
        PollOutcome::Ingested {
            leaves: 1,
            stale: 1,
            closed: 0,
            ..
        }
    ));
    assert_eq!(p.collector.aggregator().open_buffer().unwrap().len(), 2);
    assert_eq!(p.chain.sent_transactions().len(), 1);
}

// =============================================================================
// SUBMISSION
// =============================================================================

fn two_buffers(p: &Pipeline) {
    p.chain.mine_block(270);
    p.emit(270, 1);
    p.chain.mine_block(360);
    p.emit(360, 2);
    p.chain.mine_block(450);
    p.emit(450, 3);
}

#[tokio::test]
async fn test_reverted_root_fails_record_and_pipeline_continues() {
    let mut p = Pipeline::new();
    two_buffers(&p);
    p.chain.script_send(SendOutcome::Revert);

    p.collector.poll_once().await;
    let finalized = p.drain().await;
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].index, 4);

    let failed = p.driver.record(&PayloadKey::Buffer(3)).unwrap();
    assert_eq!(failed.status, SubmissionStatus::Failed);
    assert!(failed.tx_hash.is_some());

    let sent = p.chain.sent_transactions();
    assert_eq!(sent.len(), 2);
    assert!(!sent[0].status);
    assert!(sent[1].status);
    assert_eq!(sent[1].nonce, 1);
}

#[tokio::test]
async fn test_single_nonce_conflict_is_retried() {
    let mut p = Pipeline::new();
    two_buffers(&p);
    p.chain
        .script_send(SendOutcome::Fail(ChainError::NonceConflict("nonce too low".into())));

    p.collector.poll_once().await;
    let finalized = p.drain().await;
    assert_eq!(finalized.len(), 2);
    assert!(finalized.iter().all(|b| b.state == BufferState::Submitted));
    assert_eq!(p.chain.sent_transactions().len(), 2);
}

#[tokio::test]
async fn test_repeated_nonce_conflict_escalates() {
    let mut p = Pipeline::new();
    two_buffers(&p);
    for _ in 0..2 {
        p.chain
            .script_send(SendOutcome::Fail(ChainError::NonceConflict("nonce too low".into())));
    }

    p.collector.poll_once().await;
    let buffer = p.closed_rx.try_recv().unwrap();
    let result = p.finalizer.process(buffer).await;
    assert!(matches!(
        result,
        Err(RelayError::SubmissionRejected {
            key: PayloadKey::Buffer(3),
            ..
        })
    ));
    assert_eq!(
        p.driver.record(&PayloadKey::Buffer(3)).unwrap().status,
        SubmissionStatus::Failed
    );

    let next = p.closed_rx.try_recv().unwrap();
    let finalized = p.finalizer.process(next).await.unwrap();
    assert_eq!(finalized.state, BufferState::Submitted);
    assert_eq!(p.chain.sent_transactions()[0].nonce, 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_send_failures_are_retried() {
    let mut p = Pipeline::new();
    two_buffers(&p);
    for _ in 0..2 {
        p.chain
            .script_send(SendOutcome::Fail(ChainError::Unavailable("connection reset".into())));
    }

    p.collector.poll_once().await;
    let finalized = p.drain().await;
    assert_eq!(finalized.len(), 2);

    let record = p.driver.record(&PayloadKey::Buffer(3)).unwrap();
    assert_eq!(record.status, SubmissionStatus::Confirmed);
    assert_eq!(record.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_receipt_timeout_does_not_rebroadcast_root() {
    let mut p = Pipeline::new();
    two_buffers(&p);
    p.chain.script_send(SendOutcome::ReceiptTimeout);

    p.collector.poll_once().await;
    let finalized = p.drain().await;
    assert_eq!(finalized.len(), 2);
    assert!(finalized.iter().all(|b| b.state == BufferState::Submitted));

    let record = p.driver.record(&PayloadKey::Buffer(3)).unwrap();
    assert_eq!(record.status, SubmissionStatus::Confirmed);
    assert_eq!(record.attempts, 2);

    let sent = p.chain.sent_transactions();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent.iter().map(|tx| tx.nonce).collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(record.tx_hash, Some(sent[0].hash));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_root_submission_while_pending() {
    let p = Pipeline::new();
    p.chain.set_send_delay(Duration::from_millis(100));
    let payload = SubmissionPayload::BufferRoot {
        buffer_index: 7,
        root: [0xab; 32],
    };

    let driver = p.driver.clone();
    let first = tokio::spawn(async move { driver.submit(payload).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let duplicate = p.driver.submit(payload).await.unwrap();
    assert!(duplicate.status.is_in_flight());
    assert_eq!(duplicate.key, PayloadKey::Buffer(7));

    let confirmed = first.await.unwrap().unwrap();
    assert_eq!(confirmed.status, SubmissionStatus::Confirmed);
    assert_eq!(confirmed.payload_hash, duplicate.payload_hash);
    assert_eq!(p.chain.sent_transactions().len(), 1);
}
