//! # Event Collector
//!
//! Polls the chain for `AttestationRequest` logs, feeds decoded leaves to
//! the aggregator in log order and hands closed buffers to the finalizer.
//!
//! The cursor (`next_block`) is the next block whose logs have not been
//! processed. It only advances after a whole batch has been ingested, so a
//! failed fetch is simply retried from the same block.

use super::aggregator::BufferAggregator;
use crate::algorithms::{leaf_codec, BufferClock};
use crate::domain::{Address, Buffer, CloseReason, RelayError};
use crate::ports::{ChainReader, WallClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Collector settings.
#[derive(Clone, Debug)]
pub struct CollectorSettings {
    /// State connector contract emitting the request events.
    pub contract: Address,
    /// Back-off between polls when there is nothing to do.
    pub poll_interval: Duration,
    /// Start with the buffer after the one in progress at startup.
    pub skip_partial_first_buffer: bool,
    /// First block to scan; defaults to the chain head.
    pub start_block: Option<u64>,
    /// Cap on empty buffers emitted for skipped windows.
    pub max_gap_buffers: u64,
}

/// Result of one poll cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The chain head has not moved past the cursor.
    NoNewBlocks,
    /// The scanned range held no logs.
    EmptyRange {
        /// First scanned block.
        from: u64,
        /// Last scanned block.
        to: u64,
    },
    /// A batch of logs was processed.
    Ingested {
        /// First scanned block.
        from: u64,
        /// Last scanned block.
        to: u64,
        /// Leaves accepted by the aggregator.
        leaves: usize,
        /// Logs that failed to decode.
        malformed: usize,
        /// Leaves dropped as stale.
        stale: usize,
        /// Buffers closed during the batch.
        closed: usize,
    },
    /// A chain read failed; the cursor did not move.
    FetchFailed,
}

impl PollOutcome {
    /// Whether the loop should sleep before the next poll.
    pub fn should_back_off(&self) -> bool {
        !matches!(self, PollOutcome::Ingested { .. })
    }
}

/// Event collector.
pub struct EventCollector {
    reader: Arc<dyn ChainReader>,
    wall: Arc<dyn WallClock>,
    clock: BufferClock,
    settings: CollectorSettings,
    aggregator: BufferAggregator,
    next_block: Option<u64>,
    closed_tx: mpsc::UnboundedSender<Buffer>,
}

impl EventCollector {
    /// Create a collector that sends closed buffers to `closed_tx`.
    pub fn new(
        reader: Arc<dyn ChainReader>,
        wall: Arc<dyn WallClock>,
        clock: BufferClock,
        settings: CollectorSettings,
        closed_tx: mpsc::UnboundedSender<Buffer>,
    ) -> Self {
        let aggregator = BufferAggregator::new(settings.max_gap_buffers);
        Self {
            reader,
            wall,
            clock,
            settings,
            aggregator,
            next_block: None,
            closed_tx,
        }
    }

    /// Next block to scan, once bootstrapped.
    pub fn next_block(&self) -> Option<u64> {
        self.next_block
    }

    /// The aggregator owned by this collector.
    pub fn aggregator(&self) -> &BufferAggregator {
        &self.aggregator
    }

    /// Position the cursor. Called automatically by the first poll.
    pub async fn bootstrap(&mut self) -> Result<(), RelayError> {
        let head = self.reader.latest_block().await?;
        let start = self.settings.start_block.unwrap_or(head.number);

        if self.settings.skip_partial_first_buffer && self.settings.start_block.is_none() {
            let first = self.clock.index_for(head.timestamp)?.saturating_add(1);
            self.aggregator = BufferAggregator::starting_at(first, self.settings.max_gap_buffers);
            info!(
                block = start,
                first_buffer = first,
                "[relay] Collector starting, skipping partial buffer"
            );
        } else {
            info!(block = start, "[relay] Collector starting");
        }

        self.next_block = Some(start);
        Ok(())
    }

    /// Run one poll cycle.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let next = match self.next_block {
            Some(next) => next,
            None => match self.bootstrap().await {
                Ok(()) => self.next_block.unwrap_or_default(),
                Err(e) => {
                    warn!("[relay] Collector bootstrap failed: {}", e);
                    return PollOutcome::FetchFailed;
                }
            },
        };

        let head = match self.reader.latest_block().await {
            Ok(head) => head,
            Err(e) => {
                warn!("[relay] Failed to fetch latest block: {}", e);
                return PollOutcome::FetchFailed;
            }
        };

        if next > head.number {
            if self.clock.is_expired(head.timestamp, self.wall.now_secs()) {
                if let Some(buffer) = self.aggregator.force_close(CloseReason::ChainStalled) {
                    self.hand_off(buffer);
                }
            }
            debug!(block = head.number, "[relay] Awaiting new blocks");
            return PollOutcome::NoNewBlocks;
        }

        let (from, to) = (next, head.number);
        let logs = match self.reader.logs(self.settings.contract, from, to).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!(from, to, "[relay] Failed to fetch logs: {}", e);
                return PollOutcome::FetchFailed;
            }
        };

        if logs.is_empty() {
            self.next_block = Some(to + 1);
            self.close_elapsed_window(head.timestamp);
            debug!(from, to, "[relay] No attestation requests");
            return PollOutcome::EmptyRange { from, to };
        }

        info!(from, to, logs = logs.len(), "[relay] Collecting attestation requests");
        let (mut leaves, mut malformed, mut stale, mut closed) = (0, 0, 0, 0);
        for log in logs {
            let Some(block) = log.block_number else {
                warn!(from, to, "[relay] Dropping event without block number");
                malformed += 1;
                continue;
            };
            let leaf = match leaf_codec::decode_hex(&log.data, block, &self.clock) {
                Ok(leaf) => leaf,
                Err(e) => {
                    warn!(block, "[relay] Dropping event: {}", e);
                    malformed += 1;
                    continue;
                }
            };

            match self.aggregator.ingest(leaf) {
                Ok(outcome) => {
                    leaves += 1;
                    for buffer in outcome.into_closed() {
                        closed += 1;
                        self.hand_off(buffer);
                    }
                }
                Err(e @ RelayError::StaleLeaf { .. }) => {
                    debug!(block, "[relay] {}", e);
                    stale += 1;
                }
                Err(e) => {
                    warn!(block, "[relay] Leaf rejected: {}", e);
                }
            }
        }

        self.next_block = Some(to + 1);
        closed += self.close_elapsed_window(head.timestamp);

        PollOutcome::Ingested {
            from,
            to,
            leaves,
            malformed,
            stale,
            closed,
        }
    }

    /// Poll until `shutdown` flips to `true`.
    ///
    /// The stop signal is checked between cycles; a batch in progress is
    /// always completed. Back-off sleeps are interrupted by the signal.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!("[relay] Event collector running");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = self.poll_once().await;

            if *shutdown.borrow() {
                break;
            }
            if outcome.should_back_off() {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        info!(next_block = ?self.next_block, "[relay] Event collector stopped");
    }

    /// Close the open buffer when the head has moved into a later window.
    fn close_elapsed_window(&mut self, head_timestamp: u64) -> usize {
        let Ok(head_index) = self.clock.index_for(head_timestamp) else {
            return 0;
        };
        match self
            .aggregator
            .close_if_before(head_index, CloseReason::WindowElapsed)
        {
            Some(buffer) => {
                self.hand_off(buffer);
                1
            }
            None => 0,
        }
    }

    fn hand_off(&self, buffer: Buffer) {
        let index = buffer.index();
        if self.closed_tx.send(buffer).is_err() {
            error!(buffer = index, "[relay] Finalizer is gone, closed buffer lost");
        }
    }
}
