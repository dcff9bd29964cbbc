//! # Buffer Aggregator
//!
//! Owns the open buffer. Accumulates leaves in observation order, detects
//! rollover and turns closed buffers into Merkle commitments.
//!
//! ```text
//! OPEN ──rollover / force close──→ CLOSED ──finalize──→ FINALIZED ──submit──→ SUBMITTED
//! ```

use crate::algorithms::compute_merkle_root;
use crate::domain::{
    invariant_not_stale, AttestationLeaf, Buffer, BufferState, CloseReason, FinalizedBuffer,
    RelayError,
};
use tracing::{debug, info, warn};

/// What happened to an ingested leaf.
#[derive(Debug)]
pub enum IngestOutcome {
    /// A new buffer was opened for the leaf.
    Opened {
        /// Index of the new buffer.
        index: u64,
    },
    /// The leaf joined the open buffer.
    Appended {
        /// Index of the open buffer.
        index: u64,
        /// Leaves now in the buffer.
        leaves: usize,
    },
    /// Earlier buffers were closed and a new one opened for the leaf.
    Rollover {
        /// Closed buffers in index order, including empty gap buffers.
        closed: Vec<Buffer>,
        /// Index of the new buffer.
        opened: u64,
    },
}

impl IngestOutcome {
    /// Buffers closed by this ingest.
    pub fn into_closed(self) -> Vec<Buffer> {
        match self {
            IngestOutcome::Rollover { closed, .. } => closed,
            _ => Vec::new(),
        }
    }
}

/// Buffer aggregator.
#[derive(Debug)]
pub struct BufferAggregator {
    open: Option<Buffer>,
    last_closed: Option<u64>,
    floor: Option<u64>,
    max_gap_buffers: u64,
}

impl BufferAggregator {
    /// Aggregator accepting any buffer index.
    pub fn new(max_gap_buffers: u64) -> Self {
        Self {
            open: None,
            last_closed: None,
            floor: None,
            max_gap_buffers,
        }
    }

    /// Aggregator that drops leaves for buffers below `first_index`.
    pub fn starting_at(first_index: u64, max_gap_buffers: u64) -> Self {
        Self {
            floor: Some(first_index),
            ..Self::new(max_gap_buffers)
        }
    }

    /// Index of the open buffer.
    pub fn open_index(&self) -> Option<u64> {
        self.open.as_ref().map(Buffer::index)
    }

    /// The open buffer.
    pub fn open_buffer(&self) -> Option<&Buffer> {
        self.open.as_ref()
    }

    /// Index of the most recently closed buffer.
    pub fn last_closed(&self) -> Option<u64> {
        self.last_closed
    }

    /// Lowest accepted buffer index, if any.
    pub fn floor(&self) -> Option<u64> {
        self.floor
    }

    /// Ingest one leaf.
    ///
    /// Stale leaves are rejected with `StaleLeaf` and leave the open buffer
    /// untouched.
    pub fn ingest(&mut self, leaf: AttestationLeaf) -> Result<IngestOutcome, RelayError> {
        let index = leaf.buffer_index;
        invariant_not_stale(index, self.open_index(), self.last_closed, self.floor)?;

        if let Some(open) = self.open.as_mut().filter(|open| open.index() == index) {
            open.push(leaf)?;
            return Ok(IngestOutcome::Appended {
                index,
                leaves: open.len(),
            });
        }

        let mut closed = Vec::new();
        if let Some(previous) = self.close_open(CloseReason::Rollover)? {
            info!(
                buffer = previous.index(),
                leaves = previous.len(),
                next = index,
                "[relay] Buffer rollover"
            );
            closed.push(previous);
        }
        closed.extend(self.gap_buffers(index)?);
        self.open_with(leaf)?;

        if closed.is_empty() {
            debug!(buffer = index, "[relay] Opened buffer");
            Ok(IngestOutcome::Opened { index })
        } else {
            Ok(IngestOutcome::Rollover {
                closed,
                opened: index,
            })
        }
    }

    /// Close the open buffer early.
    pub fn force_close(&mut self, reason: CloseReason) -> Option<Buffer> {
        match self.close_open(reason) {
            Ok(closed) => {
                if let Some(buffer) = &closed {
                    info!(
                        buffer = buffer.index(),
                        leaves = buffer.len(),
                        ?reason,
                        "[relay] Buffer closed early"
                    );
                }
                closed
            }
            Err(e) => {
                warn!("[relay] Could not close open buffer: {}", e);
                None
            }
        }
    }

    /// Close the open buffer if its index is below `index`.
    pub fn close_if_before(&mut self, index: u64, reason: CloseReason) -> Option<Buffer> {
        match self.open_index() {
            Some(open) if open < index => self.force_close(reason),
            _ => None,
        }
    }

    /// Build the Merkle commitment for a closed buffer.
    pub fn finalize(mut buffer: Buffer) -> Result<FinalizedBuffer, RelayError> {
        buffer.transition_to(BufferState::Finalized)?;
        let leaf_hashes = buffer.leaf_hashes();
        let root = compute_merkle_root(&leaf_hashes);
        Ok(FinalizedBuffer {
            index: buffer.index(),
            root,
            leaf_hashes,
            close_reason: buffer.close_reason(),
            state: BufferState::Finalized,
        })
    }

    fn close_open(&mut self, reason: CloseReason) -> Result<Option<Buffer>, RelayError> {
        let Some(mut buffer) = self.open.take() else {
            return Ok(None);
        };
        buffer.close(reason)?;
        self.last_closed = Some(buffer.index());
        Ok(Some(buffer))
    }

    fn open_with(&mut self, leaf: AttestationLeaf) -> Result<(), RelayError> {
        let mut buffer = Buffer::open(leaf.buffer_index);
        buffer.push(leaf)?;
        self.open = Some(buffer);
        Ok(())
    }

    /// Empty closed buffers for windows skipped between the last closed
    /// buffer and `next_index`.
    fn gap_buffers(&mut self, next_index: u64) -> Result<Vec<Buffer>, RelayError> {
        let Some(last) = self.last_closed else {
            return Ok(Vec::new());
        };
        let first_skipped = last + 1;
        if next_index <= first_skipped {
            return Ok(Vec::new());
        }

        let skipped = next_index - first_skipped;
        if skipped > self.max_gap_buffers {
            warn!(
                from = first_skipped,
                to = next_index - 1,
                skipped,
                "[relay] Gap exceeds max_gap_buffers, skipped windows are not committed"
            );
            return Ok(Vec::new());
        }

        let mut gaps = Vec::with_capacity(skipped as usize);
        for index in first_skipped..next_index {
            let mut buffer = Buffer::open(index);
            buffer.close(CloseReason::Gap)?;
            gaps.push(buffer);
        }
        self.last_closed = Some(next_index - 1);
        debug!(skipped, "[relay] Emitted empty gap buffers");
        Ok(gaps)
    }
}
