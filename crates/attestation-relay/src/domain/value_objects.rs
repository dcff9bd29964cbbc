//! # Domain Value Objects
//!
//! Small immutable types shared by the relay components.

use super::errors::{Address, Hash};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instruction selector reserved for mock attestation requests.
pub const MOCK_INSTRUCTION_SELECTOR: Hash = [0xff; 32];

/// Digest used for leaves whose instruction type is not recognized.
pub const ZERO_LEAF_HASH: Hash = [0u8; 32];

/// Instruction types the codec knows how to hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionKind {
    /// Mock request, hashed over every leaf field.
    Mock,
    /// Anything else; carried for buffer accounting with a zero hash.
    Unrecognized,
}

impl InstructionKind {
    /// Classify a raw instruction selector.
    pub fn from_selector(selector: &Hash) -> Self {
        if *selector == MOCK_INSTRUCTION_SELECTOR {
            InstructionKind::Mock
        } else {
            InstructionKind::Unrecognized
        }
    }
}

/// Buffer lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferState {
    /// Accepting leaves.
    #[default]
    Open,
    /// Frozen, waiting for finalization.
    Closed,
    /// Merkle root computed.
    Finalized,
    /// Root submitted to the chain.
    Submitted,
    /// Discarded without a commitment.
    Dropped,
}

impl BufferState {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: BufferState) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::Closed)
                | (Self::Closed, Self::Finalized)
                | (Self::Closed, Self::Dropped)
                | (Self::Finalized, Self::Submitted)
        )
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Submitted | Self::Dropped)
    }
}

/// Why a buffer was closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// A leaf for a later buffer arrived.
    Rollover,
    /// Skipped window closed empty during a multi-buffer rollover.
    Gap,
    /// Block production fell behind wall time by more than one window.
    ChainStalled,
    /// The chain head moved into a later window.
    WindowElapsed,
}

/// Submission lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    /// Record created, nothing broadcast yet.
    #[default]
    Pending,
    /// Signed transaction broadcast, awaiting receipt.
    Sent,
    /// Receipt with success status observed.
    Confirmed,
    /// Definitively rejected or retries exhausted.
    Failed,
}

impl SubmissionStatus {
    /// A submission for this payload is still being worked on.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Sent)
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

/// Logical identity of a submission, used for de-duplication.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadKey {
    /// Aggregated root of a buffer.
    Buffer(u64),
    /// Individual attestation request, keyed by request id.
    Request(Hash),
}

impl fmt::Display for PayloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKey::Buffer(index) => write!(f, "buffer {}", index),
            PayloadKey::Request(id) => write!(f, "request 0x{}", hex::encode(id)),
        }
    }
}

/// Chain head summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block number.
    pub number: u64,
    /// Block timestamp (unix seconds).
    pub timestamp: u64,
}

/// A contract log entry as returned by the chain.
///
/// Fields are kept as the node reported them. The collector decodes each
/// entry on its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// `0x`-prefixed hex of the non-indexed event data.
    pub data: String,
    /// Block the log was emitted in, if the node reported one.
    pub block_number: Option<u64>,
}

impl LogEntry {
    /// Entry for raw `data` emitted in `block_number`.
    pub fn from_bytes(data: &[u8], block_number: u64) -> Self {
        Self {
            data: format!("0x{}", hex::encode(data)),
            block_number: Some(block_number),
        }
    }
}

/// Position of a sibling in a Merkle proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    /// Sibling is the left operand.
    Left,
    /// Sibling is the right operand.
    Right,
}

/// One step of a Merkle inclusion proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofNode {
    /// Sibling hash.
    pub hash: Hash,
    /// Which side the sibling sits on.
    pub position: Position,
}

impl ProofNode {
    /// Sibling on the left.
    pub fn left(hash: Hash) -> Self {
        Self {
            hash,
            position: Position::Left,
        }
    }

    /// Sibling on the right.
    pub fn right(hash: Hash) -> Self {
        Self {
            hash,
            position: Position::Right,
        }
    }
}

/// Parse a `0x`-prefixed (or bare) 20-byte hex address.
pub fn parse_address(value: &str) -> Option<Address> {
    let bytes = hex::decode(value.trim_start_matches("0x")).ok()?;
    bytes.try_into().ok()
}

/// Parse a `0x`-prefixed (or bare) 32-byte hex word.
pub fn parse_hash(value: &str) -> Option<Hash> {
    let bytes = hex::decode(value.trim_start_matches("0x")).ok()?;
    bytes.try_into().ok()
}
