//! # Domain Entities
//!
//! Attestation leaves, buffers and submission records.

use super::errors::{Hash, RelayError};
use super::value_objects::{
    parse_hash, BufferState, CloseReason, InstructionKind, PayloadKey, SubmissionStatus,
    ZERO_LEAF_HASH,
};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Keccak-256 over the concatenation of `parts`.
pub fn keccak256(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Left-pad a `u64` into a 32-byte big-endian `uint256` word.
pub fn u256_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// An outbound attestation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRequest {
    /// Instruction selector word.
    pub instruction_selector: Hash,
    /// Request identifier.
    pub request_id: Hash,
    /// Opaque data-availability proof.
    pub data_availability_proof: Hash,
}

impl AttestationRequest {
    /// Parse a request from three hex words (as given on the command line).
    pub fn from_hex(instructions: &str, id: &str, proof: &str) -> Result<Self, RelayError> {
        let word = |name: &str, value: &str| {
            parse_hash(value).ok_or_else(|| {
                RelayError::InvalidRequest(format!("{} must be a 32-byte hex word", name))
            })
        };
        Ok(Self {
            instruction_selector: word("instructions", instructions)?,
            request_id: word("id", id)?,
            data_availability_proof: word("dataAvailabilityProof", proof)?,
        })
    }
}

/// A decoded attestation request observed on chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationLeaf {
    /// Buffer this request belongs to.
    pub buffer_index: u64,
    /// Instruction selector word.
    pub instruction_selector: Hash,
    /// Request identifier.
    pub request_id: Hash,
    /// Opaque data-availability proof.
    pub data_availability_proof: Hash,
    /// Block the request event was emitted in.
    pub source_block: u64,
}

impl AttestationLeaf {
    /// Instruction type of this leaf.
    pub fn kind(&self) -> InstructionKind {
        InstructionKind::from_selector(&self.instruction_selector)
    }

    /// Canonical leaf hash.
    ///
    /// Mock leaves hash the tightly packed
    /// `(uint256 sourceBlock, uint256 bufferIndex, bytes32 instructions, bytes32 id, bytes32 proof)`.
    /// Unrecognized instruction types hash to [`ZERO_LEAF_HASH`].
    pub fn hash(&self) -> Hash {
        match self.kind() {
            InstructionKind::Mock => keccak256(&[
                &u256_word(self.source_block),
                &u256_word(self.buffer_index),
                &self.instruction_selector,
                &self.request_id,
                &self.data_availability_proof,
            ]),
            InstructionKind::Unrecognized => ZERO_LEAF_HASH,
        }
    }
}

/// A time window of observed leaves.
///
/// Leaves are kept in observation order. Once closed the leaf sequence is frozen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Buffer {
    index: u64,
    leaves: Vec<AttestationLeaf>,
    state: BufferState,
    close_reason: Option<CloseReason>,
}

impl Buffer {
    /// Open an empty buffer.
    pub fn open(index: u64) -> Self {
        Self {
            index,
            leaves: Vec::new(),
            state: BufferState::Open,
            close_reason: None,
        }
    }

    /// Buffer index.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Leaves in observation order.
    pub fn leaves(&self) -> &[AttestationLeaf] {
        &self.leaves
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether the buffer holds no leaves.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Current state.
    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Why the buffer was closed, once it is.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Leaf hashes in observation order.
    pub fn leaf_hashes(&self) -> Vec<Hash> {
        self.leaves.iter().map(AttestationLeaf::hash).collect()
    }

    /// Append a leaf. Only open buffers with a matching index accept leaves.
    pub fn push(&mut self, leaf: AttestationLeaf) -> Result<(), RelayError> {
        if self.state != BufferState::Open {
            return Err(RelayError::StaleLeaf {
                leaf_index: leaf.buffer_index,
                open_index: None,
            });
        }
        if leaf.buffer_index != self.index {
            return Err(RelayError::BufferIndexMismatch {
                leaf_index: leaf.buffer_index,
                buffer_index: self.index,
            });
        }
        self.leaves.push(leaf);
        Ok(())
    }

    /// Freeze the buffer.
    pub fn close(&mut self, reason: CloseReason) -> Result<(), RelayError> {
        self.transition_to(BufferState::Closed)?;
        self.close_reason = Some(reason);
        Ok(())
    }

    /// Transition to a new state.
    pub fn transition_to(&mut self, next: BufferState) -> Result<(), RelayError> {
        if !self.state.can_transition_to(next) {
            return Err(RelayError::InvalidBufferTransition {
                from: format!("{:?}", self.state),
                to: format!("{:?}", next),
            });
        }
        self.state = next;
        Ok(())
    }
}

/// A closed buffer with its Merkle commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedBuffer {
    /// Buffer index.
    pub index: u64,
    /// Merkle root over `leaf_hashes`.
    pub root: Hash,
    /// Leaf hashes in observation order.
    pub leaf_hashes: Vec<Hash>,
    /// Why the buffer was closed.
    pub close_reason: Option<CloseReason>,
    /// Lifecycle state (`Finalized` or `Submitted`).
    pub state: BufferState,
}

impl FinalizedBuffer {
    /// Number of committed leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaf_hashes.len()
    }

    /// Record that the root was accepted on chain.
    pub fn mark_submitted(&mut self) -> Result<(), RelayError> {
        if !self.state.can_transition_to(BufferState::Submitted) {
            return Err(RelayError::InvalidBufferTransition {
                from: format!("{:?}", self.state),
                to: format!("{:?}", BufferState::Submitted),
            });
        }
        self.state = BufferState::Submitted;
        Ok(())
    }
}

/// Something the relay sends to the state connector contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionPayload {
    /// A single attestation request.
    Request(AttestationRequest),
    /// The Merkle root of a finalized buffer.
    BufferRoot {
        /// Buffer index.
        buffer_index: u64,
        /// Merkle root.
        root: Hash,
    },
}

impl SubmissionPayload {
    /// De-duplication key.
    pub fn key(&self) -> PayloadKey {
        match self {
            SubmissionPayload::Request(request) => PayloadKey::Request(request.request_id),
            SubmissionPayload::BufferRoot { buffer_index, .. } => PayloadKey::Buffer(*buffer_index),
        }
    }

    /// Content hash of the payload.
    pub fn payload_hash(&self) -> Hash {
        match self {
            SubmissionPayload::Request(request) => keccak256(&[
                &request.instruction_selector,
                &request.request_id,
                &request.data_availability_proof,
            ]),
            SubmissionPayload::BufferRoot { buffer_index, root } => {
                keccak256(&[&u256_word(*buffer_index), root])
            }
        }
    }
}

/// Book-keeping for one logical submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Logical payload identity.
    pub key: PayloadKey,
    /// Content hash of the payload.
    pub payload_hash: Hash,
    /// Nonce of the latest broadcast attempt.
    pub nonce: Option<u64>,
    /// Hash of the latest broadcast transaction.
    pub tx_hash: Option<Hash>,
    /// Lifecycle status.
    pub status: SubmissionStatus,
    /// Broadcast attempts so far.
    pub attempts: u32,
    /// Last failure seen, if any.
    pub last_error: Option<String>,
}

impl SubmissionRecord {
    /// Create a pending record.
    pub fn new(key: PayloadKey, payload_hash: Hash) -> Self {
        Self {
            key,
            payload_hash,
            nonce: None,
            tx_hash: None,
            status: SubmissionStatus::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    /// A signed transaction went out with `nonce`.
    pub fn mark_sent(&mut self, nonce: u64, tx_hash: Hash) {
        self.nonce = Some(nonce);
        self.tx_hash = Some(tx_hash);
        self.status = SubmissionStatus::Sent;
    }

    /// The transaction was mined successfully.
    pub fn mark_confirmed(&mut self, tx_hash: Hash) {
        self.tx_hash = Some(tx_hash);
        self.status = SubmissionStatus::Confirmed;
        self.last_error = None;
    }

    /// The submission is definitively over.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = SubmissionStatus::Failed;
        self.last_error = Some(reason.into());
    }
}
