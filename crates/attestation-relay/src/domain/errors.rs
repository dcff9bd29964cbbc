//! # Domain Errors
//!
//! Error taxonomy for the attestation relay.
//!
//! Only `InvalidConfig` is fatal. Every other variant is contained by the
//! component that produced it: leaf errors drop the leaf, chain errors are
//! retried, rejected submissions mark their record as failed.

use super::value_objects::PayloadKey;
use thiserror::Error;

/// Hash type alias (32-byte keccak-256 digest).
pub type Hash = [u8; 32];

/// Address type alias (20-byte account address).
pub type Address = [u8; 20];

/// Relay error types.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration is unusable (zero window, bad address, missing account).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A timestamp lies before the configured buffer offset.
    #[error("Timestamp {timestamp} precedes buffer offset {offset}")]
    TimestampBeforeOffset {
        /// Offending timestamp
        timestamp: u64,
        /// Configured offset
        offset: u64,
    },

    /// An event payload does not match the fixed layout.
    #[error("Malformed event at block {block}: {reason}")]
    MalformedEvent {
        /// Block the event was emitted in
        block: u64,
        /// What was wrong with it
        reason: String,
    },

    /// A leaf arrived for a buffer that is already closed.
    #[error("Stale leaf for buffer {leaf_index} (open buffer {open_index:?})")]
    StaleLeaf {
        /// Buffer index carried by the leaf
        leaf_index: u64,
        /// Index of the currently open buffer, if any
        open_index: Option<u64>,
    },

    /// The chain endpoint could not be reached or returned garbage.
    #[error("Transient chain error: {0}")]
    TransientChain(String),

    /// The chain definitively refused a submission.
    #[error("Submission rejected for {key}: {reason}")]
    SubmissionRejected {
        /// Logical payload that was rejected
        key: PayloadKey,
        /// Rejection reason reported by the chain or the driver
        reason: String,
    },

    /// The account nonce used for a submission was already taken.
    #[error("Nonce conflict at nonce {nonce}")]
    NonceConflict {
        /// Nonce that collided
        nonce: u64,
    },

    /// A broadcast transaction is in the pool but not mined yet.
    #[error("Transaction 0x{} is not mined yet", hex::encode(.tx_hash))]
    ReceiptPending {
        /// Hash of the pending transaction
        tx_hash: Hash,
    },

    /// An attestation request could not be parsed.
    #[error("Invalid attestation request: {0}")]
    InvalidRequest(String),

    /// Illegal buffer state transition.
    #[error("Invalid buffer transition: {from} -> {to}")]
    InvalidBufferTransition {
        /// Current state
        from: String,
        /// Attempted state
        to: String,
    },

    /// A leaf was pushed into a buffer with a different index.
    #[error("Leaf for buffer {leaf_index} cannot join buffer {buffer_index}")]
    BufferIndexMismatch {
        /// Buffer index carried by the leaf
        leaf_index: u64,
        /// Index of the target buffer
        buffer_index: u64,
    },
}

impl RelayError {
    /// Whether this error must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::InvalidConfig(_))
    }
}
