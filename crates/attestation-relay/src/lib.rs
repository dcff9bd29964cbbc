//! # Attestation Relay
//!
//! Off-chain relay for a state connector contract.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! - Watch the contract for `AttestationRequest` events
//! - Group decoded leaves into fixed-length, timestamp-aligned buffers
//! - Commit each closed buffer with a Merkle root submitted on-chain
//! - Issue attestation requests from a configured account
//!
//! ## Guarantees
//!
//! | Guarantee | Where |
//! |-----------|-------|
//! | Buffers close in index order, each exactly once | `BufferAggregator` |
//! | No leaf enters an already-closed buffer | `invariant_not_stale` |
//! | One in-flight submission per payload | `SubmissionDriver` |
//! | Per-account nonces never reused concurrently | `SubmissionDriver` |
//!
//! ## Module Structure
//!
//! ```text
//! attestation-relay/
//! ├── domain/          # Leaves, buffers, submission records, errors
//! ├── algorithms/      # Buffer clock, event codec, Merkle tree
//! ├── ports/           # Submission API (inbound) + chain/signer traits (outbound)
//! ├── adapters/        # JSON-RPC client, local signer, ABI encoder, in-memory chain
//! ├── application/     # Aggregator, collector, submission driver, issuer, service
//! └── config.rs        # RelayConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{
    InMemoryChain, JsonRpcChainClient, LocalSigner, ManualClock, SendOutcome, StateConnectorAbi,
    SystemClock,
};
pub use algorithms::{
    buffer_index_for, build_merkle_proof, compute_merkle_root, is_buffer_expired,
    verify_merkle_proof, BufferClock, MerkleTree,
};
pub use application::{
    BufferAggregator, BufferFinalizer, CollectorSettings, EventCollector, IngestOutcome,
    PollOutcome, RelayService, RequestIssuer, SubmissionDriver, SubmissionPolicy,
};
pub use config::{AccountConfig, RelayConfig};
pub use domain::{
    Address, AttestationLeaf, AttestationRequest, Buffer, BufferState, CloseReason,
    FinalizedBuffer, Hash, PayloadKey, RelayError, SubmissionPayload, SubmissionRecord,
    SubmissionStatus,
};
pub use ports::{
    CallEncoder, ChainError, ChainReader, ChainWriter, SubmissionApi, TransactionSigner,
    WallClock,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
