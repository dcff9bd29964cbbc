//! # Outbound Ports
//!
//! Traits for external dependencies: chain RPC, transaction signing,
//! contract call encoding and wall time.

use crate::domain::{Address, BlockInfo, Hash, LogEntry, RelayError, SubmissionPayload};
use async_trait::async_trait;
use primitive_types::U256;
use thiserror::Error;

/// Errors reported by chain-facing adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Endpoint unreachable, timed out or returned a server error.
    #[error("Chain unavailable: {0}")]
    Unavailable(String),

    /// Gas price below what the node accepts.
    #[error("Transaction underpriced: {0}")]
    Underpriced(String),

    /// Nonce already used or transaction already known.
    #[error("Nonce conflict: {0}")]
    NonceConflict(String),

    /// Execution reverted or the receipt reports failure.
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// Response did not have the expected shape.
    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    /// Transaction could not be signed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The node accepted the transaction but no receipt arrived in time.
    #[error("No receipt for 0x{} yet", hex::encode(.0))]
    ReceiptTimeout(Hash),
}

impl ChainError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::Unavailable(_)
                | ChainError::Underpriced(_)
                | ChainError::InvalidResponse(_)
                | ChainError::ReceiptTimeout(_)
        )
    }
}

impl From<ChainError> for RelayError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Signing(reason) => RelayError::InvalidConfig(reason),
            other => RelayError::TransientChain(other.to_string()),
        }
    }
}

/// Legacy (pre-EIP-1559) transaction before signing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedTransaction {
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Sender nonce.
    pub nonce: u64,
    /// Gas price in wei.
    pub gas_price: U256,
    /// Gas limit.
    pub gas_limit: u64,
    /// Contract address.
    pub to: Address,
    /// Value in wei.
    pub value: U256,
    /// ABI-encoded call data.
    pub data: Vec<u8>,
}

/// A signed, RLP-encoded transaction ready for broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Raw transaction bytes.
    pub raw: Vec<u8>,
    /// Keccak-256 of `raw`.
    pub hash: Hash,
}

/// Receipt of a mined transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash.
    pub tx_hash: Hash,
    /// Execution succeeded.
    pub status: bool,
    /// Block the transaction was mined in.
    pub block_number: Option<u64>,
}

/// Read access to the chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Latest block header.
    async fn latest_block(&self) -> Result<BlockInfo, ChainError>;

    /// Logs emitted by `address` in the inclusive range `[from_block, to_block]`,
    /// in chain order.
    async fn logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LogEntry>, ChainError>;

    /// Next nonce for `address`, including pending transactions.
    async fn transaction_count(&self, address: Address) -> Result<u64, ChainError>;
}

/// Write access to the chain.
#[async_trait]
pub trait ChainWriter: Send + Sync {
    /// Broadcast a signed transaction and wait for its receipt.
    ///
    /// Fails with [`ChainError::ReceiptTimeout`] once the transaction is in
    /// the node's pool but not mined within the receipt timeout.
    async fn send_signed_transaction(&self, raw: &[u8]) -> Result<TxReceipt, ChainError>;

    /// Receipt of a previously broadcast transaction, `None` while pending.
    async fn transaction_receipt(&self, tx_hash: &Hash) -> Result<Option<TxReceipt>, ChainError>;
}

/// Transaction signing.
pub trait TransactionSigner: Send + Sync {
    /// Account the signer signs for.
    fn address(&self) -> Address;

    /// Sign `tx`.
    fn sign_transaction(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction, ChainError>;
}

/// Contract ABI encoding for submissions.
pub trait CallEncoder: Send + Sync {
    /// Call data for `payload`.
    fn encode(&self, payload: &SubmissionPayload) -> Vec<u8>;
}

/// Wall time source.
pub trait WallClock: Send + Sync {
    /// Current unix time in seconds.
    fn now_secs(&self) -> u64;
}
