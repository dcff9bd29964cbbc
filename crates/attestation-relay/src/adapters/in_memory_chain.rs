//! In-memory chain for tests and local simulation.
//!
//! Implements both chain ports over a vector of blocks. Reads and sends can
//! be scripted to fail so retry paths can be exercised.

use super::local_signer::recover_sender;
use crate::domain::{keccak256, Address, BlockInfo, Hash, LogEntry};
use crate::ports::{ChainError, ChainReader, ChainWriter, TxReceipt};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// A transaction accepted by the in-memory chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentTransaction {
    /// Recovered sender.
    pub from: Address,
    /// Recipient contract.
    pub to: Address,
    /// Sender nonce.
    pub nonce: u64,
    /// Call data.
    pub data: Vec<u8>,
    /// Transaction hash.
    pub hash: Hash,
    /// Execution status recorded in the receipt.
    pub status: bool,
    /// Block the transaction was mined in.
    pub block_number: u64,
}

/// Scripted result for the next broadcast.
#[derive(Clone, Debug)]
pub enum SendOutcome {
    /// Accept and mine normally.
    Accept,
    /// Mine the transaction with a failed receipt.
    Revert,
    /// Refuse with this error before touching any state.
    Fail(ChainError),
    /// Mine the transaction but report [`ChainError::ReceiptTimeout`].
    ReceiptTimeout,
}

#[derive(Default)]
struct ChainState {
    blocks: Vec<BlockInfo>,
    logs: Vec<(Address, u64, LogEntry)>,
    nonces: HashMap<Address, u64>,
    failing_reads: u32,
    send_script: VecDeque<SendOutcome>,
    send_delay: Duration,
    sent: Vec<SentTransaction>,
    log_queries: Vec<(u64, u64)>,
}

/// In-memory implementation of [`ChainReader`] and [`ChainWriter`].
pub struct InMemoryChain {
    state: RwLock<ChainState>,
}

impl InMemoryChain {
    /// Chain with a genesis block at `genesis_timestamp`.
    pub fn new(genesis_timestamp: u64) -> Self {
        let state = ChainState {
            blocks: vec![BlockInfo {
                number: 0,
                timestamp: genesis_timestamp,
            }],
            ..Default::default()
        };
        Self {
            state: RwLock::new(state),
        }
    }

    /// Append a block and return its number.
    pub fn mine_block(&self, timestamp: u64) -> u64 {
        let mut state = self.state.write();
        let number = state.blocks.len() as u64;
        state.blocks.push(BlockInfo { number, timestamp });
        number
    }

    /// Emit a log from `address` in the latest block.
    pub fn push_log(&self, address: Address, data: Vec<u8>) {
        let mut state = self.state.write();
        let block_number = state.blocks.len() as u64 - 1;
        state.logs.push((
            address,
            block_number,
            LogEntry::from_bytes(&data, block_number),
        ));
    }

    /// Emit a log in the latest block whose entry reports `data` and
    /// `block_number` verbatim, however malformed.
    pub fn push_raw_log(&self, address: Address, data: &str, block_number: Option<u64>) {
        let mut state = self.state.write();
        let mined_in = state.blocks.len() as u64 - 1;
        state.logs.push((
            address,
            mined_in,
            LogEntry {
                data: data.to_string(),
                block_number,
            },
        ));
    }

    /// Latest block without going through the port.
    pub fn head(&self) -> BlockInfo {
        let state = self.state.read();
        state.blocks[state.blocks.len() - 1]
    }

    /// Fail the next `count` read calls with `Unavailable`.
    pub fn fail_next_reads(&self, count: u32) {
        self.state.write().failing_reads = count;
    }

    /// Queue an outcome for a future broadcast. Unscripted sends are accepted.
    pub fn script_send(&self, outcome: SendOutcome) {
        self.state.write().send_script.push_back(outcome);
    }

    /// Delay every broadcast by `delay`.
    pub fn set_send_delay(&self, delay: Duration) {
        self.state.write().send_delay = delay;
    }

    /// Force the next nonce for `address`.
    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.state.write().nonces.insert(address, nonce);
    }

    /// Next nonce for `address`.
    pub fn nonce_of(&self, address: &Address) -> u64 {
        self.state.read().nonces.get(address).copied().unwrap_or(0)
    }

    /// Transactions mined so far.
    pub fn sent_transactions(&self) -> Vec<SentTransaction> {
        self.state.read().sent.clone()
    }

    /// Every `(from, to)` log range queried so far.
    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.state.read().log_queries.clone()
    }

    fn check_read(&self) -> Result<(), ChainError> {
        let mut state = self.state.write();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(ChainError::Unavailable("scripted read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainReader for InMemoryChain {
    async fn latest_block(&self) -> Result<BlockInfo, ChainError> {
        self.check_read()?;
        Ok(self.head())
    }

    async fn logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LogEntry>, ChainError> {
        self.check_read()?;
        let mut state = self.state.write();
        state.log_queries.push((from_block, to_block));
        Ok(state
            .logs
            .iter()
            .filter(|(emitter, block, _)| {
                *emitter == address && *block >= from_block && *block <= to_block
            })
            .map(|(_, _, log)| log.clone())
            .collect())
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, ChainError> {
        self.check_read()?;
        Ok(self.nonce_of(&address))
    }
}

#[async_trait]
impl ChainWriter for InMemoryChain {
    async fn send_signed_transaction(&self, raw: &[u8]) -> Result<TxReceipt, ChainError> {
        let delay = self.state.read().send_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let (from, tx) = recover_sender(raw)?;
        let mut state = self.state.write();

        let (status, report_timeout) = match state.send_script.pop_front() {
            Some(SendOutcome::Fail(err)) => return Err(err),
            Some(SendOutcome::Revert) => (false, false),
            Some(SendOutcome::ReceiptTimeout) => (true, true),
            Some(SendOutcome::Accept) | None => (true, false),
        };

        let expected = state.nonces.get(&from).copied().unwrap_or(0);
        if tx.nonce != expected {
            return Err(ChainError::NonceConflict(format!(
                "nonce too low: got {}, expected {}",
                tx.nonce, expected
            )));
        }
        state.nonces.insert(from, expected + 1);

        let hash = keccak256(&[raw]);
        let block_number = state.blocks.len() as u64 - 1;
        state.sent.push(SentTransaction {
            from,
            to: tx.to,
            nonce: tx.nonce,
            data: tx.data,
            hash,
            status,
            block_number,
        });

        if report_timeout {
            return Err(ChainError::ReceiptTimeout(hash));
        }
        Ok(TxReceipt {
            tx_hash: hash,
            status,
            block_number: Some(block_number),
        })
    }

    async fn transaction_receipt(&self, tx_hash: &Hash) -> Result<Option<TxReceipt>, ChainError> {
        Ok(self
            .state
            .read()
            .sent
            .iter()
            .find(|tx| tx.hash == *tx_hash)
            .map(|tx| TxReceipt {
                tx_hash: tx.hash,
                status: tx.status,
                block_number: Some(tx.block_number),
            }))
    }
}
