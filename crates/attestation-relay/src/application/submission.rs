//! # Submission Driver
//!
//! Turns payloads into signed transactions and drives them to a receipt.
//!
//! ## Retry policy
//!
//! | Failure                  | Action                                    |
//! |--------------------------|-------------------------------------------|
//! | network / underpriced    | sleep `retry_delay`, retry with new nonce |
//! | receipt timeout          | sleep, poll the same hash, never resend   |
//! | nonce conflict           | retry once immediately, then reject       |
//! | revert / failed receipt  | mark FAILED, reject                       |
//! | attempts exhausted       | mark FAILED, reject                       |

use crate::domain::{
    Address, Hash, PayloadKey, RelayError, SubmissionPayload, SubmissionRecord,
};
use crate::ports::{
    CallEncoder, ChainError, ChainReader, ChainWriter, SubmissionApi, TransactionSigner,
    TxReceipt, UnsignedTransaction,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use primitive_types::U256;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Terminal records kept for lookups.
const ARCHIVE_CAPACITY: usize = 256;

/// Transaction and retry parameters.
#[derive(Clone, Debug)]
pub struct SubmissionPolicy {
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Gas price in wei.
    pub gas_price: U256,
    /// Gas limit per transaction.
    pub gas_limit: u64,
    /// State connector contract.
    pub contract: Address,
    /// Delay between transient retries.
    pub retry_delay: Duration,
    /// Upper bound on broadcast attempts.
    pub max_attempts: u32,
}

/// Submission driver.
pub struct SubmissionDriver {
    reader: Arc<dyn ChainReader>,
    writer: Arc<dyn ChainWriter>,
    signer: Arc<dyn TransactionSigner>,
    encoder: Arc<dyn CallEncoder>,
    policy: SubmissionPolicy,
    records: Mutex<HashMap<PayloadKey, SubmissionRecord>>,
    archive: Mutex<VecDeque<SubmissionRecord>>,
    /// Serializes "fetch nonce → sign → broadcast" for the signing account.
    nonce_lock: tokio::sync::Mutex<()>,
}

impl SubmissionDriver {
    /// Create a driver signing with `signer`.
    pub fn new(
        reader: Arc<dyn ChainReader>,
        writer: Arc<dyn ChainWriter>,
        signer: Arc<dyn TransactionSigner>,
        encoder: Arc<dyn CallEncoder>,
        policy: SubmissionPolicy,
    ) -> Self {
        Self {
            reader,
            writer,
            signer,
            encoder,
            policy,
            records: Mutex::new(HashMap::new()),
            archive: Mutex::new(VecDeque::new()),
            nonce_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Account submissions are signed with.
    pub fn account(&self) -> Address {
        self.signer.address()
    }

    fn update<R>(&self, key: PayloadKey, f: impl FnOnce(&mut SubmissionRecord) -> R) -> Option<R> {
        self.records.lock().get_mut(&key).map(f)
    }

    /// Move a terminal record out of the live set.
    fn archive(&self, key: PayloadKey) -> Option<SubmissionRecord> {
        let record = self.records.lock().remove(&key)?;
        let mut archive = self.archive.lock();
        if archive.len() == ARCHIVE_CAPACITY {
            archive.pop_front();
        }
        archive.push_back(record.clone());
        Some(record)
    }

    fn fail(&self, key: PayloadKey, reason: String) -> RelayError {
        self.update(key, |record| record.mark_failed(reason.clone()));
        self.archive(key);
        error!(%key, "[relay] Submission failed: {}", reason);
        RelayError::SubmissionRejected { key, reason }
    }

    /// One broadcast: fetch nonce, sign, send, await receipt.
    async fn attempt(&self, key: PayloadKey, data: &[u8]) -> Result<TxReceipt, RelayError> {
        let _nonce_guard = self.nonce_lock.lock().await;

        let nonce = self
            .reader
            .transaction_count(self.signer.address())
            .await
            .map_err(|e| RelayError::TransientChain(e.to_string()))?;

        let tx = UnsignedTransaction {
            chain_id: self.policy.chain_id,
            nonce,
            gas_price: self.policy.gas_price,
            gas_limit: self.policy.gas_limit,
            to: self.policy.contract,
            value: U256::zero(),
            data: data.to_vec(),
        };
        let signed = self
            .signer
            .sign_transaction(&tx)
            .map_err(|e| RelayError::SubmissionRejected {
                key,
                reason: e.to_string(),
            })?;

        self.update(key, |record| record.mark_sent(nonce, signed.hash));
        debug!(%key, nonce, "[relay] Broadcasting transaction");

        self.writer
            .send_signed_transaction(&signed.raw)
            .await
            .map_err(|e| match e {
                ChainError::ReceiptTimeout(tx_hash) => RelayError::ReceiptPending { tx_hash },
                ChainError::NonceConflict(_) => RelayError::NonceConflict { nonce },
                ChainError::Reverted(reason) | ChainError::Signing(reason) => {
                    RelayError::SubmissionRejected { key, reason }
                }
                transient => RelayError::TransientChain(transient.to_string()),
            })
    }

    /// Look up the receipt of a transaction already accepted by the node.
    async fn poll_receipt(&self, tx_hash: Hash) -> Result<TxReceipt, RelayError> {
        match self.writer.transaction_receipt(&tx_hash).await {
            Ok(Some(receipt)) => Ok(receipt),
            Ok(None) => Err(RelayError::ReceiptPending { tx_hash }),
            Err(e) => Err(RelayError::TransientChain(e.to_string())),
        }
    }
}

#[async_trait]
impl SubmissionApi for SubmissionDriver {
    async fn submit(&self, payload: SubmissionPayload) -> Result<SubmissionRecord, RelayError> {
        let key = payload.key();
        {
            let mut records = self.records.lock();
            if let Some(existing) = records.get(&key) {
                if existing.status.is_in_flight() {
                    debug!(%key, "[relay] Submission already in flight");
                    return Ok(existing.clone());
                }
            }
            records.insert(key, SubmissionRecord::new(key, payload.payload_hash()));
        }

        let data = self.encoder.encode(&payload);
        let mut nonce_conflicts = 0u32;
        // Once the node holds our transaction, only its receipt is awaited.
        let mut pending: Option<Hash> = None;

        loop {
            let attempt = self
                .update(key, |record| {
                    record.attempts += 1;
                    record.attempts
                })
                .unwrap_or(1);

            let result = match pending {
                Some(tx_hash) => self.poll_receipt(tx_hash).await,
                None => self.attempt(key, &data).await,
            };

            match result {
                Ok(receipt) if receipt.status => {
                    self.update(key, |record| record.mark_confirmed(receipt.tx_hash));
                    info!(
                        %key,
                        attempt,
                        tx = %hex::encode(receipt.tx_hash),
                        "[relay] Submission confirmed"
                    );
                    return self.archive(key).ok_or_else(|| RelayError::SubmissionRejected {
                        key,
                        reason: "record vanished".to_string(),
                    });
                }
                Ok(receipt) => {
                    self.update(key, |record| record.tx_hash = Some(receipt.tx_hash));
                    return Err(self.fail(key, "transaction reverted".to_string()));
                }
                Err(RelayError::SubmissionRejected { reason, .. }) => {
                    return Err(self.fail(key, reason));
                }
                Err(RelayError::NonceConflict { nonce }) => {
                    nonce_conflicts += 1;
                    if nonce_conflicts > 1 {
                        return Err(self.fail(
                            key,
                            format!("repeated nonce conflict at nonce {}", nonce),
                        ));
                    }
                    warn!(%key, nonce, "[relay] Nonce conflict, retrying with fresh nonce");
                }
                Err(e) => {
                    if let RelayError::ReceiptPending { tx_hash } = e {
                        pending = Some(tx_hash);
                    }
                    self.update(key, |record| record.last_error = Some(e.to_string()));
                    if attempt >= self.policy.max_attempts {
                        return Err(self.fail(
                            key,
                            format!("gave up after {} attempts: {}", attempt, e),
                        ));
                    }
                    warn!(%key, attempt, "[relay] Submission attempt failed: {}", e);
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
            }
        }
    }

    fn record(&self, key: &PayloadKey) -> Option<SubmissionRecord> {
        if let Some(record) = self.records.lock().get(key) {
            return Some(record.clone());
        }
        self.archive
            .lock()
            .iter()
            .rev()
            .find(|record| record.key == *key)
            .cloned()
    }

    fn in_flight(&self) -> Vec<SubmissionRecord> {
        self.records
            .lock()
            .values()
            .filter(|record| record.status.is_in_flight())
            .cloned()
            .collect()
    }
}
