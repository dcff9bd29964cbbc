//! # Relay Service
//!
//! Wires collector, finalizer and submission driver into the running
//! pipelines.
//!
//! ```text
//! EventCollector ──closed Buffer──→ BufferFinalizer ──BufferRoot──→ SubmissionDriver
//!   (cursor, open buffer)            (one at a time)                 (nonce lock)
//!
//! RequestIssuer ──Request──→ SubmissionDriver
//! ```

use super::aggregator::BufferAggregator;
use super::collector::EventCollector;
use super::issuer::RequestIssuer;
use super::submission::SubmissionDriver;
use crate::config::RelayConfig;
use crate::domain::{
    AttestationRequest, Buffer, FinalizedBuffer, RelayError, SubmissionPayload, SubmissionStatus,
};
use crate::ports::{CallEncoder, ChainReader, ChainWriter, SubmissionApi, TransactionSigner, WallClock};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Finalizes closed buffers and submits their roots, strictly in arrival
/// order.
pub struct BufferFinalizer {
    api: Arc<dyn SubmissionApi>,
    finalized_tx: Option<mpsc::UnboundedSender<FinalizedBuffer>>,
}

impl BufferFinalizer {
    /// Finalizer submitting through `api`.
    pub fn new(api: Arc<dyn SubmissionApi>) -> Self {
        Self {
            api,
            finalized_tx: None,
        }
    }

    /// Also publish every finalized buffer on `tx`.
    pub fn with_notifier(mut self, tx: mpsc::UnboundedSender<FinalizedBuffer>) -> Self {
        self.finalized_tx = Some(tx);
        self
    }

    /// Finalize one buffer and submit its root.
    ///
    /// Empty buffers are finalized but not submitted.
    pub async fn process(&self, buffer: Buffer) -> Result<FinalizedBuffer, RelayError> {
        let mut finalized = BufferAggregator::finalize(buffer)?;
        info!(
            buffer = finalized.index,
            leaves = finalized.leaf_count(),
            root = %hex::encode(finalized.root),
            reason = ?finalized.close_reason,
            "[relay] Buffer finalized"
        );

        if finalized.leaf_hashes.is_empty() {
            info!(buffer = finalized.index, "[relay] Empty buffer, nothing to submit");
        } else {
            let payload = SubmissionPayload::BufferRoot {
                buffer_index: finalized.index,
                root: finalized.root,
            };
            let record = self.api.submit(payload).await?;
            if record.status == SubmissionStatus::Confirmed {
                finalized.mark_submitted()?;
            }
        }

        self.notify(&finalized);
        Ok(finalized)
    }

    /// Process buffers until the sending side is dropped.
    pub async fn run(&self, mut closed_rx: mpsc::UnboundedReceiver<Buffer>) -> usize {
        let mut processed = 0;
        while let Some(buffer) = closed_rx.recv().await {
            let index = buffer.index();
            match self.process(buffer).await {
                Ok(_) => processed += 1,
                Err(e) => error!(buffer = index, "[relay] Buffer not committed: {}", e),
            }
        }
        info!(processed, "[relay] Finalizer stopped");
        processed
    }

    fn notify(&self, finalized: &FinalizedBuffer) {
        if let Some(tx) = &self.finalized_tx {
            if tx.send(finalized.clone()).is_err() {
                warn!("[relay] Finalized buffer listener is gone");
            }
        }
    }
}

/// The relay: collection pipeline and request issuing over shared ports.
pub struct RelayService {
    config: Arc<RelayConfig>,
    reader: Arc<dyn ChainReader>,
    writer: Arc<dyn ChainWriter>,
    encoder: Arc<dyn CallEncoder>,
    wall: Arc<dyn WallClock>,
}

impl RelayService {
    /// Create a service over the given ports.
    pub fn new(
        config: Arc<RelayConfig>,
        reader: Arc<dyn ChainReader>,
        writer: Arc<dyn ChainWriter>,
        encoder: Arc<dyn CallEncoder>,
        wall: Arc<dyn WallClock>,
    ) -> Self {
        Self {
            config,
            reader,
            writer,
            encoder,
            wall,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Submission driver signing with `signer`.
    pub fn submission_driver(
        &self,
        signer: Arc<dyn TransactionSigner>,
    ) -> Result<Arc<SubmissionDriver>, RelayError> {
        Ok(Arc::new(SubmissionDriver::new(
            Arc::clone(&self.reader),
            Arc::clone(&self.writer),
            signer,
            Arc::clone(&self.encoder),
            self.config.submission_policy()?,
        )))
    }

    /// Run the collection pipeline until `shutdown`.
    ///
    /// Buffers closed before shutdown are finalized and submitted before
    /// this returns.
    pub async fn run_collector(
        &self,
        signer: Arc<dyn TransactionSigner>,
        shutdown: watch::Receiver<bool>,
        finalized_tx: Option<mpsc::UnboundedSender<FinalizedBuffer>>,
    ) -> Result<usize, RelayError> {
        let driver = self.submission_driver(signer)?;
        let mut finalizer = BufferFinalizer::new(driver);
        if let Some(tx) = finalized_tx {
            finalizer = finalizer.with_notifier(tx);
        }

        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let mut collector = EventCollector::new(
            Arc::clone(&self.reader),
            Arc::clone(&self.wall),
            self.config.buffer_clock()?,
            self.config.collector_settings()?,
            closed_tx,
        );

        let finalizer_task = tokio::spawn(async move { finalizer.run(closed_rx).await });
        collector.run(shutdown).await;
        // Dropping the collector closes the channel and lets the finalizer drain.
        drop(collector);

        finalizer_task
            .await
            .map_err(|e| RelayError::TransientChain(format!("finalizer task failed: {}", e)))
    }

    /// Issue `request`, once or until `shutdown`.
    pub async fn run_requester(
        &self,
        signer: Arc<dyn TransactionSigner>,
        request: AttestationRequest,
        once: bool,
        shutdown: watch::Receiver<bool>,
    ) -> Result<u64, RelayError> {
        let driver = self.submission_driver(signer)?;
        let issuer = RequestIssuer::new(driver, request, self.config.reissue_interval());
        if once {
            issuer.issue_once().await?;
            Ok(1)
        } else {
            Ok(issuer.run(shutdown).await)
        }
    }
}
