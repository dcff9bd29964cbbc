//! # Test Fixtures
//!
//! One relay pipeline per test: an in-memory chain, a manual wall clock, a
//! collector and a finalizer sharing a submission driver.

use std::sync::Arc;

use attestation_relay::adapters::ManualClock;
use attestation_relay::algorithms::encode_event;
use attestation_relay::domain::MOCK_INSTRUCTION_SELECTOR;
use attestation_relay::{
    Address, Buffer, BufferFinalizer, EventCollector, FinalizedBuffer, InMemoryChain, LocalSigner,
    RelayConfig, RelayService, StateConnectorAbi, SubmissionDriver, TransactionSigner,
};
use tokio::sync::mpsc;

/// Chain time the fixtures start at.
pub const GENESIS: u64 = 9_000;

/// A wired relay pipeline.
pub struct Pipeline {
    /// The chain both ports talk to.
    pub chain: Arc<InMemoryChain>,
    /// Wall clock seen by the collector.
    pub wall: Arc<ManualClock>,
    /// Configuration everything was built from.
    pub config: Arc<RelayConfig>,
    /// Event collector, cursor starting at block 1.
    pub collector: EventCollector,
    /// Closed buffers not yet handed to the finalizer.
    pub closed_rx: mpsc::UnboundedReceiver<Buffer>,
    /// Finalizer submitting through `driver`.
    pub finalizer: BufferFinalizer,
    /// Submission driver signing with the collector account.
    pub driver: Arc<SubmissionDriver>,
    /// Collector account address.
    pub collector_account: Address,
}

/// Test configuration: window 90, offset 0, cursor at block 1.
pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::for_testing();
    config.start_block = Some(1);
    config
}

/// Service over `chain` with the given config.
pub fn service(
    chain: &Arc<InMemoryChain>,
    wall: &Arc<ManualClock>,
    config: Arc<RelayConfig>,
) -> RelayService {
    RelayService::new(
        config,
        chain.clone(),
        chain.clone(),
        Arc::new(StateConnectorAbi::new()),
        wall.clone(),
    )
}

/// Signer for `accounts[index]` of the test config.
pub fn signer(index: usize) -> Arc<LocalSigner> {
    let config = RelayConfig::for_testing();
    Arc::new(LocalSigner::from_hex(&config.accounts[index].private_key).expect("test key"))
}

impl Pipeline {
    /// Pipeline over a fresh chain.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Pipeline over a fresh chain with `config`.
    pub fn with_config(config: RelayConfig) -> Self {
        let chain = Arc::new(InMemoryChain::new(GENESIS));
        let wall = Arc::new(ManualClock::new(GENESIS));
        let config = Arc::new(config);
        let service = service(&chain, &wall, config.clone());

        let signer = signer(0);
        let collector_account = signer.address();
        let driver = service.submission_driver(signer).expect("driver");
        let finalizer = BufferFinalizer::new(driver.clone());

        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let collector = EventCollector::new(
            chain.clone(),
            wall.clone(),
            config.buffer_clock().expect("clock"),
            config.collector_settings().expect("settings"),
            closed_tx,
        );

        Self {
            chain,
            wall,
            config,
            collector,
            closed_rx,
            finalizer,
            driver,
            collector_account,
        }
    }

    /// Contract the collector watches.
    pub fn contract(&self) -> Address {
        self.config.contract_address().expect("contract")
    }

    /// Emit a mock request event stamped `buffer_ts` into the latest block.
    pub fn emit(&self, buffer_ts: u64, id: u8) {
        self.chain.push_log(
            self.contract(),
            encode_event(buffer_ts, &MOCK_INSTRUCTION_SELECTOR, &[id; 32], &[0xda; 32]),
        );
    }

    /// Emit a raw payload into the latest block.
    pub fn emit_raw(&self, data: Vec<u8>) {
        self.chain.push_log(self.contract(), data);
    }

    /// Finalize every buffer closed so far, in order.
    pub async fn drain(&mut self) -> Vec<FinalizedBuffer> {
        let mut finalized = Vec::new();
        while let Ok(buffer) = self.closed_rx.try_recv() {
            if let Ok(done) = self.finalizer.process(buffer).await {
                finalized.push(done);
            }
        }
        finalized
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
