//! # Relay Configuration
//!
//! Loaded once at startup from a JSON file, then shared read-only.
//!
//! ```json
//! {
//!   "url": "http://127.0.0.1:9650/ext/bc/C/rpc",
//!   "chainId": 16,
//!   "stateConnectorContract": "0x1000000000000000000000000000000000000001",
//!   "bufferWindow": 90,
//!   "bufferTimestampOffset": 0,
//!   "gasPrice": 225,
//!   "gas": 8000000,
//!   "accounts": [{ "address": "0x...", "privateKey": "0x..." }]
//! }
//! ```

use crate::adapters::{StateConnectorAbi, REQUEST_ATTESTATIONS_SELECTOR};
use crate::algorithms::BufferClock;
use crate::application::{CollectorSettings, SubmissionPolicy};
use crate::domain::{
    invariant_window_positive, parse_address, Address, RelayError, DEFAULT_MAX_GAP_BUFFERS,
    DEFAULT_MAX_SUBMISSION_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REISSUE_INTERVAL_MS,
    DEFAULT_RETRY_DELAY_MS,
};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default time to wait for a transaction receipt.
pub const DEFAULT_RECEIPT_TIMEOUT_MS: u64 = 60_000;

/// Environment variable overriding `url`.
pub const ENV_RPC_URL: &str = "RELAY_RPC_URL";
/// Environment variable overriding `stateConnectorContract`.
pub const ENV_CONTRACT: &str = "RELAY_CONTRACT";
/// Environment variable overriding `pollIntervalMs`.
pub const ENV_POLL_INTERVAL_MS: &str = "RELAY_POLL_INTERVAL_MS";

/// A signing account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    /// Account address.
    pub address: String,
    /// Hex private key.
    pub private_key: String,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}
fn default_reissue_interval_ms() -> u64 {
    DEFAULT_REISSUE_INTERVAL_MS
}
fn default_max_submission_attempts() -> u32 {
    DEFAULT_MAX_SUBMISSION_ATTEMPTS
}
fn default_receipt_timeout_ms() -> u64 {
    DEFAULT_RECEIPT_TIMEOUT_MS
}
fn default_max_gap_buffers() -> u64 {
    DEFAULT_MAX_GAP_BUFFERS
}
fn default_true() -> bool {
    true
}

/// Relay configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Chain JSON-RPC endpoint.
    pub url: String,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// State connector contract address.
    pub state_connector_contract: String,
    /// Buffer window length in seconds.
    pub buffer_window: u64,
    /// Timestamp of buffer zero.
    #[serde(default)]
    pub buffer_timestamp_offset: u64,
    /// Gas price in gwei.
    pub gas_price: u64,
    /// Gas limit per transaction.
    pub gas: u64,
    /// Signing accounts: `[0]` collects, `[1]` requests.
    pub accounts: Vec<AccountConfig>,

    /// Back-off between polls when idle.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Delay between submission retries.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Delay between repeated attestation requests.
    #[serde(default = "default_reissue_interval_ms")]
    pub reissue_interval_ms: u64,
    /// Broadcast attempts per submission.
    #[serde(default = "default_max_submission_attempts")]
    pub max_submission_attempts: u32,
    /// Time to wait for a receipt.
    #[serde(default = "default_receipt_timeout_ms")]
    pub receipt_timeout_ms: u64,
    /// Skip the buffer in progress at startup.
    #[serde(default = "default_true")]
    pub skip_partial_first_buffer: bool,
    /// Cap on empty buffers committed for skipped windows.
    #[serde(default = "default_max_gap_buffers")]
    pub max_gap_buffers: u64,
    /// First block to scan instead of the chain head.
    #[serde(default)]
    pub start_block: Option<u64>,
    /// Four-byte hex selector for attestation requests, if the node
    /// intercepts a different one.
    #[serde(default)]
    pub request_selector: Option<String>,
}

impl RelayConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RelayError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(raw: &str) -> Result<Self, RelayError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| RelayError::InvalidConfig(format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RELAY_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.url = url;
        }
        if let Some(contract) = lookup(ENV_CONTRACT) {
            self.state_connector_contract = contract;
        }
        if let Some(interval) = lookup(ENV_POLL_INTERVAL_MS).and_then(|v| v.parse().ok()) {
            self.poll_interval_ms = interval;
        }
    }

    /// Check every field the relay depends on.
    pub fn validate(&self) -> Result<(), RelayError> {
        invariant_window_positive(self.buffer_window)?;
        if self.url.is_empty() {
            return Err(RelayError::InvalidConfig("url is empty".to_string()));
        }
        self.contract_address()?;
        self.request_selector()?;
        if self.gas == 0 {
            return Err(RelayError::InvalidConfig("gas must be positive".to_string()));
        }
        if self.max_submission_attempts == 0 {
            return Err(RelayError::InvalidConfig(
                "maxSubmissionAttempts must be positive".to_string(),
            ));
        }
        if self.accounts.is_empty() {
            return Err(RelayError::InvalidConfig(
                "at least one account is required".to_string(),
            ));
        }
        for (i, account) in self.accounts.iter().enumerate() {
            if parse_address(&account.address).is_none() {
                return Err(RelayError::InvalidConfig(format!(
                    "accounts[{}].address is not a 20-byte hex address",
                    i
                )));
            }
        }
        Ok(())
    }

    /// Parsed contract address.
    pub fn contract_address(&self) -> Result<Address, RelayError> {
        parse_address(&self.state_connector_contract).ok_or_else(|| {
            RelayError::InvalidConfig(format!(
                "stateConnectorContract {:?} is not a 20-byte hex address",
                self.state_connector_contract
            ))
        })
    }

    /// Selector for attestation requests.
    pub fn request_selector(&self) -> Result<[u8; 4], RelayError> {
        let Some(raw) = self.request_selector.as_deref() else {
            return Ok(REQUEST_ATTESTATIONS_SELECTOR);
        };
        hex::decode(raw.trim_start_matches("0x"))
            .ok()
            .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
            .ok_or_else(|| {
                RelayError::InvalidConfig(format!(
                    "requestSelector {:?} is not a 4-byte hex value",
                    raw
                ))
            })
    }

    /// Call encoder for the configured selectors.
    pub fn call_encoder(&self) -> Result<StateConnectorAbi, RelayError> {
        Ok(StateConnectorAbi::with_request_selector(
            self.request_selector()?,
        ))
    }

    /// Buffer clock for the configured window and offset.
    pub fn buffer_clock(&self) -> Result<BufferClock, RelayError> {
        BufferClock::new(self.buffer_window, self.buffer_timestamp_offset)
    }

    /// Gas price in wei.
    pub fn gas_price_wei(&self) -> U256 {
        U256::from(self.gas_price) * U256::exp10(9)
    }

    /// Account the collector signs buffer roots with.
    pub fn collector_account(&self) -> Result<&AccountConfig, RelayError> {
        self.accounts
            .first()
            .ok_or_else(|| RelayError::InvalidConfig("no collector account".to_string()))
    }

    /// Account the request issuer signs with.
    pub fn requester_account(&self) -> Result<&AccountConfig, RelayError> {
        match self.accounts.get(1) {
            Some(account) => Ok(account),
            None => self.collector_account(),
        }
    }

    /// Idle poll back-off.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Submission retry delay.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Request reissue interval.
    pub fn reissue_interval(&self) -> Duration {
        Duration::from_millis(self.reissue_interval_ms)
    }

    /// Receipt wait timeout.
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    /// Collector settings derived from this configuration.
    pub fn collector_settings(&self) -> Result<CollectorSettings, RelayError> {
        Ok(CollectorSettings {
            contract: self.contract_address()?,
            poll_interval: self.poll_interval(),
            skip_partial_first_buffer: self.skip_partial_first_buffer,
            start_block: self.start_block,
            max_gap_buffers: self.max_gap_buffers,
        })
    }

    /// Submission policy derived from this configuration.
    pub fn submission_policy(&self) -> Result<SubmissionPolicy, RelayError> {
        Ok(SubmissionPolicy {
            chain_id: self.chain_id,
            gas_price: self.gas_price_wei(),
            gas_limit: self.gas,
            contract: self.contract_address()?,
            retry_delay: self.retry_delay(),
            max_attempts: self.max_submission_attempts,
        })
    }

    /// Create a config for testing (short delays, no partial-buffer skip).
    pub fn for_testing() -> Self {
        Self {
            url: "http://127.0.0.1:8545".to_string(),
            chain_id: 16,
            state_connector_contract: "0x1000000000000000000000000000000000000001".to_string(),
            buffer_window: 90,
            buffer_timestamp_offset: 0,
            gas_price: 225,
            gas: 8_000_000,
            accounts: vec![
                AccountConfig {
                    address: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string(),
                    private_key:
                        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
                            .to_string(),
                },
                AccountConfig {
                    address: "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".to_string(),
                    private_key:
                        "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
                            .to_string(),
                },
            ],
            poll_interval_ms: 10,
            retry_delay_ms: 10,
            reissue_interval_ms: 10,
            max_submission_attempts: 3,
            receipt_timeout_ms: 1_000,
            skip_partial_first_buffer: false,
            max_gap_buffers: DEFAULT_MAX_GAP_BUFFERS,
            start_block: None,
            request_selector: None,
        }
    }
}
