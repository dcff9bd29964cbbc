//! # Adapters Module
//!
//! Concrete implementations of the outbound ports.

pub mod abi;
pub mod clock;
pub mod in_memory_chain;
pub mod json_rpc;
pub mod local_signer;

pub use abi::{function_selector, StateConnectorAbi, REQUEST_ATTESTATIONS_SELECTOR};
pub use clock::{ManualClock, SystemClock};
pub use in_memory_chain::{InMemoryChain, SendOutcome, SentTransaction};
pub use json_rpc::JsonRpcChainClient;
pub use local_signer::{recover_sender, LocalSigner};
