//! # Integration Tests
//!
//! The full relay pipeline wired over [`attestation_relay::InMemoryChain`].

#[cfg(test)]
pub mod fixtures;

#[cfg(test)]
mod failures;
#[cfg(test)]
mod flows;
