//! # Domain Invariants
//!
//! Rules that must hold for every buffer and every leaf.

use super::errors::RelayError;

/// Default polling cadence when no new blocks or logs are available.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;

/// Default delay between submission retries.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;

/// Default delay between repeated attestation requests.
pub const DEFAULT_REISSUE_INTERVAL_MS: u64 = 5_000;

/// Default bound on broadcast attempts for one submission.
pub const DEFAULT_MAX_SUBMISSION_ATTEMPTS: u32 = 5;

/// Default number of skipped windows committed as empty buffers on a gap.
pub const DEFAULT_MAX_GAP_BUFFERS: u64 = 16;

/// Invariant: buffer windows have positive length.
pub fn invariant_window_positive(window_secs: u64) -> Result<(), RelayError> {
    if window_secs == 0 {
        return Err(RelayError::InvalidConfig(
            "buffer window must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Invariant: a leaf never goes into a buffer closed before it arrived.
///
/// A leaf is stale when its index is below the open buffer, or at or below
/// the most recently closed buffer, or below the first index this
/// aggregator accepts.
pub fn invariant_not_stale(
    leaf_index: u64,
    open_index: Option<u64>,
    last_closed: Option<u64>,
    floor: Option<u64>,
) -> Result<(), RelayError> {
    let below_open = open_index.is_some_and(|open| leaf_index < open);
    let already_closed = last_closed.is_some_and(|closed| leaf_index <= closed);
    let below_floor = floor.is_some_and(|first| leaf_index < first);
    if below_open || already_closed || below_floor {
        return Err(RelayError::StaleLeaf {
            leaf_index,
            open_index,
        });
    }
    Ok(())
}
